//! Expectation queues keyed by request identity.

use crate::request::RequestKey;
use crate::response::ResponseEntry;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// `RequestKey` → FIFO queue of responses.
///
/// Queues only grow by [`register`](Self::register) and only shrink when a
/// non-repeatable head is served.
#[derive(Debug, Default)]
pub struct ExpectationRegistry {
    queues: Mutex<HashMap<RequestKey, VecDeque<ResponseEntry>>>,
}

impl ExpectationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, key: RequestKey, entry: ResponseEntry) {
        debug!("Registering expectation for {}", key);
        self.queues.lock().entry(key).or_default().push_back(entry);
    }

    /// Serve the next response for `method` and `path`.
    ///
    /// Tries the exact key, then the any-method key, skipping empty queues.
    /// Non-repeatable heads are removed under the same lock as the peek.
    pub fn next_response(&self, method: &str, path: &str) -> Option<ResponseEntry> {
        let mut queues = self.queues.lock();
        for key in RequestKey::lookup_order(method, path) {
            let Some(queue) = queues.get_mut(&key) else {
                continue;
            };
            let Some(repeatable) = queue.front().map(ResponseEntry::is_repeatable) else {
                continue;
            };
            let entry = if repeatable {
                queue.front().cloned()?
            } else {
                queue.pop_front()?
            };
            debug!("Matched expectation {}", key);
            return Some(entry);
        }
        None
    }

    /// Number of queued responses for `key`.
    pub fn pending(&self, key: &RequestKey) -> usize {
        self.queues.lock().get(key).map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self) -> bool {
        self.queues.lock().values().all(VecDeque::is_empty)
    }

    pub fn clear(&self) {
        self.queues.lock().clear();
    }
}
