//! Per-session delayed task runner.
//!
//! Tasks run one at a time on a single worker, ordered by due time and then
//! by scheduling order, so two messages with equal delays go out in the order
//! they were scheduled.

use parking_lot::Mutex;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

type Task = Box<dyn FnOnce() + Send + 'static>;

struct Scheduled {
    due: Instant,
    seq: u64,
    task: Task,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.due, self.seq).cmp(&(other.due, other.seq))
    }
}

#[derive(Default)]
struct TimerState {
    tx: Option<mpsc::UnboundedSender<Scheduled>>,
    handle: Option<JoinHandle<()>>,
    next_seq: u64,
    stopped: bool,
}

/// Single-worker scheduler owned by one session.
///
/// The worker is spawned on the first [`schedule`](Self::schedule) call, which
/// must happen inside a Tokio runtime.
pub struct SessionTimer {
    state: Mutex<TimerState>,
    cancel: CancellationToken,
}

impl Default for SessionTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionTimer {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TimerState::default()),
            cancel: CancellationToken::new(),
        }
    }

    /// Run `task` after `delay`. Returns `false` once the timer is stopped.
    pub fn schedule<F>(&self, delay: Duration, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.state.lock();
        if state.stopped {
            return false;
        }
        if state.tx.is_none() {
            let (tx, rx) = mpsc::unbounded_channel();
            state.handle = Some(tokio::spawn(run_worker(rx, self.cancel.clone())));
            state.tx = Some(tx);
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        let scheduled = Scheduled {
            due: Instant::now() + delay,
            seq,
            task: Box::new(task),
        };
        state
            .tx
            .as_ref()
            .is_some_and(|tx| tx.send(scheduled).is_ok())
    }

    /// Stop accepting tasks and wait up to `timeout` for pending ones to run.
    ///
    /// Tasks still pending when the timeout elapses are discarded. Returns
    /// `true` when everything ran.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        let handle = {
            let mut state = self.state.lock();
            state.stopped = true;
            state.tx = None;
            state.handle.take()
        };
        let Some(mut handle) = handle else {
            return true;
        };
        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(_) => true,
            Err(_) => {
                warn!("Session timer did not drain within {:?}, dropping pending tasks", timeout);
                self.cancel.cancel();
                handle.abort();
                false
            }
        }
    }

    /// Stop immediately, discarding pending tasks.
    pub fn cancel(&self) {
        let handle = {
            let mut state = self.state.lock();
            state.stopped = true;
            state.tx = None;
            state.handle.take()
        };
        self.cancel.cancel();
        if let Some(handle) = handle {
            handle.abort();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.state.lock().stopped
    }
}

async fn run_worker(mut rx: mpsc::UnboundedReceiver<Scheduled>, cancel: CancellationToken) {
    let mut heap: BinaryHeap<Reverse<Scheduled>> = BinaryHeap::new();
    let mut accepting = true;

    loop {
        if !accepting && heap.is_empty() {
            break;
        }
        let next_due = heap.peek().map(|Reverse(s)| s.due);
        let wait = async move {
            match next_due {
                Some(due) => tokio::time::sleep_until(due).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Session timer cancelled with {} pending task(s)", heap.len());
                return;
            }
            received = rx.recv(), if accepting => match received {
                Some(scheduled) => heap.push(Reverse(scheduled)),
                None => accepting = false,
            },
            _ = wait => {
                let now = Instant::now();
                while heap.peek().is_some_and(|Reverse(s)| s.due <= now) {
                    if let Some(Reverse(scheduled)) = heap.pop() {
                        (scheduled.task)();
                    }
                }
            }
        }
    }
}
