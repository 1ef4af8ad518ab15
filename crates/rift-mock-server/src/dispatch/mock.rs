use super::{DispatchError, Dispatcher, ExpectationRegistry};
use crate::metrics;
use crate::request::RecordedRequest;
use crate::response::{MockResponse, ResponseEntry};
use crate::websocket::{SessionConfig, WebSocketSession};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// Serves expectations from an [`ExpectationRegistry`] and tracks the
/// WebSocket sessions it has handed out.
#[derive(Debug)]
pub struct MockDispatcher {
    registry: Arc<ExpectationRegistry>,
    sessions: Mutex<Vec<Arc<WebSocketSession>>>,
    session_config: SessionConfig,
}

impl MockDispatcher {
    pub fn new(registry: Arc<ExpectationRegistry>) -> Self {
        Self {
            registry,
            sessions: Mutex::new(Vec::new()),
            session_config: SessionConfig::default(),
        }
    }

    pub fn with_session_config(mut self, session_config: SessionConfig) -> Self {
        self.session_config = session_config;
        self
    }

    pub fn registry(&self) -> &Arc<ExpectationRegistry> {
        &self.registry
    }

    /// Sessions created by this dispatcher that have not closed yet.
    pub fn live_sessions(&self) -> usize {
        let mut sessions = self.sessions.lock();
        sessions.retain(|s| !s.is_closed());
        sessions.len()
    }

    fn notify_sessions(&self, request: &RecordedRequest) {
        let live: Vec<_> = {
            let mut sessions = self.sessions.lock();
            sessions.retain(|s| !s.is_closed());
            sessions.clone()
        };
        for session in live {
            session.on_http_request(request);
        }
    }
}

impl Dispatcher for MockDispatcher {
    fn dispatch(&self, request: &RecordedRequest) -> Result<MockResponse, DispatchError> {
        self.notify_sessions(request);

        let Some(entry) = self.registry.next_response(&request.method, &request.path) else {
            debug!("No expectation for {} {}", request.method, request.path);
            return Ok(MockResponse::not_found());
        };

        let response = match entry {
            ResponseEntry::Simple(simple) => simple.render(request),
            ResponseEntry::Chunked(chunked) => chunked.render(),
            ResponseEntry::WebSocket(upgrade) => {
                let session = Arc::new(WebSocketSession::new(upgrade.script(), self.session_config));
                debug!(
                    "Created WebSocket session {} for {}",
                    session.id(),
                    request.path
                );
                metrics::record_websocket_event("created");
                self.sessions.lock().push(Arc::clone(&session));
                MockResponse::websocket(session)
            }
        };
        Ok(response)
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
