//! Fluent registration of expectations.
//!
//! ```ignore
//! server.expect().unwrap().get().with_path("/api").and_return(200, "ok").once();
//! ```
//!
//! - `file`: declarative expectations loaded from YAML or JSON

mod file;

pub use file::{
    ExpectationFile, ExpectationSpec, ReplySpec, ResponseBodySpec, TimedMessageSpec, WebSocketSpec,
};

use crate::dispatch::ExpectationRegistry;
use crate::request::{HttpMethod, RecordedRequest, RequestKey};
use crate::response::{
    ChunkedResponse, FixedResponseProvider, FnResponseProvider, ResponseEntry, ResponseProvider,
    SimpleResponse, WebSocketUpgrade,
};
use crate::websocket::SessionScript;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
enum PendingResponse {
    Provider(Arc<dyn ResponseProvider>),
    Chunked { status: u16, fragments: Vec<String> },
    WebSocket(Arc<SessionScript>),
}

impl fmt::Debug for PendingResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PendingResponse::Provider(p) => write!(f, "Provider({})", p.status_code()),
            PendingResponse::Chunked { status, fragments } => {
                write!(f, "Chunked({}, {} fragment(s))", status, fragments.len())
            }
            PendingResponse::WebSocket(_) => f.write_str("WebSocket"),
        }
    }
}

/// Collects method, path and response, then registers the expectation
/// with one of the terminals [`once`](Self::once), [`always`](Self::always)
/// or [`times`](Self::times).
///
/// Without a response the expectation answers `200` with an empty body.
#[derive(Debug, Clone)]
pub struct ExpectationBuilder {
    registry: Arc<ExpectationRegistry>,
    method: HttpMethod,
    path: String,
    headers: Vec<(String, String)>,
    delay: Option<Duration>,
    response: Option<PendingResponse>,
}

impl ExpectationBuilder {
    pub fn new(registry: Arc<ExpectationRegistry>) -> Self {
        Self {
            registry,
            method: HttpMethod::Any,
            path: "/".to_string(),
            headers: Vec::new(),
            delay: None,
            response: None,
        }
    }

    pub fn method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    pub fn any(self) -> Self {
        self.method(HttpMethod::Any)
    }

    pub fn get(self) -> Self {
        self.method(HttpMethod::Get)
    }

    pub fn post(self) -> Self {
        self.method(HttpMethod::Post)
    }

    pub fn put(self) -> Self {
        self.method(HttpMethod::Put)
    }

    pub fn patch(self) -> Self {
        self.method(HttpMethod::Patch)
    }

    pub fn delete(self) -> Self {
        self.method(HttpMethod::Delete)
    }

    /// Path including any query string, matched verbatim.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn and_return(self, status: u16, body: impl Into<String>) -> Self {
        self.with_provider(Arc::new(FixedResponseProvider::new(status, body)))
    }

    /// Respond with `value` serialized as JSON.
    pub fn and_return_json<T: Serialize + ?Sized>(
        self,
        status: u16,
        value: &T,
    ) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_string(value)?;
        Ok(self
            .with_header("Content-Type", "application/json")
            .and_return(status, body))
    }

    /// Compute the body from each request.
    pub fn and_reply<F>(self, status: u16, body_fn: F) -> Self
    where
        F: Fn(&RecordedRequest) -> String + Send + Sync + 'static,
    {
        self.with_provider(Arc::new(FnResponseProvider::new(status, body_fn)))
    }

    pub fn with_provider(mut self, provider: Arc<dyn ResponseProvider>) -> Self {
        self.response = Some(PendingResponse::Provider(provider));
        self
    }

    /// Send `fragments` concatenated as one chunked body.
    pub fn and_return_chunked<I, S>(mut self, status: u16, fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.response = Some(PendingResponse::Chunked {
            status,
            fragments: fragments.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Upgrade the connection and run `script` on it.
    pub fn and_upgrade_to_websocket(mut self, script: SessionScript) -> Self {
        self.response = Some(PendingResponse::WebSocket(Arc::new(script)));
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Wait `delay` before sending the body.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Serve the response once.
    pub fn once(self) {
        self.times(1);
    }

    /// Serve the response for every matching request.
    pub fn always(self) {
        let (key, entry) = self.to_entry(true);
        self.registry.register(key, entry);
    }

    /// Serve the response `times` times, then fall through.
    pub fn times(self, times: usize) {
        let registry = Arc::clone(&self.registry);
        let (key, entry) = self.to_entry(false);
        for _ in 0..times {
            registry.register(key.clone(), entry.clone());
        }
    }

    fn to_entry(&self, repeatable: bool) -> (RequestKey, ResponseEntry) {
        let key = RequestKey::new(self.method, self.path.clone());
        let entry = match self.response.clone() {
            Some(PendingResponse::Provider(provider)) => ResponseEntry::Simple(
                SimpleResponse::new(provider, repeatable)
                    .with_headers(self.headers.clone())
                    .with_delay(self.delay),
            ),
            None => ResponseEntry::Simple(
                SimpleResponse::new(Arc::new(FixedResponseProvider::new(200, "")), repeatable)
                    .with_headers(self.headers.clone())
                    .with_delay(self.delay),
            ),
            Some(PendingResponse::Chunked { status, fragments }) => ResponseEntry::Chunked(
                ChunkedResponse::new(status, fragments, repeatable)
                    .with_headers(self.headers.clone())
                    .with_delay(self.delay),
            ),
            Some(PendingResponse::WebSocket(script)) => {
                ResponseEntry::WebSocket(WebSocketUpgrade::new(script, repeatable))
            }
        };
        (key, entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{Dispatcher, MockDispatcher};
    use serde_json::json;

    fn setup() -> (Arc<ExpectationRegistry>, MockDispatcher) {
        let registry = Arc::new(ExpectationRegistry::new());
        let dispatcher = MockDispatcher::new(Arc::clone(&registry));
        (registry, dispatcher)
    }

    fn status(dispatcher: &MockDispatcher, method: &str, path: &str) -> u16 {
        dispatcher
            .dispatch(&RecordedRequest::new(method, path))
            .unwrap()
            .status
    }

    #[test]
    fn test_once_n_times_then_404() {
        let (registry, dispatcher) = setup();
        for i in 0..3 {
            ExpectationBuilder::new(Arc::clone(&registry))
                .get()
                .with_path("/api")
                .and_return(200, format!("r{i}"))
                .once();
        }
        for i in 0..3 {
            let response = dispatcher.dispatch(&RecordedRequest::new("GET", "/api")).unwrap();
            assert_eq!(response.body_text(), Some(format!("r{i}")));
        }
        assert_eq!(status(&dispatcher, "GET", "/api"), 404);
    }

    #[test]
    fn test_always_never_runs_out() {
        let (registry, dispatcher) = setup();
        ExpectationBuilder::new(Arc::clone(&registry))
            .with_path("/health")
            .and_return(204, "")
            .always();
        for method in ["GET", "POST", "DELETE", "GET"] {
            assert_eq!(status(&dispatcher, method, "/health"), 204);
        }
    }

    #[test]
    fn test_times() {
        let (registry, dispatcher) = setup();
        ExpectationBuilder::new(Arc::clone(&registry))
            .post()
            .with_path("/n")
            .and_return(201, "")
            .times(2);
        assert_eq!(status(&dispatcher, "POST", "/n"), 201);
        assert_eq!(status(&dispatcher, "POST", "/n"), 201);
        assert_eq!(status(&dispatcher, "POST", "/n"), 404);
    }

    #[test]
    fn test_json_headers_and_delay() {
        let (registry, dispatcher) = setup();
        ExpectationBuilder::new(Arc::clone(&registry))
            .get()
            .with_path("/json")
            .and_return_json(200, &json!({"ok": true}))
            .unwrap()
            .with_header("X-Trace", "abc")
            .delay(Duration::from_millis(25))
            .once();

        let response = dispatcher.dispatch(&RecordedRequest::new("GET", "/json")).unwrap();
        assert_eq!(response.body_text().as_deref(), Some(r#"{"ok":true}"#));
        assert_eq!(response.header("content-type"), Some("application/json"));
        assert_eq!(response.header("x-trace"), Some("abc"));
        assert_eq!(response.body_delay, Some(Duration::from_millis(25)));
    }

    #[test]
    fn test_and_reply_sees_request() {
        let (registry, dispatcher) = setup();
        ExpectationBuilder::new(Arc::clone(&registry))
            .put()
            .with_path("/echo")
            .and_reply(200, |req| req.body_utf8().to_uppercase())
            .always();
        let response = dispatcher
            .dispatch(&RecordedRequest::new("PUT", "/echo").with_body("hi"))
            .unwrap();
        assert_eq!(response.body_text().as_deref(), Some("HI"));
    }

    #[test]
    fn test_chunked() {
        let (registry, dispatcher) = setup();
        ExpectationBuilder::new(Arc::clone(&registry))
            .get()
            .with_path("/stream")
            .and_return_chunked(200, ["a", "b"])
            .once();
        let response = dispatcher.dispatch(&RecordedRequest::new("GET", "/stream")).unwrap();
        assert!(matches!(response.body, crate::response::ResponseBody::Chunked(_)));
        assert_eq!(response.body_text().as_deref(), Some("ab"));
    }

    #[test]
    fn test_default_response_is_empty_200() {
        let (registry, dispatcher) = setup();
        ExpectationBuilder::new(Arc::clone(&registry))
            .delete()
            .with_path("/x")
            .once();
        assert_eq!(status(&dispatcher, "DELETE", "/x"), 200);
    }
}
