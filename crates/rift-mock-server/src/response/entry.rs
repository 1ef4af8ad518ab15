//! Queued expectation responses.

use super::provider::ResponseProvider;
use super::MockResponse;
use crate::request::RecordedRequest;
use crate::websocket::SessionScript;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// One slot of an expectation queue.
#[derive(Debug, Clone)]
pub enum ResponseEntry {
    Simple(SimpleResponse),
    Chunked(ChunkedResponse),
    WebSocket(WebSocketUpgrade),
}

impl ResponseEntry {
    /// Repeatable entries are served forever; others are dequeued once served.
    pub fn is_repeatable(&self) -> bool {
        match self {
            ResponseEntry::Simple(r) => r.repeatable,
            ResponseEntry::Chunked(r) => r.repeatable,
            ResponseEntry::WebSocket(r) => r.repeatable,
        }
    }
}

/// Status, headers and body from a [`ResponseProvider`].
#[derive(Clone)]
pub struct SimpleResponse {
    provider: Arc<dyn ResponseProvider>,
    headers: Vec<(String, String)>,
    repeatable: bool,
    delay: Option<Duration>,
}

impl SimpleResponse {
    pub fn new(provider: Arc<dyn ResponseProvider>, repeatable: bool) -> Self {
        Self {
            provider,
            headers: Vec::new(),
            repeatable,
            delay: None,
        }
    }

    /// Headers sent after the provider's own.
    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_delay(mut self, delay: Option<Duration>) -> Self {
        self.delay = delay;
        self
    }

    pub fn render(&self, request: &RecordedRequest) -> MockResponse {
        MockResponse::new(self.provider.status_code())
            .with_headers(self.provider.headers())
            .with_headers(self.headers.clone())
            .with_body(self.provider.body(request))
            .with_body_delay(self.delay)
    }
}

impl fmt::Debug for SimpleResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleResponse")
            .field("status_code", &self.provider.status_code())
            .field("headers", &self.headers)
            .field("repeatable", &self.repeatable)
            .field("delay", &self.delay)
            .finish()
    }
}

/// Fragments concatenated into one chunked body.
#[derive(Debug, Clone)]
pub struct ChunkedResponse {
    status_code: u16,
    fragments: Vec<String>,
    headers: Vec<(String, String)>,
    repeatable: bool,
    delay: Option<Duration>,
}

impl ChunkedResponse {
    pub fn new(status_code: u16, fragments: Vec<String>, repeatable: bool) -> Self {
        Self {
            status_code,
            fragments,
            headers: Vec::new(),
            repeatable,
            delay: None,
        }
    }

    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_delay(mut self, delay: Option<Duration>) -> Self {
        self.delay = delay;
        self
    }

    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }

    pub fn render(&self) -> MockResponse {
        MockResponse::new(self.status_code)
            .with_headers(self.headers.clone())
            .with_chunked_body(self.fragments.concat())
            .with_body_delay(self.delay)
    }
}

/// Upgrade to a WebSocket session instantiated from `script`.
#[derive(Debug, Clone)]
pub struct WebSocketUpgrade {
    script: Arc<SessionScript>,
    repeatable: bool,
}

impl WebSocketUpgrade {
    pub fn new(script: Arc<SessionScript>, repeatable: bool) -> Self {
        Self { script, repeatable }
    }

    pub fn script(&self) -> &Arc<SessionScript> {
        &self.script
    }
}
