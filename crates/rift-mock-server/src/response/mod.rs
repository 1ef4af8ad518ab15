//! Response model shared by every dispatcher.
//!
//! - `provider`: where status, headers and body come from
//! - `entry`: queued expectation responses and their repeat policy
//! - [`MockResponse`]: what a dispatcher hands back to the host layer

mod entry;
mod provider;

pub use entry::{ChunkedResponse, ResponseEntry, SimpleResponse, WebSocketUpgrade};
pub use provider::{FixedResponseProvider, FnResponseProvider, ResponseProvider};

use crate::websocket::WebSocketSession;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;

/// Default upper bound for a single chunk of a chunked body.
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 204_800;

/// Body of a [`MockResponse`].
#[derive(Debug, Clone)]
pub enum ResponseBody {
    Empty,
    Full(Bytes),
    /// Sent with chunked transfer encoding.
    Chunked(Bytes),
    /// Switch protocols and hand the connection to this session.
    WebSocket(Arc<WebSocketSession>),
}

/// Response returned to the host layer.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: ResponseBody,
    /// Delay before the body is sent.
    pub body_delay: Option<Duration>,
}

impl MockResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: ResponseBody::Empty,
            body_delay: None,
        }
    }

    pub fn not_found() -> Self {
        Self::new(404)
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = ResponseBody::Full(body.into());
        self
    }

    pub fn with_chunked_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = ResponseBody::Chunked(body.into());
        self
    }

    pub fn websocket(session: Arc<WebSocketSession>) -> Self {
        Self {
            status: 101,
            headers: Vec::new(),
            body: ResponseBody::WebSocket(session),
            body_delay: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_headers(mut self, headers: impl IntoIterator<Item = (String, String)>) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Zero delays are dropped.
    pub fn with_body_delay(mut self, delay: Option<Duration>) -> Self {
        self.body_delay = delay.filter(|d| !d.is_zero());
        self
    }

    /// Full or chunked body bytes.
    pub fn body_bytes(&self) -> Option<&Bytes> {
        match &self.body {
            ResponseBody::Full(bytes) | ResponseBody::Chunked(bytes) => Some(bytes),
            ResponseBody::Empty | ResponseBody::WebSocket(_) => None,
        }
    }

    pub fn body_text(&self) -> Option<String> {
        self.body_bytes()
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    pub fn websocket_session(&self) -> Option<&Arc<WebSocketSession>> {
        match &self.body {
            ResponseBody::WebSocket(session) => Some(session),
            _ => None,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Split `body` into pieces of at most `max_chunk_size` bytes.
pub fn split_chunks(body: &Bytes, max_chunk_size: usize) -> Vec<Bytes> {
    let size = max_chunk_size.max(1);
    let mut chunks = Vec::with_capacity(body.len() / size + 1);
    let mut offset = 0;
    while offset < body.len() {
        let end = (offset + size).min(body.len());
        chunks.push(body.slice(offset..end));
        offset = end;
    }
    chunks
}
