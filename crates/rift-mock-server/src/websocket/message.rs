//! Scripted WebSocket messages.

use bytes::Bytes;
use serde::Serialize;
use std::borrow::Cow;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Binary(Bytes),
}

/// A message the session emits, with its delay and queue policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebSocketMessage {
    delay: Duration,
    payload: Payload,
    to_be_removed: bool,
    closing_code: Option<u16>,
}

impl WebSocketMessage {
    pub fn text(body: impl Into<String>) -> Self {
        Self::with_payload(Payload::Text(body.into()))
    }

    pub fn binary(body: impl Into<Bytes>) -> Self {
        Self::with_payload(Payload::Binary(body.into()))
    }

    /// Text message holding `value` serialized as JSON.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_string(value).map(Self::text)
    }

    fn with_payload(payload: Payload) -> Self {
        Self {
            delay: Duration::ZERO,
            payload,
            to_be_removed: true,
            closing_code: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// `false` keeps the message at the head of its reply queue.
    pub fn to_be_removed(mut self, to_be_removed: bool) -> Self {
        self.to_be_removed = to_be_removed;
        self
    }

    /// Close the connection with `code` right after this message is sent.
    pub fn with_closing_code(mut self, code: u16) -> Self {
        self.closing_code = Some(code);
        self
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn is_binary(&self) -> bool {
        matches!(self.payload, Payload::Binary(_))
    }

    pub fn is_to_be_removed(&self) -> bool {
        self.to_be_removed
    }

    pub fn closing_code(&self) -> Option<u16> {
        self.closing_code
    }

    /// Payload as text; binary payloads are decoded lossily.
    pub fn as_text(&self) -> Cow<'_, str> {
        match &self.payload {
            Payload::Text(text) => Cow::Borrowed(text),
            Payload::Binary(bytes) => String::from_utf8_lossy(bytes),
        }
    }
}

impl From<&str> for WebSocketMessage {
    fn from(body: &str) -> Self {
        Self::text(body)
    }
}

impl From<String> for WebSocketMessage {
    fn from(body: String) -> Self {
        Self::text(body)
    }
}
