//! Immutable WebSocket conversation scripts and their builder.
//!
//! A [`SessionScript`] is stored in the expectation registry; every upgrade
//! instantiates a fresh [`WebSocketSession`](super::WebSocketSession) from it,
//! so reply queues are never shared between connections.

use super::message::WebSocketMessage;
use crate::request::{HttpMethod, RequestKey};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// Inbound stimulus that selects a reply queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// A text (or UTF-8 decoded binary) frame from the client.
    Message(String),
    /// An HTTP request handled by the same dispatcher.
    Http(RequestKey),
    /// A message this session itself emitted.
    Emitted(String),
}

/// Message and cause used to simulate a failed upgrade.
#[derive(Debug, Clone)]
pub struct Failure {
    pub message: WebSocketMessage,
    pub cause: String,
}

#[derive(Debug, Clone, Default)]
pub struct SessionScript {
    pub(crate) open: Vec<WebSocketMessage>,
    pub(crate) timed: Vec<WebSocketMessage>,
    pub(crate) replies: HashMap<Trigger, VecDeque<WebSocketMessage>>,
    pub(crate) failure: Option<Failure>,
}

impl SessionScript {
    pub fn builder() -> WebSocketScriptBuilder {
        WebSocketScriptBuilder::new()
    }

    pub fn open_messages(&self) -> &[WebSocketMessage] {
        &self.open
    }

    pub fn timed_messages(&self) -> &[WebSocketMessage] {
        &self.timed
    }

    pub fn replies(&self, trigger: &Trigger) -> Option<&VecDeque<WebSocketMessage>> {
        self.replies.get(trigger)
    }

    pub fn trigger_count(&self) -> usize {
        self.replies.len()
    }

    pub fn failure(&self) -> Option<&Failure> {
        self.failure.as_ref()
    }
}

/// Builds a [`SessionScript`]:
///
/// ```ignore
/// let script = SessionScript::builder()
///     .open(["welcome"])
///     .expect("ping").and_emit("pong").once()
///     .wait_for(Duration::from_millis(50)).and_emit("tick")
///     .build();
/// ```
#[derive(Debug, Clone, Default)]
pub struct WebSocketScriptBuilder {
    script: SessionScript,
}

impl WebSocketScriptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages emitted as soon as the connection opens.
    pub fn open<I, M>(mut self, messages: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<WebSocketMessage>,
    {
        self.script.open.extend(messages.into_iter().map(Into::into));
        self
    }

    /// Reply to a client text frame equal to `text`.
    pub fn expect(self, text: impl Into<String>) -> Expect {
        Expect {
            builder: self,
            trigger: Trigger::Message(text.into()),
        }
    }

    /// Reply when the dispatcher serves an HTTP request for `method` and `path`.
    pub fn expect_http(self, method: HttpMethod, path: impl Into<String>) -> Expect {
        Expect {
            builder: self,
            trigger: Trigger::Http(RequestKey::new(method, path)),
        }
    }

    /// Reply after this session emits a message whose text equals `text`.
    pub fn after_emitting(self, text: impl Into<String>) -> Expect {
        Expect {
            builder: self,
            trigger: Trigger::Emitted(text.into()),
        }
    }

    /// Emit a message `delay` after the connection opens.
    pub fn wait_for(self, delay: Duration) -> Wait {
        Wait {
            builder: self,
            delay,
        }
    }

    /// Script whose upgrade fails: `message` is sent, then the connection is
    /// closed with an internal-error code carrying `cause`.
    pub fn failure(mut self, message: impl Into<WebSocketMessage>, cause: impl Into<String>) -> SessionScript {
        self.script.failure = Some(Failure {
            message: message.into(),
            cause: cause.into(),
        });
        self.script
    }

    pub fn build(self) -> SessionScript {
        self.script
    }

    fn enqueue(mut self, trigger: Trigger, message: WebSocketMessage) -> Self {
        self.script
            .replies
            .entry(trigger)
            .or_default()
            .push_back(message);
        self
    }
}

/// A trigger waiting for its reply.
#[derive(Debug, Clone)]
pub struct Expect {
    builder: WebSocketScriptBuilder,
    trigger: Trigger,
}

impl Expect {
    pub fn and_emit(self, message: impl Into<WebSocketMessage>) -> PendingReply {
        PendingReply {
            builder: self.builder,
            trigger: self.trigger,
            message: message.into(),
        }
    }
}

/// A trigger and reply waiting for a repeat policy.
#[derive(Debug, Clone)]
pub struct PendingReply {
    builder: WebSocketScriptBuilder,
    trigger: Trigger,
    message: WebSocketMessage,
}

impl PendingReply {
    /// Serve the reply once, then drop it from the queue.
    pub fn once(self) -> WebSocketScriptBuilder {
        let message = self.message.to_be_removed(true);
        self.builder.enqueue(self.trigger, message)
    }

    /// Serve the reply for every matching trigger.
    pub fn always(self) -> WebSocketScriptBuilder {
        let message = self.message.to_be_removed(false);
        self.builder.enqueue(self.trigger, message)
    }

    /// Queue the reply `times` times.
    pub fn times(self, times: usize) -> WebSocketScriptBuilder {
        let message = self.message.to_be_removed(true);
        let mut builder = self.builder;
        for _ in 0..times {
            builder = builder.enqueue(self.trigger.clone(), message.clone());
        }
        builder
    }
}

/// A delay waiting for its message.
#[derive(Debug, Clone)]
pub struct Wait {
    builder: WebSocketScriptBuilder,
    delay: Duration,
}

impl Wait {
    pub fn and_emit(mut self, message: impl Into<WebSocketMessage>) -> WebSocketScriptBuilder {
        let message = message.into().with_delay(self.delay);
        self.builder.script.timed.push(message);
        self.builder
    }
}
