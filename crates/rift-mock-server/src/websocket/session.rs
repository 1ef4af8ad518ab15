//! Live WebSocket session driven by a [`SessionScript`].

use super::message::{Payload, WebSocketMessage};
use super::script::{Failure, SessionScript, Trigger};
use super::sink::{OutboundFrame, WebSocketSink};
use super::timer::SessionTimer;
use crate::metrics;
use crate::request::{RecordedRequest, RequestKey};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const NORMAL_CLOSURE: u16 = 1000;
pub const PROTOCOL_ERROR: u16 = 1002;
pub const INTERNAL_ERROR: u16 = 1011;

/// Largest close reason a control frame can carry.
pub const MAX_CLOSE_REASON_LEN: usize = 123;

const CLOSING_REASON: &str = "Closing...";
const UNEXPECTED_PREFIX: &str = "Unexpected message:";

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// How long a graceful close waits for scheduled emissions.
    pub close_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            close_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Created, connection not yet upgraded.
    Pending,
    Open,
    /// Draining scheduled emissions before a normal close.
    Closing,
    Closed,
}

struct SessionState {
    phase: SessionPhase,
    replies: HashMap<Trigger, VecDeque<WebSocketMessage>>,
    sink: Option<Arc<dyn WebSocketSink>>,
}

enum ReplyLookup {
    Reply(WebSocketMessage),
    Exhausted,
    Unregistered,
}

/// One connection's conversation state.
///
/// Reply queues are copied from the script, so sessions never share them.
pub struct WebSocketSession {
    id: u64,
    config: SessionConfig,
    open_messages: Vec<WebSocketMessage>,
    timed_messages: Vec<WebSocketMessage>,
    failure: Option<Failure>,
    state: Mutex<SessionState>,
    timer: SessionTimer,
}

impl WebSocketSession {
    pub fn new(script: &SessionScript, config: SessionConfig) -> Self {
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            config,
            open_messages: script.open.clone(),
            timed_messages: script.timed.clone(),
            failure: script.failure.clone(),
            state: Mutex::new(SessionState {
                phase: SessionPhase::Pending,
                replies: script.replies.clone(),
                sink: None,
            }),
            timer: SessionTimer::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.lock().phase
    }

    pub fn is_closed(&self) -> bool {
        self.phase() == SessionPhase::Closed
    }

    /// Attach the connection and start the script.
    ///
    /// Must be called inside a Tokio runtime. Calling it twice has no effect.
    pub fn open(self: &Arc<Self>, sink: Arc<dyn WebSocketSink>) {
        {
            let mut state = self.state.lock();
            if state.phase != SessionPhase::Pending {
                return;
            }
            state.phase = SessionPhase::Open;
            state.sink = Some(sink.clone());
        }
        metrics::record_websocket_event("opened");

        if let Some(failure) = &self.failure {
            info!("WebSocket session {} failing on open: {}", self.id, failure.cause);
            metrics::record_websocket_event("failed");
            send_message(sink.as_ref(), &failure.message);
            self.close_with(INTERNAL_ERROR, &failure.cause);
            return;
        }

        debug!(
            "WebSocket session {} opened ({} open, {} timed message(s))",
            self.id,
            self.open_messages.len(),
            self.timed_messages.len()
        );
        for message in self.open_messages.iter().chain(&self.timed_messages) {
            self.schedule(message.clone());
        }
        self.close_if_finished();
    }

    /// Handle a text frame from the peer.
    pub fn on_message(self: &Arc<Self>, text: &str) {
        match self.phase() {
            SessionPhase::Open => {}
            // No triggers are left once closing starts.
            SessionPhase::Closing => {
                self.reject(text);
                return;
            }
            phase => {
                debug!("WebSocket session {} ignoring message while {:?}", self.id, phase);
                return;
            }
        }
        match self.take_reply(&Trigger::Message(text.to_string())) {
            ReplyLookup::Reply(message) => {
                self.schedule(message);
                self.close_if_finished();
            }
            ReplyLookup::Exhausted | ReplyLookup::Unregistered => self.reject(text),
        }
    }

    /// Handle a binary frame from the peer; the payload is matched as UTF-8 text.
    pub fn on_binary(self: &Arc<Self>, data: &[u8]) {
        self.on_message(&String::from_utf8_lossy(data));
    }

    /// Offer an HTTP request served by the same dispatcher.
    ///
    /// Requests without a registered trigger are ignored. The exact-method
    /// trigger shadows the any-method one, even once it is exhausted.
    pub fn on_http_request(self: &Arc<Self>, request: &RecordedRequest) {
        if self.phase() != SessionPhase::Open {
            return;
        }
        for key in RequestKey::lookup_order(&request.method, &request.path) {
            match self.take_reply(&Trigger::Http(key)) {
                ReplyLookup::Reply(message) => {
                    debug!(
                        "WebSocket session {} replying to {} {}",
                        self.id, request.method, request.path
                    );
                    self.schedule(message);
                    self.close_if_finished();
                    return;
                }
                ReplyLookup::Exhausted => {
                    self.reject(&format!("from http {}", request.path));
                    return;
                }
                ReplyLookup::Unregistered => {}
            }
        }
    }

    /// The peer closed the connection: drop pending emissions and echo the close.
    pub fn on_close(&self, code: u16, reason: &str) {
        let sink = {
            let mut state = self.state.lock();
            if state.phase == SessionPhase::Closed {
                return;
            }
            state.phase = SessionPhase::Closed;
            state.sink.take()
        };
        self.timer.cancel();
        metrics::record_websocket_event("closed");
        debug!("WebSocket session {} closed by peer ({} {})", self.id, code, reason);
        if let Some(sink) = sink {
            sink.send(OutboundFrame::Close {
                code,
                reason: truncate_reason(reason),
            });
        }
    }

    fn take_reply(&self, trigger: &Trigger) -> ReplyLookup {
        let mut state = self.state.lock();
        let Some(queue) = state.replies.get_mut(trigger) else {
            return ReplyLookup::Unregistered;
        };
        let Some(head) = queue.front().cloned() else {
            return ReplyLookup::Exhausted;
        };
        if head.is_to_be_removed() {
            queue.pop_front();
        }
        ReplyLookup::Reply(head)
    }

    fn schedule(self: &Arc<Self>, message: WebSocketMessage) {
        let session: Weak<Self> = Arc::downgrade(self);
        let delay = message.delay();
        let accepted = self.timer.schedule(delay, move || {
            if let Some(session) = session.upgrade() {
                session.emit(&message);
            }
        });
        if !accepted {
            debug!("WebSocket session {} dropped a message after shutdown", self.id);
        }
    }

    fn emit(self: &Arc<Self>, message: &WebSocketMessage) {
        let sink = {
            let state = self.state.lock();
            if state.phase == SessionPhase::Closed {
                return;
            }
            state.sink.clone()
        };
        let Some(sink) = sink else {
            return;
        };
        send_message(sink.as_ref(), message);

        if let Some(code) = message.closing_code() {
            self.close_with(code, "");
            return;
        }

        let emitted = message.as_text().into_owned();
        match self.take_reply(&Trigger::Emitted(emitted.clone())) {
            ReplyLookup::Reply(next) => self.schedule(next),
            ReplyLookup::Exhausted => self.reject(&emitted),
            ReplyLookup::Unregistered => {}
        }
    }

    fn reject(&self, payload: &str) {
        warn!("WebSocket session {} received unexpected message: {}", self.id, payload);
        metrics::record_websocket_event("unexpected");
        self.close_with(PROTOCOL_ERROR, &format!("{}{}", UNEXPECTED_PREFIX, payload));
    }

    fn close_with(&self, code: u16, reason: &str) {
        let sink = {
            let mut state = self.state.lock();
            if state.phase == SessionPhase::Closed {
                return;
            }
            state.phase = SessionPhase::Closed;
            state.sink.take()
        };
        self.timer.cancel();
        metrics::record_websocket_event("closed");
        debug!("WebSocket session {} closing with {} {}", self.id, code, reason);
        if let Some(sink) = sink {
            sink.send(OutboundFrame::Close {
                code,
                reason: truncate_reason(reason),
            });
        }
    }

    /// Close normally once no triggers are registered, after scheduled
    /// emissions have drained.
    fn close_if_finished(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            if state.phase != SessionPhase::Open || !state.replies.is_empty() {
                return;
            }
            state.phase = SessionPhase::Closing;
        }
        let session = Arc::clone(self);
        tokio::spawn(async move {
            if !session.timer.shutdown(session.config.close_timeout).await {
                warn!(
                    "WebSocket session {} closed with undelivered messages after {:?}",
                    session.id, session.config.close_timeout
                );
            }
            session.close_with(NORMAL_CLOSURE, CLOSING_REASON);
        });
    }
}

impl fmt::Debug for WebSocketSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketSession")
            .field("id", &self.id)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

impl Drop for WebSocketSession {
    fn drop(&mut self) {
        self.timer.cancel();
    }
}

fn send_message(sink: &dyn WebSocketSink, message: &WebSocketMessage) {
    let frame = match message.payload() {
        Payload::Text(text) => OutboundFrame::Text(text.clone()),
        Payload::Binary(bytes) => OutboundFrame::Binary(bytes.clone()),
    };
    sink.send(frame);
}

/// Cut `reason` to at most [`MAX_CLOSE_REASON_LEN`] bytes on a char boundary.
pub fn truncate_reason(reason: &str) -> String {
    if reason.len() <= MAX_CLOSE_REASON_LEN {
        return reason.to_string();
    }
    let mut end = MAX_CLOSE_REASON_LEN;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    reason[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::HttpMethod;
    use crate::websocket::ChannelSink;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn start(script: SessionScript) -> (Arc<WebSocketSession>, UnboundedReceiver<OutboundFrame>) {
        let session = Arc::new(WebSocketSession::new(
            &script,
            SessionConfig {
                close_timeout: Duration::from_secs(2),
            },
        ));
        let (sink, rx) = ChannelSink::new();
        session.open(Arc::new(sink));
        (session, rx)
    }

    async fn next(rx: &mut UnboundedReceiver<OutboundFrame>) -> OutboundFrame {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("sink closed")
    }

    fn text(s: &str) -> OutboundFrame {
        OutboundFrame::Text(s.to_string())
    }

    #[tokio::test]
    async fn test_ping_pong_once_then_unexpected() {
        let script = SessionScript::builder()
            .expect("ping")
            .and_emit("pong")
            .once()
            .build();
        let (session, mut rx) = start(script);

        session.on_message("ping");
        assert_eq!(next(&mut rx).await, text("pong"));

        session.on_message("ping");
        match next(&mut rx).await {
            OutboundFrame::Close { code, reason } => {
                assert_eq!(code, PROTOCOL_ERROR);
                assert_eq!(reason, "Unexpected message:ping");
            }
            other => panic!("expected close, got {:?}", other),
        }
        assert!(session.is_closed());
    }

    #[tokio::test]
    async fn test_always_reply_is_not_consumed() {
        let script = SessionScript::builder()
            .expect("status")
            .and_emit("up")
            .always()
            .build();
        let (session, mut rx) = start(script);
        for _ in 0..3 {
            session.on_message("status");
            assert_eq!(next(&mut rx).await, text("up"));
        }
        assert_eq!(session.phase(), SessionPhase::Open);
    }

    #[tokio::test]
    async fn test_no_triggers_closes_after_open_messages() {
        let script = SessionScript::builder().open(["hello", "world"]).build();
        let (session, mut rx) = start(script);

        assert_eq!(next(&mut rx).await, text("hello"));
        assert_eq!(next(&mut rx).await, text("world"));
        assert_eq!(
            next(&mut rx).await,
            OutboundFrame::Close {
                code: NORMAL_CLOSURE,
                reason: "Closing...".to_string()
            }
        );
        assert!(session.is_closed());
    }

    #[tokio::test]
    async fn test_timed_messages_follow_their_delays() {
        let script = SessionScript::builder()
            .wait_for(Duration::from_millis(60))
            .and_emit("late")
            .wait_for(Duration::from_millis(10))
            .and_emit("early")
            .open(["now"])
            .build();
        let (_session, mut rx) = start(script);

        assert_eq!(next(&mut rx).await, text("now"));
        assert_eq!(next(&mut rx).await, text("early"));
        assert_eq!(next(&mut rx).await, text("late"));
        assert!(matches!(
            next(&mut rx).await,
            OutboundFrame::Close { code: NORMAL_CLOSURE, .. }
        ));
    }

    #[tokio::test]
    async fn test_http_trigger() {
        let script = SessionScript::builder()
            .expect_http(HttpMethod::Post, "/events")
            .and_emit("event")
            .once()
            .build();
        let (session, mut rx) = start(script);

        session.on_http_request(&RecordedRequest::new("GET", "/unrelated"));
        session.on_http_request(&RecordedRequest::new("POST", "/events"));
        assert_eq!(next(&mut rx).await, text("event"));

        session.on_http_request(&RecordedRequest::new("POST", "/events"));
        match next(&mut rx).await {
            OutboundFrame::Close { code, reason } => {
                assert_eq!(code, PROTOCOL_ERROR);
                assert_eq!(reason, "Unexpected message:from http /events");
            }
            other => panic!("expected close, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failure_closes_with_internal_error() {
        let script = SessionScript::builder().failure("boom", "upstream gone");
        let (session, mut rx) = start(script);

        assert_eq!(next(&mut rx).await, text("boom"));
        assert_eq!(
            next(&mut rx).await,
            OutboundFrame::Close {
                code: INTERNAL_ERROR,
                reason: "upstream gone".to_string()
            }
        );
        assert!(session.is_closed());
    }

    #[tokio::test]
    async fn test_closing_code_closes_after_message() {
        let script = SessionScript::builder()
            .expect("bye")
            .and_emit(WebSocketMessage::text("farewell").with_closing_code(4000))
            .once()
            .build();
        let (session, mut rx) = start(script);

        session.on_message("bye");
        assert_eq!(next(&mut rx).await, text("farewell"));
        assert!(matches!(next(&mut rx).await, OutboundFrame::Close { code: 4000, .. }));
        assert!(session.is_closed());
    }

    #[tokio::test]
    async fn test_peer_close_cancels_pending_emissions() {
        let script = SessionScript::builder()
            .expect("slow")
            .and_emit(WebSocketMessage::text("too late").with_delay(Duration::from_millis(200)))
            .once()
            .build();
        let (session, mut rx) = start(script);

        session.on_message("slow");
        session.on_close(1000, "done");
        assert_eq!(
            next(&mut rx).await,
            OutboundFrame::Close {
                code: 1000,
                reason: "done".to_string()
            }
        );
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_second_request_sees_dequeued_reply_before_it_is_sent() {
        let script = SessionScript::builder()
            .expect("slow")
            .and_emit(WebSocketMessage::text("eventually").with_delay(Duration::from_millis(200)))
            .once()
            .build();
        let (session, mut rx) = start(script);

        session.on_message("slow");
        session.on_message("slow");
        assert_eq!(
            next(&mut rx).await,
            OutboundFrame::Close {
                code: PROTOCOL_ERROR,
                reason: "Unexpected message:slow".to_string()
            }
        );
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_message_while_draining_closes_with_protocol_error() {
        let script = SessionScript::builder()
            .wait_for(Duration::from_millis(200))
            .and_emit("later")
            .build();
        let (session, mut rx) = start(script);
        assert_eq!(session.phase(), SessionPhase::Closing);

        session.on_message("hello");
        assert_eq!(
            next(&mut rx).await,
            OutboundFrame::Close {
                code: PROTOCOL_ERROR,
                reason: "Unexpected message:hello".to_string()
            }
        );
        assert!(session.is_closed());
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_exhausted_exact_http_trigger_shadows_any_method() {
        let script = SessionScript::builder()
            .expect_http(HttpMethod::Post, "/events")
            .and_emit("exact")
            .once()
            .expect_http(HttpMethod::Any, "/events")
            .and_emit("any")
            .always()
            .build();
        let (session, mut rx) = start(script);

        session.on_http_request(&RecordedRequest::new("GET", "/events"));
        assert_eq!(next(&mut rx).await, text("any"));
        session.on_http_request(&RecordedRequest::new("POST", "/events"));
        assert_eq!(next(&mut rx).await, text("exact"));

        session.on_http_request(&RecordedRequest::new("POST", "/events"));
        assert_eq!(
            next(&mut rx).await,
            OutboundFrame::Close {
                code: PROTOCOL_ERROR,
                reason: "Unexpected message:from http /events".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_exhausted_chained_reply_closes_with_protocol_error() {
        let script = SessionScript::builder()
            .expect("go")
            .and_emit("tick")
            .always()
            .after_emitting("tick")
            .and_emit("tock")
            .once()
            .build();
        let (session, mut rx) = start(script);

        session.on_message("go");
        assert_eq!(next(&mut rx).await, text("tick"));
        assert_eq!(next(&mut rx).await, text("tock"));

        session.on_message("go");
        assert_eq!(next(&mut rx).await, text("tick"));
        assert_eq!(
            next(&mut rx).await,
            OutboundFrame::Close {
                code: PROTOCOL_ERROR,
                reason: "Unexpected message:tick".to_string()
            }
        );
        assert!(session.is_closed());
    }

    #[tokio::test]
    async fn test_chained_replies_follow_emitted_messages() {
        let script = SessionScript::builder()
            .expect("start")
            .and_emit("step-1")
            .once()
            .after_emitting("step-1")
            .and_emit("step-2")
            .once()
            .after_emitting("step-2")
            .and_emit("step-3")
            .once()
            .build();
        let (session, mut rx) = start(script);

        session.on_message("start");
        assert_eq!(next(&mut rx).await, text("step-1"));
        assert_eq!(next(&mut rx).await, text("step-2"));
        assert_eq!(next(&mut rx).await, text("step-3"));
        assert_eq!(session.phase(), SessionPhase::Open);
    }

    #[tokio::test]
    async fn test_binary_frames_match_as_text() {
        let script = SessionScript::builder()
            .expect("ping")
            .and_emit(WebSocketMessage::binary(&b"pong"[..]))
            .once()
            .build();
        let (session, mut rx) = start(script);

        session.on_binary(b"ping");
        assert_eq!(
            next(&mut rx).await,
            OutboundFrame::Binary(bytes::Bytes::from_static(b"pong"))
        );
    }

    #[test]
    fn test_truncate_reason() {
        let long = "x".repeat(200);
        assert_eq!(truncate_reason(&long).len(), MAX_CLOSE_REASON_LEN);
        assert_eq!(truncate_reason("short"), "short");

        let multibyte = "é".repeat(100);
        let cut = truncate_reason(&multibyte);
        assert!(cut.len() <= MAX_CLOSE_REASON_LEN);
        assert!(cut.chars().all(|c| c == 'é'));
    }
}
