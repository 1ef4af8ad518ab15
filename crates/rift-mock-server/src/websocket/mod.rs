//! Scripted WebSocket conversations.
//!
//! - `script`: the immutable conversation a test registers
//! - `session`: per-connection state instantiated from a script
//! - `timer`: the session's private scheduler for delayed emissions
//! - `sink`: the outbound frame channel the host layer drains

mod message;
mod script;
mod session;
mod sink;
mod timer;

pub use message::{Payload, WebSocketMessage};
pub use script::{
    Expect, Failure, PendingReply, SessionScript, Trigger, Wait, WebSocketScriptBuilder,
};
pub use session::{
    truncate_reason, SessionConfig, SessionPhase, WebSocketSession, INTERNAL_ERROR,
    MAX_CLOSE_REASON_LEN, NORMAL_CLOSURE, PROTOCOL_ERROR,
};
pub use sink::{ChannelSink, OutboundFrame, WebSocketSink};
pub use timer::SessionTimer;
