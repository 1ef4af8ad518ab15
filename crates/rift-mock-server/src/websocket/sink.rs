//! Outbound side of a WebSocket session.

use bytes::Bytes;
use tokio::sync::mpsc;

/// A frame the session wants written to the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Text(String),
    Binary(Bytes),
    Close { code: u16, reason: String },
}

/// Where a session writes its frames. Sending never blocks; a sink whose
/// connection is gone drops frames silently.
pub trait WebSocketSink: Send + Sync {
    fn send(&self, frame: OutboundFrame);
}

/// Sink backed by an unbounded channel, drained by the connection writer.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<OutboundFrame>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutboundFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl WebSocketSink for ChannelSink {
    fn send(&self, frame: OutboundFrame) {
        let _ = self.tx.send(frame);
    }
}
