//! WebSocket upgrade handling and the frame bridge between a connection and
//! its [`WebSocketSession`].

use crate::websocket::{ChannelSink, OutboundFrame, WebSocketSession, NORMAL_CLOSURE};
use futures::{SinkExt, StreamExt};
use hyper::header::{HeaderMap, CONNECTION, SEC_WEBSOCKET_KEY, UPGRADE};
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Role};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, warn};

/// Close code reported to the session when the connection drops without a close frame.
const ABNORMAL_CLOSURE: u16 = 1006;

/// How long to wait for the peer's close reply after we close.
const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// True for an HTTP/1.1 `Upgrade: websocket` request carrying a key.
pub fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    let upgrade = headers
        .get(UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"));
    let connection = headers
        .get(CONNECTION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| {
            v.split(',')
                .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
        });
    upgrade && connection && headers.contains_key(SEC_WEBSOCKET_KEY)
}

/// `Sec-WebSocket-Accept` value for the request's `Sec-WebSocket-Key`.
pub fn accept_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SEC_WEBSOCKET_KEY)
        .map(|key| derive_accept_key(key.as_bytes()))
}

/// Wait for the upgrade to complete, then run `session` on the connection
/// until either side closes.
pub async fn serve_websocket(on_upgrade: OnUpgrade, session: Arc<WebSocketSession>) {
    let upgraded = match on_upgrade.await {
        Ok(upgraded) => upgraded,
        Err(e) => {
            warn!("WebSocket upgrade for session {} failed: {}", session.id(), e);
            session.on_close(ABNORMAL_CLOSURE, "upgrade failed");
            return;
        }
    };

    let stream = WebSocketStream::from_raw_socket(TokioIo::new(upgraded), Role::Server, None).await;
    let (mut write, mut read) = stream.split();
    let (sink, mut outbound) = ChannelSink::new();
    session.open(Arc::new(sink));

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    break;
                };
                let message = match frame {
                    OutboundFrame::Text(text) => Message::text(text),
                    OutboundFrame::Binary(data) => Message::binary(data),
                    OutboundFrame::Close { code, reason } => {
                        let _ = write
                            .send(Message::Close(Some(CloseFrame {
                                code: CloseCode::from(code),
                                reason: reason.into(),
                            })))
                            .await;
                        drain_until_closed(&mut read).await;
                        break;
                    }
                };
                if let Err(e) = write.send(message).await {
                    debug!("WebSocket session {} write failed: {}", session.id(), e);
                    session.on_close(ABNORMAL_CLOSURE, "write failed");
                    break;
                }
            }
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => session.on_message(text.as_str()),
                Some(Ok(Message::Binary(data))) => session.on_binary(&data),
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.to_string()))
                        .unwrap_or((NORMAL_CLOSURE, String::new()));
                    session.on_close(code, &reason);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("WebSocket session {} read failed: {}", session.id(), e);
                    session.on_close(ABNORMAL_CLOSURE, "read failed");
                    break;
                }
                None => {
                    session.on_close(ABNORMAL_CLOSURE, "connection dropped");
                    break;
                }
            }
        }
    }
    debug!("WebSocket session {} connection finished", session.id());
}

async fn drain_until_closed<S>(read: &mut S)
where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    let drain = async {
        while let Some(Ok(message)) = read.next().await {
            if message.is_close() {
                break;
            }
        }
    };
    if tokio::time::timeout(CLOSE_HANDSHAKE_TIMEOUT, drain).await.is_err() {
        debug!("Peer did not answer the close handshake in time");
    }
}
