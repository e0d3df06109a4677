//! Socket task: one per physical connection
//!
//! Bridges a tokio-tungstenite stream to the core. Outbound text arrives on
//! the plan's channel; inbound frames, errors and the final close code are
//! reported through [`SocketHandler`]. Exactly one `on_close` is reported per
//! task, whatever the failure.

use futures::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use super::SocketPlan;
use crate::types::LinkError;

/// Close code reported when the client closed on purpose
pub const NORMAL_CLOSE: u16 = 1000;
/// Close frame without a status code
pub const NO_STATUS: u16 = 1005;
/// Connection lost without a close frame
pub const ABNORMAL_CLOSE: u16 = 1006;

/// Receiver of socket lifecycle events
pub(crate) trait SocketHandler: Send + 'static {
    fn on_open(&self, socket: u64);
    fn on_frame(&self, socket: u64, text: &str);
    fn on_error(&self, socket: u64, error: LinkError);
    fn on_close(&self, socket: u64, code: u16);
}

pub(crate) async fn run_socket<H: SocketHandler>(plan: SocketPlan, handler: H) {
    let SocketPlan {
        id,
        url,
        mut outbound,
    } = plan;

    let stream = match connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            handler.on_error(id, e.into());
            handler.on_close(id, ABNORMAL_CLOSE);
            return;
        }
    };
    handler.on_open(id);

    let (mut sink, mut source) = stream.split();
    let code = loop {
        tokio::select! {
            queued = outbound.recv() => match queued {
                Some(text) => {
                    if let Err(e) = sink.send(Message::text(text)).await {
                        handler.on_error(id, e.into());
                        break ABNORMAL_CLOSE;
                    }
                }
                None => {
                    let frame = CloseFrame {
                        code: CloseCode::Normal,
                        reason: "client shutdown".into(),
                    };
                    if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                        debug!(socket = id, error = %e, "close frame not delivered");
                    }
                    break NORMAL_CLOSE;
                }
            },
            inbound = source.next() => match inbound {
                Some(Ok(Message::Text(text))) => handler.on_frame(id, text.as_str()),
                Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => handler.on_frame(id, text),
                    Err(_) => warn!(socket = id, len = bytes.len(), "dropping non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    break frame.map_or(NO_STATUS, |f| u16::from(f.code));
                }
                // Control frames are answered by tungstenite itself
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    handler.on_error(id, e.into());
                    break ABNORMAL_CLOSE;
                }
                None => break ABNORMAL_CLOSE,
            }
        }
    };

    handler.on_close(id, code);
    if let Err(e) = sink.close().await {
        debug!(socket = id, error = %e, "socket close handshake incomplete");
    }
}
