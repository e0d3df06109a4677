//! Wire protocol for the link
//!
//! This module contains the envelope codec: inbound frame decoding and
//! outbound message encoding.

mod envelope;
mod outbound;

pub use envelope::{decode_frame, Frame, Inbound, Op, PathKey, RpcReply, TopicEvent};
pub use outbound::Outbound;

/// Heartbeat token sent by the server
pub const PING: &str = "ping";

/// Heartbeat reply sent by the client
pub const PONG: &str = "pong";
