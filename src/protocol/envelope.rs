//! Inbound envelope decoding
//!
//! A frame carries either the heartbeat token or one JSON envelope / an array
//! of envelopes. Each envelope is decoded once into an [`Inbound`] variant so
//! nothing downstream inspects raw wire objects.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::PING;
use crate::types::{LinkError, LinkResult};

/// Mutation kind carried by a topic envelope
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    /// Replace the whole value (snapshot)
    Full,
    /// Deep-set at path; appends for scroll topics
    Add,
    /// Deep-set at path
    Set,
    /// Deep-delete at path
    Del,
}

impl Op {
    fn parse(raw: &str) -> LinkResult<Self> {
        match raw {
            "full" => Ok(Op::Full),
            "add" => Ok(Op::Add),
            "set" => Ok(Op::Set),
            "del" => Ok(Op::Del),
            other => Err(LinkError::Malformed(format!("unknown op '{}'", other))),
        }
    }
}

/// One step of a path into a topic value
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathKey {
    /// Array position
    Index(usize),
    /// Object key
    Key(String),
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathKey::Index(i) => write!(f, "{}", i),
            PathKey::Key(k) => write!(f, "{}", k),
        }
    }
}

impl From<&str> for PathKey {
    fn from(key: &str) -> Self {
        PathKey::Key(key.to_string())
    }
}

impl From<usize> for PathKey {
    fn from(index: usize) -> Self {
        PathKey::Index(index)
    }
}

/// A topic mutation
#[derive(Clone, Debug, PartialEq)]
pub struct TopicEvent {
    pub topic: String,
    pub op: Op,
    pub path: Vec<PathKey>,
    pub value: Value,
}

/// A correlated response to an RPC call
#[derive(Clone, Debug, PartialEq)]
pub struct RpcReply {
    pub id: String,

    /// Error payload; `None` means the call succeeded
    pub error: Option<Value>,
}

/// A decoded envelope
#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
    Topic(TopicEvent),
    Rpc(RpcReply),
}

/// A decoded frame
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    /// Server heartbeat; answer with the pong token and do nothing else
    Heartbeat,
    Envelopes(Vec<Inbound>),
}

/// Raw wire shape shared by topic pushes and RPC replies
#[derive(Deserialize, Debug, Default)]
struct WireEnvelope {
    #[serde(default)]
    t: Option<String>,
    #[serde(default)]
    o: Option<String>,
    #[serde(default)]
    k: Vec<PathKey>,
    #[serde(default)]
    v: Option<Value>,
    #[serde(default)]
    i: Option<String>,
}

impl WireEnvelope {
    fn into_inbound(self) -> LinkResult<Inbound> {
        // The correlation id is the discriminant; it wins over a topic.
        if let Some(id) = self.i {
            let error = match self.v {
                None | Some(Value::Null) => None,
                Some(Value::String(s)) if s.is_empty() => None,
                Some(v) => Some(v),
            };
            return Ok(Inbound::Rpc(RpcReply { id, error }));
        }

        let topic = self
            .t
            .ok_or_else(|| LinkError::Malformed("envelope has neither 't' nor 'i'".to_string()))?;
        let op = match self.o.as_deref() {
            Some(raw) => Op::parse(raw)?,
            None => Op::Add,
        };

        Ok(Inbound::Topic(TopicEvent {
            topic,
            op,
            path: self.k,
            value: self.v.unwrap_or(Value::Null),
        }))
    }
}

fn decode_envelope(value: Value) -> LinkResult<Inbound> {
    let wire: WireEnvelope = serde_json::from_value(value)?;
    wire.into_inbound()
}

/// Decode one text frame.
///
/// A frame that is not valid JSON is an error. Inside an array, envelopes
/// that fail to decode are logged and skipped so the rest of the frame still
/// applies.
pub fn decode_frame(text: &str) -> LinkResult<Frame> {
    if text == PING {
        return Ok(Frame::Heartbeat);
    }

    let parsed: Value = serde_json::from_str(text)?;
    match parsed {
        Value::Array(items) => {
            let mut envelopes = Vec::with_capacity(items.len());
            for (index, item) in items.into_iter().enumerate() {
                match decode_envelope(item) {
                    Ok(inbound) => envelopes.push(inbound),
                    Err(e) => warn!(index, error = %e, "skipping malformed envelope"),
                }
            }
            Ok(Frame::Envelopes(envelopes))
        }
        Value::Object(_) => Ok(Frame::Envelopes(vec![decode_envelope(parsed)?])),
        other => Err(LinkError::Malformed(format!(
            "expected object or array, got {}",
            other
        ))),
    }
}
