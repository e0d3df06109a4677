//! Outbound envelopes written by the registry and the RPC correlator

use serde_json::{json, Value};

/// A message the client sends to the backend
#[derive(Clone, Debug, PartialEq)]
pub enum Outbound {
    Subscribe { topic: String },
    Unsubscribe { topic: String },
    Call { id: String, method: String, params: Value },
}

impl Outbound {
    /// Encode into the text frame sent on the socket
    pub fn encode(&self) -> String {
        let value = match self {
            Outbound::Subscribe { topic } => json!({ "t": topic }),
            Outbound::Unsubscribe { topic } => json!({ "t": topic, "o": "unsub" }),
            Outbound::Call { id, method, params } => json!({ "i": id, "m": method, "p": params }),
        };
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(msg: &Outbound) -> Value {
        serde_json::from_str(&msg.encode()).unwrap()
    }

    #[test]
    fn test_subscribe_shapes() {
        let sub = Outbound::Subscribe { topic: "jobs".to_string() };
        assert_eq!(parsed(&sub), json!({"t": "jobs"}));

        let unsub = Outbound::Unsubscribe { topic: "jobs".to_string() };
        assert_eq!(parsed(&unsub), json!({"t": "jobs", "o": "unsub"}));
    }

    #[test]
    fn test_call_shape() {
        let call = Outbound::Call {
            id: "c1".to_string(),
            method: "config.select".to_string(),
            params: json!({"name": "prod"}),
        };
        assert_eq!(
            parsed(&call),
            json!({"i": "c1", "m": "config.select", "p": {"name": "prod"}})
        );
    }
}
