//! Connection status and lifecycle signals published to consumers

use serde::{Deserialize, Serialize};

/// Lifecycle state of the single physical connection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
    Reconnecting,
}

/// Snapshot of the connection published through a watch channel
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkStatus {
    pub state: ConnectionState,

    /// Number of successful opens so far. Never reset.
    pub generation: u64,

    /// Consecutive failed reconnect attempts since the last open
    pub attempt: u32,

    /// Unix timestamp (ms) of the last state change
    pub changed_at: i64,
}

impl LinkStatus {
    pub(crate) fn initial() -> Self {
        Self {
            state: ConnectionState::Closed,
            generation: 0,
            attempt: 0,
            changed_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// True while the socket is open and usable
    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }
}

/// Lifecycle signals broadcast to the UI layer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LinkEvent {
    /// A socket opened; `generation` is the new generation counter
    Connected { generation: u64 },

    /// The socket closed with the given close code (1006 for abnormal drops)
    Disconnected { code: u16 },

    /// The server rejected our credentials; the UI should go to login
    LoginRequired,

    /// All client-side data must be reloaded from scratch
    Invalidated,

    /// The transport reported an error; the following close drives recovery
    TransportError { message: String },
}

/// How a close code is handled
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseDisposition {
    /// Authentication failure: clear everything, go to login, no retry
    Login,
    /// Unrecoverable server condition: clear everything, invalidate, no retry
    Fatal,
    /// Anything else: keep data, drop readiness, retry with backoff
    Retry,
}

impl CloseDisposition {
    /// Classify a close code against the configured reserved values
    pub fn classify(code: u16, auth_code: u16, fatal_threshold: u16) -> Self {
        if code == auth_code {
            CloseDisposition::Login
        } else if code >= fatal_threshold {
            CloseDisposition::Fatal
        } else {
            CloseDisposition::Retry
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_close_codes() {
        assert_eq!(CloseDisposition::classify(4001, 4001, 4000), CloseDisposition::Login);
        assert_eq!(CloseDisposition::classify(4000, 4001, 4000), CloseDisposition::Fatal);
        assert_eq!(CloseDisposition::classify(4500, 4001, 4000), CloseDisposition::Fatal);
        assert_eq!(CloseDisposition::classify(1000, 4001, 4000), CloseDisposition::Retry);
        assert_eq!(CloseDisposition::classify(1006, 4001, 4000), CloseDisposition::Retry);
    }

    #[test]
    fn test_link_event_serialization() {
        let json = serde_json::to_string(&LinkEvent::Connected { generation: 3 }).unwrap();
        assert!(json.contains("connected"));
        assert!(json.contains('3'));
    }
}
