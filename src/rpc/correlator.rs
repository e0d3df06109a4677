//! Correlation table for request/response calls
//!
//! Every call handle owns one slot. Issuing a call gives the slot a fresh
//! correlation id; an inbound reply carrying that id resolves the slot exactly
//! once. Replies for ids nobody is waiting on are dropped.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

use crate::protocol::{Outbound, RpcReply};

/// State of a call handle as seen by the UI element that owns it
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "error", rename_all = "snake_case")]
pub enum CallState {
    /// Nothing issued, or reset by the caller
    Idle,
    /// Waiting for the correlated reply
    Pending,
    Success,
    /// The backend answered with an error payload
    Error(Value),
}

/// How an inbound reply was handled
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    Success,
    Failure,
    /// No pending call for that id; discarded
    Stale,
}

#[derive(Clone, Debug)]
struct Request {
    method: String,
    params: Value,
}

impl Request {
    fn to_outbound(&self, id: String) -> Outbound {
        Outbound::Call {
            id,
            method: self.method.clone(),
            params: self.params.clone(),
        }
    }
}

struct CallSlot {
    state: watch::Sender<CallState>,
    /// Correlation id currently awaited
    pending: Option<String>,
    /// Last request issued through this handle
    last: Option<Request>,
    resilient: bool,
    /// Last request that succeeded (resilient handles only)
    last_success: Option<Request>,
}

/// Pending-call table
#[derive(Default)]
pub struct Correlator {
    slots: HashMap<u64, CallSlot>,
    pending: HashMap<String, u64>,
    next_handle: u64,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of calls awaiting a reply
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, correlation_id: &str) -> bool {
        self.pending.contains_key(correlation_id)
    }

    /// Create a handle slot
    pub fn register(&mut self, resilient: bool) -> (u64, watch::Receiver<CallState>) {
        self.next_handle += 1;
        let (state, rx) = watch::channel(CallState::Idle);
        self.slots.insert(
            self.next_handle,
            CallSlot {
                state,
                pending: None,
                last: None,
                resilient,
                last_success: None,
            },
        );
        (self.next_handle, rx)
    }

    /// Issue a call on a handle. Any earlier pending call on the same handle
    /// is unregistered first, so its reply will be dropped.
    pub fn issue(&mut self, handle: u64, method: String, params: Value) -> Option<Outbound> {
        let request = Request { method, params };
        self.issue_request(handle, request)
    }

    /// Reissue the handle's last request
    pub fn retry(&mut self, handle: u64) -> Option<Outbound> {
        let request = self.slots.get(&handle)?.last.clone()?;
        self.issue_request(handle, request)
    }

    /// Caller-driven unregistration: forget the pending call, back to idle
    pub fn reset(&mut self, handle: u64) {
        if let Some(slot) = self.slots.get_mut(&handle) {
            if let Some(id) = slot.pending.take() {
                self.pending.remove(&id);
            }
            slot.state.send_replace(CallState::Idle);
        }
    }

    /// The handle went away
    pub fn release(&mut self, handle: u64) {
        if let Some(slot) = self.slots.remove(&handle) {
            if let Some(id) = slot.pending {
                self.pending.remove(&id);
            }
        }
    }

    /// Resolve a pending call from a correlated reply
    pub fn resolve(&mut self, reply: RpcReply) -> Resolution {
        let Some(handle) = self.pending.remove(&reply.id) else {
            debug!(id = %reply.id, "dropping reply for unknown correlation id");
            return Resolution::Stale;
        };
        let Some(slot) = self.slots.get_mut(&handle) else {
            return Resolution::Stale;
        };
        slot.pending = None;

        match reply.error {
            None => {
                if slot.resilient {
                    slot.last_success = slot.last.clone();
                }
                slot.state.send_replace(CallState::Success);
                Resolution::Success
            }
            Some(error) => {
                slot.state.send_replace(CallState::Error(error));
                Resolution::Failure
            }
        }
    }

    /// Reissue the last successful request of every resilient handle.
    /// A call still pending on such a handle is superseded.
    pub fn replay_resilient(&mut self) -> Vec<Outbound> {
        let replays: Vec<(u64, Request)> = self
            .slots
            .iter()
            .filter(|(_, slot)| slot.resilient)
            .filter_map(|(handle, slot)| slot.last_success.clone().map(|req| (*handle, req)))
            .collect();

        replays
            .into_iter()
            .filter_map(|(handle, request)| self.issue_request(handle, request))
            .collect()
    }

    fn issue_request(&mut self, handle: u64, request: Request) -> Option<Outbound> {
        if !self.slots.contains_key(&handle) {
            return None;
        }

        let mut id = Uuid::now_v7().to_string();
        while self.pending.contains_key(&id) {
            id = Uuid::now_v7().to_string();
        }

        let slot = self.slots.get_mut(&handle)?;
        if let Some(previous) = slot.pending.replace(id.clone()) {
            self.pending.remove(&previous);
        }
        let outbound = request.to_outbound(id.clone());
        slot.last = Some(request);
        slot.state.send_replace(CallState::Pending);
        self.pending.insert(id, handle);
        Some(outbound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call_id(outbound: &Outbound) -> String {
        match outbound {
            Outbound::Call { id, .. } => id.clone(),
            other => panic!("expected a call, got {:?}", other),
        }
    }

    fn reply(id: &str, error: Option<Value>) -> RpcReply {
        RpcReply {
            id: id.to_string(),
            error,
        }
    }

    #[test]
    fn test_success_without_payload() {
        let mut table = Correlator::new();
        let (handle, rx) = table.register(false);
        let out = table.issue(handle, "jobs.start".to_string(), json!({"id": 7})).unwrap();
        assert_eq!(*rx.borrow(), CallState::Pending);

        assert_eq!(table.resolve(reply(&call_id(&out), None)), Resolution::Success);
        assert_eq!(*rx.borrow(), CallState::Success);
        assert_eq!(table.pending_len(), 0);
    }

    #[test]
    fn test_error_payload_goes_to_error_path() {
        let mut table = Correlator::new();
        let (handle, rx) = table.register(false);
        let out = table.issue(handle, "jobs.start".to_string(), Value::Null).unwrap();

        let payload = json!({"message": "no such job"});
        assert_eq!(
            table.resolve(reply(&call_id(&out), Some(payload.clone()))),
            Resolution::Failure
        );
        assert_eq!(*rx.borrow(), CallState::Error(payload));
    }

    #[test]
    fn test_unknown_and_repeated_replies_are_stale() {
        let mut table = Correlator::new();
        let (handle, rx) = table.register(false);
        assert_eq!(table.resolve(reply("nobody", None)), Resolution::Stale);

        let out = table.issue(handle, "m".to_string(), Value::Null).unwrap();
        let id = call_id(&out);
        assert_eq!(table.resolve(reply(&id, None)), Resolution::Success);
        assert_eq!(
            table.resolve(reply(&id, Some(json!("late")))),
            Resolution::Stale
        );
        assert_eq!(*rx.borrow(), CallState::Success);
    }

    #[test]
    fn test_reset_unregisters_pending_call() {
        let mut table = Correlator::new();
        let (handle, rx) = table.register(false);
        let out = table.issue(handle, "m".to_string(), Value::Null).unwrap();

        table.reset(handle);
        assert_eq!(*rx.borrow(), CallState::Idle);
        assert_eq!(table.resolve(reply(&call_id(&out), None)), Resolution::Stale);
        assert_eq!(*rx.borrow(), CallState::Idle);
    }

    #[test]
    fn test_reissue_drops_previous_id() {
        let mut table = Correlator::new();
        let (handle, _rx) = table.register(false);
        let first = call_id(&table.issue(handle, "m".to_string(), Value::Null).unwrap());
        let second = call_id(&table.retry(handle).unwrap());

        assert_ne!(first, second);
        assert!(!table.is_pending(&first));
        assert!(table.is_pending(&second));
    }

    #[test]
    fn test_release_forgets_everything() {
        let mut table = Correlator::new();
        let (handle, _rx) = table.register(true);
        table.issue(handle, "m".to_string(), Value::Null);
        table.release(handle);
        assert_eq!(table.pending_len(), 0);
        assert!(table.retry(handle).is_none());
    }

    #[test]
    fn test_replay_only_resilient_successes() {
        let mut table = Correlator::new();
        let (plain, _) = table.register(false);
        let (resilient, rx) = table.register(true);
        let (never_ok, _) = table.register(true);

        let a = call_id(&table.issue(plain, "plain".to_string(), Value::Null).unwrap());
        let b = call_id(
            &table
                .issue(resilient, "config.select".to_string(), json!({"name": "prod"}))
                .unwrap(),
        );
        let c = call_id(&table.issue(never_ok, "x".to_string(), Value::Null).unwrap());
        table.resolve(reply(&a, None));
        table.resolve(reply(&b, None));
        table.resolve(reply(&c, Some(json!("boom"))));

        let replays = table.replay_resilient();
        assert_eq!(replays.len(), 1);
        match &replays[0] {
            Outbound::Call { method, params, .. } => {
                assert_eq!(method, "config.select");
                assert_eq!(params, &json!({"name": "prod"}));
            }
            other => panic!("expected a call, got {:?}", other),
        }
        assert_eq!(*rx.borrow(), CallState::Pending);
    }

    #[test]
    fn test_replay_supersedes_pending_call() {
        let mut table = Correlator::new();
        let (handle, rx) = table.register(true);
        let first = call_id(&table.issue(handle, "select".to_string(), json!("a")).unwrap());
        table.resolve(reply(&first, None));

        let in_flight = call_id(&table.issue(handle, "select".to_string(), json!("b")).unwrap());
        let replays = table.replay_resilient();
        assert_eq!(replays.len(), 1);
        match &replays[0] {
            Outbound::Call { params, .. } => assert_eq!(params, &json!("a")),
            other => panic!("expected a call, got {:?}", other),
        }

        assert!(!table.is_pending(&in_flight));
        assert_eq!(table.resolve(reply(&in_flight, None)), Resolution::Stale);
        assert_eq!(*rx.borrow(), CallState::Pending);
        assert_eq!(table.pending_len(), 1);
    }
}
