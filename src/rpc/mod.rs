//! Request/response calls over the shared socket
//!
//! This module contains the correlation table and the caller-facing handle.

mod correlator;
mod handle;

pub use correlator::{CallState, Correlator, Resolution};
pub use handle::RpcHandle;

use serde_json::Value;
use tokio::sync::watch;

use crate::connection::LinkCore;

impl LinkCore {
    pub(crate) fn register_call(&mut self, resilient: bool) -> (u64, watch::Receiver<CallState>) {
        self.calls.register(resilient)
    }

    pub(crate) fn issue_call(&mut self, handle: u64, method: String, params: Value) {
        if let Some(call) = self.calls.issue(handle, method, params) {
            self.send(call);
        }
    }

    /// Reissue the last request; false if the handle never called
    pub(crate) fn retry_call(&mut self, handle: u64) -> bool {
        match self.calls.retry(handle) {
            Some(call) => {
                self.send(call);
                true
            }
            None => false,
        }
    }

    pub(crate) fn reset_call(&mut self, handle: u64) {
        self.calls.reset(handle);
    }

    pub(crate) fn release_call(&mut self, handle: u64) {
        self.calls.release(handle);
    }
}
