//! Caller-facing call handle

use serde_json::Value;
use tokio::sync::watch;

use super::CallState;
use crate::link::Link;

/// One UI element's view of a remote call.
///
/// The handle can issue calls repeatedly; each new call supersedes the
/// previous one. Dropping the handle unregisters whatever is still pending.
///
/// A resilient handle reissues its last successful request on every
/// reconnect. That replay also counts as a new call: if a different request
/// was still pending when the socket reopened, it is superseded and its reply
/// is dropped. Call [`RpcHandle::retry`] or issue it again if it still
/// matters.
pub struct RpcHandle {
    link: Link,
    id: u64,
    state: watch::Receiver<CallState>,
}

impl RpcHandle {
    pub(crate) fn new(link: Link, resilient: bool) -> Self {
        let (id, state) = link.with_core(|core| core.register_call(resilient));
        Self { link, id, state }
    }

    /// Issue a call with a fresh correlation id
    pub fn call(&self, method: impl Into<String>, params: Value) {
        let method = method.into();
        self.link
            .with_core(|core| core.issue_call(self.id, method, params));
    }

    /// Reissue the last call. Returns false if nothing was ever called.
    pub fn retry(&self) -> bool {
        self.link.with_core(|core| core.retry_call(self.id))
    }

    /// Forget the pending call and return to `Idle`
    pub fn reset(&self) {
        self.link.with_core(|core| core.reset_call(self.id));
    }

    pub fn state(&self) -> CallState {
        self.state.borrow().clone()
    }

    pub fn is_pending(&self) -> bool {
        matches!(*self.state.borrow(), CallState::Pending)
    }

    /// Receiver for state changes
    pub fn watch(&self) -> watch::Receiver<CallState> {
        self.state.clone()
    }

    /// Wait until the current call settles.
    ///
    /// Returns `None` if the handle is idle (never called, or reset while
    /// waiting) or the link is gone.
    pub async fn outcome(&mut self) -> Option<Result<(), Value>> {
        let settled = self
            .state
            .wait_for(|state| !matches!(state, CallState::Pending))
            .await
            .ok()?;
        match &*settled {
            CallState::Success => Some(Ok(())),
            CallState::Error(error) => Some(Err(error.clone())),
            CallState::Idle | CallState::Pending => None,
        }
    }
}

impl Drop for RpcHandle {
    fn drop(&mut self) {
        let id = self.id;
        self.link.with_core(|core| core.release_call(id));
    }
}

impl std::fmt::Debug for RpcHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcHandle")
            .field("id", &self.id)
            .field("state", &*self.state.borrow())
            .finish()
    }
}
