//! Public link handle
//!
//! `Link` wraps the I/O-free [`LinkCore`] in a mutex and executes the effects
//! it records: socket tasks, reconnect and flush timers, and lifecycle
//! broadcasts. Every entry point locks, mutates, unlocks, then runs effects,
//! so consumer callbacks never observe a half-updated table.
//!
//! Timers and socket tasks hold a weak reference; dropping the last `Link`
//! clone closes the socket and lets pending timers lapse.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

use crate::config::LinkConfig;
use crate::connection::driver::{self, SocketHandler};
use crate::connection::{Effect, LinkCore};
use crate::rpc::RpcHandle;
use crate::store::TopicSnapshot;
use crate::subscription::Subscription;
use crate::types::{ConnectionState, LinkError, LinkEvent, LinkResult, LinkStatus};

/// Capacity of the lifecycle broadcast channel
const EVENT_CAPACITY: usize = 64;

struct Shared {
    core: Mutex<LinkCore>,
    events: broadcast::Sender<LinkEvent>,
    status: watch::Receiver<LinkStatus>,
    config: Arc<LinkConfig>,
}

/// Handle to one multiplexed connection. Cheap to clone.
///
/// Must be used from within a tokio runtime; effects that need a runtime are
/// dropped with a warning otherwise.
#[derive(Clone)]
pub struct Link {
    shared: Arc<Shared>,
}

impl Link {
    /// Build a link. No socket is opened until the first subscribe or send.
    pub fn new(config: LinkConfig) -> LinkResult<Self> {
        let config = Arc::new(config);
        let core = LinkCore::new(Arc::clone(&config))?;
        let status = core.watch_status();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            shared: Arc::new(Shared {
                core: Mutex::new(core),
                events,
                status,
                config,
            }),
        })
    }

    pub fn config(&self) -> &LinkConfig {
        &self.shared.config
    }

    /// WebSocket URL derived from the configured origin
    pub fn url(&self) -> String {
        self.shared.core.lock().url().to_string()
    }

    pub fn status(&self) -> LinkStatus {
        self.shared.core.lock().status()
    }

    pub fn watch_status(&self) -> watch::Receiver<LinkStatus> {
        self.shared.status.clone()
    }

    /// True after a terminal close or a shutdown, until [`Link::resume`]
    pub fn is_halted(&self) -> bool {
        self.shared.core.lock().is_halted()
    }

    /// Outbound messages waiting for the socket to open
    pub fn queued(&self) -> usize {
        self.shared.core.lock().queued_len()
    }

    /// Subscribe to lifecycle signals
    pub fn events(&self) -> broadcast::Receiver<LinkEvent> {
        self.shared.events.subscribe()
    }

    /// Open the socket if it is not already open or opening
    pub fn connect(&self) {
        self.with_core(LinkCore::connect);
    }

    /// Take a reference to a topic
    pub fn subscribe(&self, topic: impl Into<String>) -> Subscription {
        Subscription::new(self.clone(), topic.into(), None)
    }

    /// Take a reference to a scroll topic keeping at most `max_len` entries
    pub fn subscribe_scroll(&self, topic: impl Into<String>, max_len: usize) -> Subscription {
        Subscription::new(self.clone(), topic.into(), Some(max_len.max(1)))
    }

    /// Current snapshot of a topic, if anyone holds it
    pub fn snapshot(&self, topic: &str) -> Option<TopicSnapshot> {
        self.shared.core.lock().store.snapshot(topic)
    }

    /// New idle call handle
    pub fn rpc(&self) -> RpcHandle {
        RpcHandle::new(self.clone(), false)
    }

    /// New idle handle that replays its last success after every reconnect
    pub fn resilient_rpc(&self) -> RpcHandle {
        RpcHandle::new(self.clone(), true)
    }

    /// Issue a call on a fresh handle
    pub fn call(&self, method: impl Into<String>, params: Value) -> RpcHandle {
        let handle = self.rpc();
        handle.call(method, params);
        handle
    }

    /// Issue a call on a fresh resilient handle
    pub fn resilient_call(&self, method: impl Into<String>, params: Value) -> RpcHandle {
        let handle = self.resilient_rpc();
        handle.call(method, params);
        handle
    }

    /// Host visibility changed; hidden UIs flush scroll topics less often
    pub fn set_visible(&self, visible: bool) {
        self.with_core(|core| core.set_visible(visible));
    }

    /// Lift the halt left by a terminal close or a shutdown
    pub fn resume(&self) {
        self.with_core(LinkCore::resume);
    }

    /// Close the socket with code 1000 and halt.
    ///
    /// Resolves once the socket has reported its close.
    pub async fn shutdown(&self) {
        let closing = self.with_core(LinkCore::shutdown);
        if !closing {
            return;
        }
        let mut status = self.watch_status();
        if status
            .wait_for(|s| s.state == ConnectionState::Closed)
            .await
            .is_err()
        {
            debug!("status channel closed during shutdown");
        }
    }

    /// Run `f` under the lock, then execute the effects it recorded
    pub(crate) fn with_core<R>(&self, f: impl FnOnce(&mut LinkCore) -> R) -> R {
        let (result, effects) = {
            let mut core = self.shared.core.lock();
            let result = f(&mut core);
            (result, core.take_effects())
        };
        self.run(effects);
        result
    }

    fn run(&self, effects: Vec<Effect>) {
        if effects.is_empty() {
            return;
        }
        let runtime = Handle::try_current();

        for effect in effects {
            if let Effect::Emit(event) = effect {
                // No receivers is fine
                let _ = self.shared.events.send(event);
                continue;
            }

            let Ok(runtime) = runtime.as_ref() else {
                warn!(?effect, "no tokio runtime, dropping effect");
                continue;
            };
            let weak = Arc::downgrade(&self.shared);
            match effect {
                Effect::Open(plan) => {
                    runtime.spawn(driver::run_socket(plan, Callbacks(weak)));
                }
                Effect::ArmReconnect { delay, token } => {
                    runtime.spawn(async move {
                        tokio::time::sleep(delay).await;
                        if let Some(link) = upgrade(&weak) {
                            link.with_core(|core| core.reconnect_due(token));
                        }
                    });
                }
                Effect::ArmFlush(delay) => {
                    runtime.spawn(async move {
                        tokio::time::sleep(delay).await;
                        if let Some(link) = upgrade(&weak) {
                            link.with_core(LinkCore::flush_due);
                        }
                    });
                }
                Effect::Emit(_) => {}
            }
        }
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("origin", &self.shared.config.origin)
            .field("status", &*self.shared.status.borrow())
            .finish()
    }
}

fn upgrade(weak: &Weak<Shared>) -> Option<Link> {
    weak.upgrade().map(|shared| Link { shared })
}

/// Socket events routed back into the core
struct Callbacks(Weak<Shared>);

impl Callbacks {
    fn with_core(&self, f: impl FnOnce(&mut LinkCore)) {
        if let Some(link) = upgrade(&self.0) {
            link.with_core(f);
        }
    }
}

impl SocketHandler for Callbacks {
    fn on_open(&self, socket: u64) {
        self.with_core(|core| core.handle_open(socket));
    }

    fn on_frame(&self, socket: u64, text: &str) {
        self.with_core(|core| core.handle_frame(socket, text));
    }

    fn on_error(&self, socket: u64, error: LinkError) {
        self.with_core(|core| core.on_transport_error(socket, error));
    }

    fn on_close(&self, socket: u64, code: u16) {
        self.with_core(|core| core.handle_close(socket, code));
    }
}
