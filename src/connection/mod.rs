//! Connection core
//!
//! `LinkCore` owns every piece of link state: the current socket, the
//! outbound queue, the topic store, the pending-call table and the reconnect
//! scheduler. It performs no I/O. Each operation mutates state and records
//! [`Effect`]s that the async [`Link`](crate::Link) executes after releasing
//! the lock.

pub mod driver;
pub mod reconnect;
pub mod url;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::config::LinkConfig;
use crate::protocol::{decode_frame, Frame, Inbound, Outbound, RpcReply, TopicEvent, PONG};
use crate::rpc::Correlator;
use crate::store::{Routed, TopicStore};
use crate::types::{
    CloseDisposition, ConnectionState, LinkError, LinkEvent, LinkResult, LinkStatus,
};
use reconnect::{Decision, ReconnectScheduler};

/// Everything a socket task needs to run one physical connection
#[derive(Debug)]
pub(crate) struct SocketPlan {
    pub id: u64,
    pub url: String,
    /// Text frames to write, in order. Dropping the sender closes the socket.
    pub outbound: mpsc::UnboundedReceiver<String>,
}

/// Work the core asks its driver to perform
#[derive(Debug)]
pub(crate) enum Effect {
    Open(SocketPlan),
    ArmReconnect { delay: Duration, token: u64 },
    ArmFlush(Duration),
    Emit(LinkEvent),
}

struct Socket {
    id: u64,
    open: bool,
    /// `None` once a graceful close was requested
    tx: Option<mpsc::UnboundedSender<String>>,
}

pub(crate) struct LinkCore {
    config: Arc<LinkConfig>,
    url: String,
    pub(crate) store: TopicStore,
    pub(crate) calls: Correlator,
    scheduler: ReconnectScheduler,
    socket: Option<Socket>,
    next_socket: u64,
    queue: VecDeque<String>,
    status: watch::Sender<LinkStatus>,
    halted: bool,
    visible: bool,
    flush_armed: bool,
    effects: Vec<Effect>,
}

impl LinkCore {
    pub fn new(config: Arc<LinkConfig>) -> LinkResult<Self> {
        let url = url::websocket_url(&config.origin, &config.path)?;
        let scheduler = ReconnectScheduler::new(
            config.reconnect_base,
            config.reconnect_cap,
            config.max_reconnect_attempts,
        );
        let (status, _) = watch::channel(LinkStatus::initial());

        Ok(Self {
            store: TopicStore::new(config.always_on.iter().cloned()),
            calls: Correlator::new(),
            scheduler,
            socket: None,
            next_socket: 0,
            queue: VecDeque::new(),
            status,
            halted: false,
            visible: true,
            flush_armed: false,
            effects: Vec::new(),
            url,
            config,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn status(&self) -> LinkStatus {
        self.status.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<LinkStatus> {
        self.status.subscribe()
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Messages waiting for the socket to open
    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    /// True while a socket is open and accepting writes
    pub fn is_open(&self) -> bool {
        self.socket
            .as_ref()
            .is_some_and(|socket| socket.open && socket.tx.is_some())
    }

    /// Drain the effects recorded since the last call
    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    /// Open a socket unless one already exists or the link is halted
    pub fn connect(&mut self) {
        if self.halted {
            debug!("link halted, not connecting");
            return;
        }
        if self.socket.is_some() {
            return;
        }

        self.next_socket += 1;
        let id = self.next_socket;
        let (tx, outbound) = mpsc::unbounded_channel();
        self.socket = Some(Socket {
            id,
            open: false,
            tx: Some(tx),
        });

        let state = if self.scheduler.attempt() > 0 {
            ConnectionState::Reconnecting
        } else {
            ConnectionState::Connecting
        };
        self.set_state(state);
        info!(url = %self.url, socket = id, attempt = self.scheduler.attempt(), "opening socket");

        self.effects.push(Effect::Open(SocketPlan {
            id,
            url: self.url.clone(),
            outbound,
        }));
    }

    /// Transmit now if open, otherwise queue and connect
    pub fn send(&mut self, outbound: Outbound) {
        let text = outbound.encode();
        if let Err(text) = self.try_transmit(text) {
            self.queue.push_back(text);
            self.connect();
        }
    }

    /// Transmit only if open; returns false when nothing was written
    pub fn transmit(&mut self, outbound: &Outbound) -> bool {
        self.try_transmit(outbound.encode()).is_ok()
    }

    fn try_transmit(&self, text: String) -> Result<(), String> {
        match self.socket.as_ref() {
            Some(Socket {
                open: true,
                tx: Some(tx),
                ..
            }) => tx.send(text).map_err(|e| e.0),
            _ => Err(text),
        }
    }

    fn is_current(&self, socket_id: u64) -> bool {
        self.socket.as_ref().is_some_and(|socket| socket.id == socket_id)
    }

    pub fn handle_open(&mut self, socket_id: u64) {
        let Some(socket) = self.socket.as_mut().filter(|s| s.id == socket_id) else {
            debug!(socket = socket_id, "ignoring open from stale socket");
            return;
        };
        if socket.tx.is_none() {
            debug!(socket = socket_id, "socket opened after close was requested");
            return;
        }
        socket.open = true;

        self.scheduler.reset();
        let mut generation = 0;
        self.status.send_modify(|status| {
            status.state = ConnectionState::Open;
            status.generation += 1;
            status.attempt = 0;
            status.changed_at = chrono::Utc::now().timestamp_millis();
            generation = status.generation;
        });
        info!(socket = socket_id, generation, "connection open");
        self.effects.push(Effect::Emit(LinkEvent::Connected { generation }));

        while let Some(text) = self.queue.pop_front() {
            if let Err(text) = self.try_transmit(text) {
                self.queue.push_front(text);
                break;
            }
        }

        self.store.mark_always_on_ready();
        for topic in self.store.subscribed_topics() {
            self.transmit(&Outbound::Subscribe { topic });
        }
        for call in self.calls.replay_resilient() {
            self.send(call);
        }
    }

    pub fn handle_frame(&mut self, socket_id: u64, text: &str) {
        if !self.is_current(socket_id) {
            return;
        }

        match decode_frame(text) {
            Ok(Frame::Heartbeat) => {
                if self.try_transmit(PONG.to_string()).is_err() {
                    debug!("heartbeat arrived while the socket is not writable");
                }
            }
            Ok(Frame::Envelopes(items)) => self.route(items),
            Err(e) => warn!(socket = socket_id, error = %e, "dropping malformed frame"),
        }
    }

    /// Apply topic groups in first-appearance order, then resolve replies
    fn route(&mut self, items: Vec<Inbound>) {
        let mut groups: Vec<(String, Vec<TopicEvent>)> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut replies: Vec<RpcReply> = Vec::new();

        for item in items {
            match item {
                Inbound::Topic(event) => match index.get(&event.topic) {
                    Some(&slot) => groups[slot].1.push(event),
                    None => {
                        index.insert(event.topic.clone(), groups.len());
                        groups.push((event.topic.clone(), vec![event]));
                    }
                },
                Inbound::Rpc(reply) => replies.push(reply),
            }
        }

        let limit = self.config.scroll_backlog_limit;
        let mut flush_now = false;
        let mut buffered = false;
        for (topic, events) in groups {
            for event in events {
                match self.store.apply(event) {
                    Routed::Applied => debug!(topic = %topic, "applied topic event"),
                    Routed::Buffered(len) if len > limit => flush_now = true,
                    Routed::Buffered(_) => buffered = true,
                    Routed::Discarded => debug!(topic = %topic, "no subscriber, event discarded"),
                    Routed::Rejected => {}
                }
            }
        }

        if flush_now {
            let committed = self.store.flush_scroll();
            debug!(committed, "scroll backlog over limit, flushed immediately");
        } else if buffered {
            self.arm_flush();
        }

        for reply in replies {
            self.calls.resolve(reply);
        }
    }

    fn arm_flush(&mut self) {
        if self.flush_armed {
            return;
        }
        self.flush_armed = true;
        let delay = if self.visible {
            self.config.frame_interval
        } else {
            self.config.hidden_flush_interval
        };
        self.effects.push(Effect::ArmFlush(delay));
    }

    /// The armed flush timer elapsed
    pub fn flush_due(&mut self) {
        self.flush_armed = false;
        let committed = self.store.flush_scroll();
        if committed > 0 {
            debug!(committed, "flushed scroll topics");
        }
    }

    pub fn handle_close(&mut self, socket_id: u64, code: u16) {
        if !self.is_current(socket_id) {
            debug!(socket = socket_id, code, "ignoring close from stale socket");
            return;
        }
        self.socket = None;
        self.set_state(ConnectionState::Closed);
        info!(socket = socket_id, code, "connection closed");
        self.effects.push(Effect::Emit(LinkEvent::Disconnected { code }));

        let disposition = CloseDisposition::classify(
            code,
            self.config.auth_close_code,
            self.config.fatal_close_threshold,
        );
        match disposition {
            CloseDisposition::Login => {
                warn!(code, "authentication rejected, halting link");
                self.terminate(LinkEvent::LoginRequired);
            }
            CloseDisposition::Fatal => {
                warn!(code, "unrecoverable close, halting link");
                self.terminate(LinkEvent::Invalidated);
            }
            CloseDisposition::Retry => {
                self.store.clear_readiness();
                if !self.halted {
                    self.schedule_reconnect();
                }
            }
        }
    }

    fn terminate(&mut self, signal: LinkEvent) {
        self.store.clear_all();
        self.halted = true;
        self.scheduler.reset();
        self.sync_attempt();
        self.effects.push(Effect::Emit(signal));
    }

    fn schedule_reconnect(&mut self) {
        match self.scheduler.schedule() {
            Decision::Arm { delay, token } => {
                info!(
                    attempt = self.scheduler.attempt(),
                    delay_ms = delay.as_millis() as u64,
                    "scheduling reconnect"
                );
                self.sync_attempt();
                self.effects.push(Effect::ArmReconnect { delay, token });
            }
            Decision::GiveUp => {
                warn!(
                    attempts = self.scheduler.attempt(),
                    "reconnect attempts exhausted, invalidating"
                );
                self.effects.push(Effect::Emit(LinkEvent::Invalidated));
            }
            Decision::AlreadyScheduled | Decision::Spent => {}
        }
    }

    /// A reconnect timer elapsed
    pub fn reconnect_due(&mut self, token: u64) {
        if self.scheduler.fire(token) {
            self.connect();
        }
    }

    pub fn on_transport_error(&mut self, socket_id: u64, error: LinkError) {
        if !self.is_current(socket_id) {
            return;
        }
        warn!(socket = socket_id, error = %error, "transport error");
        let message = error.to_string();
        self.effects.push(Effect::Emit(LinkEvent::TransportError { message }));
    }

    /// Switch the scroll flush cadence
    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    /// Lift a terminal halt and reconnect if anything is waiting
    pub fn resume(&mut self) {
        if !self.halted {
            return;
        }
        self.halted = false;
        self.scheduler.reset();
        self.sync_attempt();
        info!("link resumed");
        if self.store.has_interest() || !self.queue.is_empty() {
            self.connect();
        }
    }

    /// Halt and close gracefully. Returns true if a socket is still closing.
    pub fn shutdown(&mut self) -> bool {
        self.halted = true;
        self.scheduler.reset();
        self.sync_attempt();
        match self.socket.as_mut() {
            Some(socket) => {
                socket.tx = None;
                true
            }
            None => false,
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        let attempt = self.scheduler.attempt();
        self.status.send_modify(|status| {
            status.state = state;
            status.attempt = attempt;
            status.changed_at = chrono::Utc::now().timestamp_millis();
        });
    }

    fn sync_attempt(&mut self) {
        let attempt = self.scheduler.attempt();
        self.status.send_if_modified(|status| {
            let changed = status.attempt != attempt;
            status.attempt = attempt;
            changed
        });
    }
}
