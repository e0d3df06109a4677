//! Topic state store
//!
//! Holds the per-topic reference count, readiness flag and logical value.
//! Each topic's snapshot lives in a `watch` channel and is mutated in place,
//! so observers keep one receiver for the life of their subscription.

pub mod diff;
pub mod scroll;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;
use tracing::warn;

use crate::protocol::{Op, TopicEvent};
use diff::apply_op;
use scroll::ScrollBuffer;

/// What an observer sees for a topic
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TopicSnapshot {
    /// A `full` snapshot has been applied since the last open
    pub ready: bool,
    pub value: Value,
}

/// Outcome of routing one event into the store
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Routed {
    Applied,
    /// Buffered for a scroll flush; carries the topic's backlog length
    Buffered(usize),
    /// Nobody holds the topic
    Discarded,
    /// The path could not be applied; the value is unchanged
    Rejected,
}

struct TopicSlot {
    refs: u32,
    always_on: bool,
    state: watch::Sender<TopicSnapshot>,
    scroll: Option<ScrollBuffer>,
}

impl TopicSlot {
    fn new(always_on: bool) -> Self {
        let (state, _) = watch::channel(TopicSnapshot::default());
        Self {
            refs: 0,
            always_on,
            state,
            scroll: None,
        }
    }

    fn set_ready(&self, ready: bool) {
        self.state.send_if_modified(|snap| {
            let changed = snap.ready != ready;
            snap.ready = ready;
            changed
        });
    }
}

/// Table of all known topics
pub struct TopicStore {
    slots: BTreeMap<String, TopicSlot>,
}

impl TopicStore {
    /// Create a store with the given always-on topics pre-registered
    pub fn new<I, S>(always_on: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let slots = always_on
            .into_iter()
            .map(|name| (name.into(), TopicSlot::new(true)))
            .collect();
        Self { slots }
    }

    /// Number of topics currently held (always-on included)
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.slots.contains_key(topic)
    }

    pub fn is_always_on(&self, topic: &str) -> bool {
        self.slots.get(topic).is_some_and(|slot| slot.always_on)
    }

    /// Current reference count, 0 for unknown topics
    pub fn refs(&self, topic: &str) -> u32 {
        self.slots.get(topic).map_or(0, |slot| slot.refs)
    }

    /// True when any non-always-on topic is referenced
    pub fn has_interest(&self) -> bool {
        self.slots.values().any(|slot| !slot.always_on && slot.refs > 0)
    }

    /// Add a reference, creating the topic if needed.
    ///
    /// Returns the new count and a receiver for the topic's snapshot.
    pub fn retain(
        &mut self,
        topic: &str,
        max_len: Option<usize>,
    ) -> (u32, watch::Receiver<TopicSnapshot>) {
        let slot = self
            .slots
            .entry(topic.to_string())
            .or_insert_with(|| TopicSlot::new(false));
        slot.refs = slot.refs.saturating_add(1);
        if let (Some(max_len), None) = (max_len, slot.scroll.as_ref()) {
            slot.scroll = Some(ScrollBuffer::new(max_len));
        }
        (slot.refs, slot.state.subscribe())
    }

    /// Drop a reference. At zero the topic is deleted outright.
    ///
    /// Returns the count before decrementing (0 if the topic was unknown).
    /// Always-on topics are never released.
    pub fn release(&mut self, topic: &str) -> u32 {
        let Some(slot) = self.slots.get_mut(topic) else {
            return 0;
        };
        if slot.always_on || slot.refs == 0 {
            return slot.refs;
        }

        let before = slot.refs;
        slot.refs -= 1;
        if slot.refs == 0 {
            self.slots.remove(topic);
        }
        before
    }

    /// Receiver for a topic's snapshot, if the topic exists
    pub fn watch(&self, topic: &str) -> Option<watch::Receiver<TopicSnapshot>> {
        self.slots.get(topic).map(|slot| slot.state.subscribe())
    }

    /// Copy of a topic's current snapshot
    pub fn snapshot(&self, topic: &str) -> Option<TopicSnapshot> {
        self.slots.get(topic).map(|slot| slot.state.borrow().clone())
    }

    /// Referenced topics that need a wire subscribe, in name order
    pub fn subscribed_topics(&self) -> Vec<String> {
        self.slots
            .iter()
            .filter(|(_, slot)| !slot.always_on && slot.refs > 0)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Route one topic event: apply it, buffer it, or drop it
    pub fn apply(&mut self, event: TopicEvent) -> Routed {
        let TopicEvent {
            topic,
            op,
            path,
            value,
        } = event;
        let Some(slot) = self.slots.get_mut(&topic) else {
            return Routed::Discarded;
        };

        if let Some(buffer) = slot.scroll.as_mut() {
            return Routed::Buffered(buffer.push(op, value));
        }

        let mut routed = Routed::Applied;
        slot.state.send_if_modified(|snap| {
            if let Err(e) = apply_op(&mut snap.value, op, &path, value) {
                warn!(topic = %topic, error = %e, "skipping envelope");
                routed = Routed::Rejected;
                return false;
            }
            if op == Op::Full {
                snap.ready = true;
            }
            true
        });
        routed
    }

    /// True when any scroll topic has buffered events
    pub fn has_backlog(&self) -> bool {
        self.slots
            .values()
            .any(|slot| slot.scroll.as_ref().is_some_and(|b| !b.is_empty()))
    }

    /// Flush every scroll backlog. Returns the number of topics committed.
    pub fn flush_scroll(&mut self) -> usize {
        let mut committed = 0;
        for slot in self.slots.values_mut() {
            let Some(buffer) = slot.scroll.as_mut() else {
                continue;
            };
            let current = slot.state.borrow().value.clone();
            if let Some(flushed) = buffer.flush(&current) {
                slot.state.send_modify(|snap| {
                    snap.value = flushed.value;
                    if flushed.saw_full {
                        snap.ready = true;
                    }
                });
                committed += 1;
            }
        }
        committed
    }

    /// Connection dropped: nothing is ready any more, data is kept
    pub fn clear_readiness(&mut self) {
        for slot in self.slots.values() {
            slot.set_ready(false);
        }
    }

    /// Connection opened: always-on topics are pushed unconditionally
    pub fn mark_always_on_ready(&mut self) {
        for slot in self.slots.values().filter(|slot| slot.always_on) {
            slot.set_ready(true);
        }
    }

    /// Terminal close: wipe every value, readiness flag and backlog.
    /// Reference counts survive so outstanding guards stay balanced.
    pub fn clear_all(&mut self) {
        for slot in self.slots.values_mut() {
            if let Some(buffer) = slot.scroll.as_mut() {
                buffer.clear();
            }
            slot.state.send_replace(TopicSnapshot::default());
        }
    }
}
