//! Subscription registry
//!
//! Reference-counted topic interest. The first reference sends a wire
//! subscribe (or leaves it to the open sweep when the socket is down); the
//! last release sends the wire unsubscribe and deletes the topic's data.

use serde_json::Value;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::debug;

use crate::connection::LinkCore;
use crate::link::Link;
use crate::protocol::Outbound;
use crate::store::TopicSnapshot;
use crate::types::{LinkError, LinkResult};

impl LinkCore {
    /// Add a reference to `topic`; `max_len` makes it a scroll topic
    pub(crate) fn subscribe(
        &mut self,
        topic: &str,
        max_len: Option<usize>,
    ) -> watch::Receiver<TopicSnapshot> {
        let (refs, rx) = self.store.retain(topic, max_len);
        debug!(topic, refs, "subscribe");
        self.connect();

        if refs == 1 && self.is_open() && !self.store.is_always_on(topic) {
            self.transmit(&Outbound::Subscribe {
                topic: topic.to_string(),
            });
        }
        rx
    }

    /// Drop a reference. `force` sends the wire unsubscribe even when other
    /// references remain.
    pub(crate) fn unsubscribe(&mut self, topic: &str, force: bool) {
        if self.store.is_always_on(topic) || self.store.refs(topic) == 0 {
            return;
        }

        let before = self.store.release(topic);
        debug!(topic, refs = before - 1, force, "unsubscribe");
        if before == 1 || force {
            self.send(Outbound::Unsubscribe {
                topic: topic.to_string(),
            });
        }
    }
}

/// Guard for one reference to a topic.
///
/// Dropping the guard releases the reference.
pub struct Subscription {
    link: Link,
    topic: String,
    rx: watch::Receiver<TopicSnapshot>,
    released: bool,
}

impl Subscription {
    pub(crate) fn new(link: Link, topic: String, max_len: Option<usize>) -> Self {
        let rx = link.with_core(|core| core.subscribe(&topic, max_len));
        Self {
            link,
            topic,
            rx,
            released: false,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn snapshot(&self) -> TopicSnapshot {
        self.rx.borrow().clone()
    }

    pub fn value(&self) -> Value {
        self.rx.borrow().value.clone()
    }

    pub fn is_ready(&self) -> bool {
        self.rx.borrow().ready
    }

    /// Wait for the next change and return the new snapshot
    pub async fn changed(&mut self) -> LinkResult<TopicSnapshot> {
        self.rx.changed().await.map_err(|_| LinkError::Halted)?;
        Ok(self.rx.borrow_and_update().clone())
    }

    /// Wait until a `full` snapshot has been applied
    pub async fn ready(&mut self) -> LinkResult<TopicSnapshot> {
        let snap = self
            .rx
            .wait_for(|snap| snap.ready)
            .await
            .map_err(|_| LinkError::Halted)?;
        Ok(snap.clone())
    }

    /// Stream of snapshots, starting with the current one
    pub fn updates(&self) -> WatchStream<TopicSnapshot> {
        WatchStream::new(self.rx.clone())
    }

    pub fn receiver(&self) -> watch::Receiver<TopicSnapshot> {
        self.rx.clone()
    }

    /// Release now instead of on drop
    pub fn unsubscribe(mut self, force: bool) {
        self.release(force);
    }

    fn release(&mut self, force: bool) {
        if self.released {
            return;
        }
        self.released = true;
        let topic = &self.topic;
        self.link.with_core(|core| core.unsubscribe(topic, force));
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release(false);
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("ready", &self.rx.borrow().ready)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LinkConfig;
    use crate::connection::tests::{new_core, new_core_with, open_socket, written};
    use serde_json::json;

    #[test]
    fn test_first_reference_subscribes_on_wire() {
        let mut core = new_core();
        let mut plan = open_socket(&mut core);

        let _a = core.subscribe("jobs", None);
        let _b = core.subscribe("jobs", None);
        assert_eq!(written(&mut plan), vec![json!({"t": "jobs"})]);
        assert_eq!(core.store.refs("jobs"), 2);
    }

    #[test]
    fn test_closed_socket_defers_to_open_sweep() {
        let mut core = new_core();
        let _a = core.subscribe("b", None);
        let _b = core.subscribe("a", None);
        let mut plan = open_socket(&mut core);
        assert_eq!(written(&mut plan), vec![json!({"t": "a"}), json!({"t": "b"})]);
    }

    #[test]
    fn test_unsubscribe_once_per_last_release() {
        let mut core = new_core();
        let mut plan = open_socket(&mut core);
        core.subscribe("jobs", None);
        core.subscribe("jobs", None);
        written(&mut plan);

        core.unsubscribe("jobs", false);
        assert!(written(&mut plan).is_empty());
        core.unsubscribe("jobs", false);
        assert_eq!(written(&mut plan), vec![json!({"t": "jobs", "o": "unsub"})]);

        // Extra releases never go negative or resend
        core.unsubscribe("jobs", false);
        assert!(written(&mut plan).is_empty());
        assert_eq!(core.store.refs("jobs"), 0);
        assert!(!core.store.contains("jobs"));
    }

    #[test]
    fn test_force_unsubscribe_keeps_other_refs() {
        let mut core = new_core();
        let mut plan = open_socket(&mut core);
        core.subscribe("jobs", None);
        core.subscribe("jobs", None);
        written(&mut plan);

        core.unsubscribe("jobs", true);
        assert_eq!(written(&mut plan), vec![json!({"t": "jobs", "o": "unsub"})]);
        assert_eq!(core.store.refs("jobs"), 1);
    }

    #[test]
    fn test_always_on_topics_never_hit_the_wire() {
        let config = LinkConfig::new("http://localhost:9000").with_always_on(["status"]);
        let mut core = new_core_with(config);
        let rx = core.subscribe("status", None);
        let mut plan = open_socket(&mut core);
        assert!(rx.borrow().ready);

        core.subscribe("status", None);
        core.unsubscribe("status", true);
        assert!(written(&mut plan).is_empty());
        assert!(core.store.contains("status"));
    }
}
