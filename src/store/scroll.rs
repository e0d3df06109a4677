//! Scroll buffer for high-frequency topics
//!
//! Events for a scroll topic are buffered and applied in one pass per flush,
//! against a copy of the retained array, which is then capped to the most
//! recent `max_len` entries.

use serde_json::Value;
use tracing::debug;

use crate::protocol::Op;

/// Backlog of pending events for one scroll topic
#[derive(Debug)]
pub struct ScrollBuffer {
    /// Maximum retained entries
    max_len: usize,

    /// Events waiting for the next flush
    backlog: Vec<(Op, Value)>,
}

/// Result of draining a backlog
#[derive(Debug, PartialEq)]
pub struct Flushed {
    pub value: Value,

    /// A `full` was part of the batch, so the topic now holds a snapshot
    pub saw_full: bool,
}

impl ScrollBuffer {
    /// Create a buffer retaining at most `max_len` entries (at least one)
    pub fn new(max_len: usize) -> Self {
        Self {
            max_len: max_len.max(1),
            backlog: Vec::new(),
        }
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Number of buffered events
    pub fn len(&self) -> usize {
        self.backlog.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backlog.is_empty()
    }

    /// Buffer an event and return the new backlog length
    pub fn push(&mut self, op: Op, value: Value) -> usize {
        self.backlog.push((op, value));
        self.backlog.len()
    }

    /// Drop buffered events without applying them
    pub fn clear(&mut self) {
        self.backlog.clear();
    }

    /// Apply the backlog to a copy of `current`.
    ///
    /// Returns `None` when there is nothing to flush.
    pub fn flush(&mut self, current: &Value) -> Option<Flushed> {
        if self.backlog.is_empty() {
            return None;
        }

        let mut rows = match current {
            Value::Array(items) => items.clone(),
            _ => Vec::new(),
        };
        let mut saw_full = false;

        for (op, value) in self.backlog.drain(..) {
            match op {
                Op::Full => {
                    saw_full = true;
                    rows = match value {
                        Value::Array(items) => items,
                        _ => Vec::new(),
                    };
                }
                Op::Add => rows.push(value),
                other => debug!(op = ?other, "ignoring op on scroll topic"),
            }
        }

        if rows.len() > self.max_len {
            let excess = rows.len() - self.max_len;
            rows.drain(..excess);
        }

        Some(Flushed {
            value: Value::Array(rows),
            saw_full,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flush_caps_oldest_first() {
        let mut buf = ScrollBuffer::new(3);
        for i in 1..=5 {
            buf.push(Op::Add, json!(i));
        }

        let flushed = buf.flush(&Value::Null).unwrap();
        assert_eq!(flushed.value, json!([3, 4, 5]));
        assert!(!flushed.saw_full);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_full_resets_then_appends() {
        let mut buf = ScrollBuffer::new(10);
        buf.push(Op::Add, json!("dropped"));
        buf.push(Op::Full, json!(["a", "b"]));
        buf.push(Op::Add, json!("c"));

        let flushed = buf.flush(&json!(["old"])).unwrap();
        assert_eq!(flushed.value, json!(["a", "b", "c"]));
        assert!(flushed.saw_full);
    }

    #[test]
    fn test_appends_to_existing_rows() {
        let mut buf = ScrollBuffer::new(4);
        buf.push(Op::Add, json!(3));
        buf.push(Op::Set, json!("ignored"));
        buf.push(Op::Add, json!(4));
        buf.push(Op::Add, json!(5));

        let flushed = buf.flush(&json!([1, 2])).unwrap();
        assert_eq!(flushed.value, json!([2, 3, 4, 5]));
    }

    #[test]
    fn test_empty_backlog_does_not_flush() {
        let mut buf = ScrollBuffer::new(2);
        assert!(buf.flush(&json!([1])).is_none());
    }
}
