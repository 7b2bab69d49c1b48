//! Outbound queue of serialised envelopes awaiting transmission.
//!
//! The main loop drains at most one entry per iteration. Drain order is a
//! policy: deployed devices send the newest entry first, which reorders
//! bursts, so oldest-first is available as well.

use std::collections::VecDeque;

use serde::Deserialize;
use tracing::warn;

use crate::envelope::Envelope;
use crate::error::Result;

/// Which end of the queue [`OutboundQueue::pop_next`] takes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrainOrder {
    /// Newest first.
    #[default]
    Lifo,
    /// Oldest first.
    Fifo,
}

/// Pending outbound messages, oldest at the front.
#[derive(Debug, Clone, Default)]
pub struct OutboundQueue {
    items: VecDeque<String>,
    order: DrainOrder,
    capacity: Option<usize>,
    dropped: u64,
}

impl OutboundQueue {
    /// Unbounded queue draining in `order`.
    #[must_use]
    pub fn new(order: DrainOrder) -> Self {
        Self {
            order,
            ..Self::default()
        }
    }

    /// Keep at most `capacity` entries; the oldest is dropped on overflow.
    #[must_use]
    pub fn with_capacity_limit(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity.max(1));
        self
    }

    /// The configured drain order.
    #[must_use]
    pub fn order(&self) -> DrainOrder {
        self.order
    }

    /// Append a serialised envelope.
    pub fn push(&mut self, item: String) {
        self.make_room();
        self.items.push_back(item);
    }

    /// Evict the oldest entries until one more fits.
    fn make_room(&mut self) {
        let Some(cap) = self.capacity else {
            return;
        };
        while self.items.len() >= cap {
            let Some(old) = self.items.pop_front() else {
                break;
            };
            self.dropped += 1;
            warn!(capacity = cap, dropped = %old, "outbound queue full, dropping oldest");
        }
    }

    /// Serialise and append an envelope.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Envelope`](crate::Error::Envelope) if serialisation fails.
    pub fn push_envelope(&mut self, envelope: &Envelope) -> Result<()> {
        self.push(envelope.to_json()?);
        Ok(())
    }

    /// Take the next entry to send according to the drain order.
    pub fn pop_next(&mut self) -> Option<String> {
        match self.order {
            DrainOrder::Lifo => self.items.pop_back(),
            DrainOrder::Fifo => self.items.pop_front(),
        }
    }

    /// Put back an entry whose send failed so it is drained next.
    ///
    /// The capacity limit still holds; an older entry makes way for it.
    pub fn restore(&mut self, item: String) {
        self.make_room();
        match self.order {
            DrainOrder::Lifo => self.items.push_back(item),
            DrainOrder::Fifo => self.items.push_front(item),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Entries dropped because of the capacity limit.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Iterate in insertion order, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(order: DrainOrder) -> OutboundQueue {
        let mut q = OutboundQueue::new(order);
        for item in ["a", "b", "c"] {
            q.push(item.to_string());
        }
        q
    }

    #[test]
    fn test_default_is_lifo() {
        assert_eq!(OutboundQueue::default().order(), DrainOrder::Lifo);
    }

    #[test]
    fn test_lifo_drain() {
        let mut q = filled(DrainOrder::Lifo);
        assert_eq!(q.pop_next().as_deref(), Some("c"));
        assert_eq!(q.pop_next().as_deref(), Some("b"));
        assert_eq!(q.pop_next().as_deref(), Some("a"));
        assert_eq!(q.pop_next(), None);
    }

    #[test]
    fn test_fifo_drain() {
        let mut q = filled(DrainOrder::Fifo);
        assert_eq!(q.pop_next().as_deref(), Some("a"));
        assert_eq!(q.pop_next().as_deref(), Some("b"));
        assert_eq!(q.pop_next().as_deref(), Some("c"));
        assert!(q.is_empty());
    }

    #[test]
    fn test_restore_is_drained_next() {
        for order in [DrainOrder::Lifo, DrainOrder::Fifo] {
            let mut q = filled(order);
            let first = q.pop_next().unwrap();
            q.restore(first.clone());
            assert_eq!(q.len(), 3);
            assert_eq!(q.pop_next(), Some(first));
        }
    }

    #[test]
    fn test_iter_is_insertion_order() {
        let q = filled(DrainOrder::Lifo);
        assert_eq!(q.iter().collect::<Vec<_>>(), ["a", "b", "c"]);
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let mut q = OutboundQueue::new(DrainOrder::Fifo).with_capacity_limit(2);
        for item in ["a", "b", "c"] {
            q.push(item.to_string());
        }
        assert_eq!(q.len(), 2);
        assert_eq!(q.dropped(), 1);
        assert_eq!(q.iter().collect::<Vec<_>>(), ["b", "c"]);
    }

    #[test]
    fn test_restore_respects_capacity() {
        let mut q = OutboundQueue::new(DrainOrder::Fifo).with_capacity_limit(2);
        q.push("a".into());
        q.push("b".into());
        let sent = q.pop_next().unwrap();
        q.push("c".into());
        q.restore(sent);
        assert_eq!(q.len(), 2);
        assert_eq!(q.dropped(), 1);
        assert_eq!(q.pop_next().as_deref(), Some("a"));
        assert_eq!(q.pop_next().as_deref(), Some("c"));

        let mut q = OutboundQueue::new(DrainOrder::Lifo).with_capacity_limit(2);
        q.push("a".into());
        q.push("b".into());
        let sent = q.pop_next().unwrap();
        q.push("c".into());
        q.restore(sent);
        assert_eq!(q.iter().collect::<Vec<_>>(), ["c", "b"]);
        assert_eq!(q.pop_next().as_deref(), Some("b"));
    }

    #[test]
    fn test_push_envelope() {
        let mut q = OutboundQueue::default();
        q.push_envelope(&Envelope::door_status(true)).unwrap();
        let raw = q.pop_next().unwrap();
        let parsed = Envelope::from_json(&raw).unwrap();
        assert_eq!(parsed.kind, "DoorStatus");
    }

    #[test]
    fn test_drain_order_from_config_value() {
        let order: DrainOrder = serde_json::from_str("\"fifo\"").unwrap();
        assert_eq!(order, DrainOrder::Fifo);
        let order: DrainOrder = serde_json::from_str("\"lifo\"").unwrap();
        assert_eq!(order, DrainOrder::Lifo);
    }
}
