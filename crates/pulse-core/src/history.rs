//! Bounded per-kind event history used to replay recent events to new subscribers.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::types::Event;

/// Default number of events retained per kind.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Per-kind FIFO rings of recently dispatched events.
///
/// Keyed by `Event::kind`. Each ring holds at most `capacity` events; the
/// oldest is evicted first.
pub struct EventHistory {
    capacity: usize,
    rings: RwLock<HashMap<String, VecDeque<Arc<Event>>>>,
}

impl EventHistory {
    /// Create an empty history. A zero capacity disables retention.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            rings: RwLock::new(HashMap::new()),
        }
    }

    /// Configured per-kind capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append an event to the ring for its kind.
    pub fn record(&self, event: Arc<Event>) {
        if self.capacity == 0 {
            return;
        }
        let mut rings = self.rings.write();
        let ring = rings
            .entry(event.kind.clone())
            .or_insert_with(|| VecDeque::with_capacity(self.capacity.min(16)));
        while ring.len() >= self.capacity {
            let _ = ring.pop_front();
        }
        ring.push_back(event);
    }

    /// Copy of the ring for `kind`, oldest first.
    pub fn snapshot(&self, kind: &str) -> Vec<Arc<Event>> {
        self.rings
            .read()
            .get(kind)
            .map(|ring| ring.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// The newest `limit` events across `kinds`, oldest first.
    ///
    /// Rings are merged by the hub-assigned sequence so interleaving across
    /// kinds matches dispatch order.
    pub fn recent(&self, kinds: &[&str], limit: usize) -> Vec<Arc<Event>> {
        if limit == 0 || kinds.is_empty() {
            return Vec::new();
        }
        let mut merged: Vec<Arc<Event>> = {
            let rings = self.rings.read();
            kinds
                .iter()
                .filter_map(|k| rings.get(*k))
                .flat_map(|ring| ring.iter().cloned())
                .collect()
        };
        merged.sort_by_key(|e| (e.sequence().unwrap_or(0), e.timestamp));
        let skip = merged.len().saturating_sub(limit);
        merged.split_off(skip)
    }

    /// Number of events retained for `kind`.
    pub fn len(&self, kind: &str) -> usize {
        self.rings.read().get(kind).map_or(0, VecDeque::len)
    }

    /// Kinds with at least one retained event.
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.rings.read().keys().cloned().collect();
        kinds.sort();
        kinds
    }
}

impl Default for EventHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn event(kind: &str, seq: u64) -> Arc<Event> {
        let mut e = Event::new(kind, json!({ "n": seq }));
        e.id = Some(seq.to_string());
        Arc::new(e)
    }

    #[test]
    fn snapshot_of_unknown_kind_is_empty() {
        let history = EventHistory::default();
        assert!(history.snapshot("ticket-updated").is_empty());
        assert_eq!(history.len("ticket-updated"), 0);
    }

    #[test]
    fn evicts_oldest_first() {
        let history = EventHistory::new(3);
        for seq in 1..=5 {
            history.record(event("k", seq));
        }
        let seqs: Vec<u64> = history
            .snapshot("k")
            .iter()
            .filter_map(|e| e.sequence())
            .collect();
        assert_eq!(seqs, vec![3, 4, 5]);
    }

    #[test]
    fn rings_are_independent_per_kind() {
        let history = EventHistory::new(2);
        history.record(event("a", 1));
        history.record(event("a", 2));
        history.record(event("a", 3));
        history.record(event("b", 4));
        assert_eq!(history.len("a"), 2);
        assert_eq!(history.len("b"), 1);
        assert_eq!(history.kinds(), vec!["a", "b"]);
    }

    #[test]
    fn snapshot_is_a_copy() {
        let history = EventHistory::new(5);
        history.record(event("a", 1));
        let snapshot = history.snapshot("a");
        history.record(event("a", 2));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(history.len("a"), 2);
    }

    #[test]
    fn zero_capacity_retains_nothing() {
        let history = EventHistory::new(0);
        history.record(event("a", 1));
        assert_eq!(history.len("a"), 0);
    }

    #[test]
    fn recent_merges_kinds_in_dispatch_order() {
        let history = EventHistory::new(10);
        history.record(event("progress", 1));
        history.record(event("complete", 2));
        history.record(event("progress", 3));
        history.record(event("other", 4));

        let seqs: Vec<u64> = history
            .recent(&["progress", "complete"], 10)
            .iter()
            .filter_map(|e| e.sequence())
            .collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[test]
    fn recent_keeps_newest_within_limit() {
        let history = EventHistory::new(10);
        for seq in 1..=6 {
            history.record(event("a", seq));
        }
        let seqs: Vec<u64> = history
            .recent(&["a"], 2)
            .iter()
            .filter_map(|e| e.sequence())
            .collect();
        assert_eq!(seqs, vec![5, 6]);
        assert!(history.recent(&["a"], 0).is_empty());
        assert!(history.recent(&[], 5).is_empty());
    }

    proptest! {
        #[test]
        fn never_exceeds_capacity(capacity in 1usize..32, extra in 0usize..64) {
            let history = EventHistory::new(capacity);
            let total = capacity + extra;
            for seq in 0..total as u64 {
                history.record(event("k", seq));
            }
            let seqs: Vec<u64> = history.snapshot("k").iter().filter_map(|e| e.sequence()).collect();
            prop_assert_eq!(seqs.len(), capacity);
            let expected: Vec<u64> = (extra as u64..total as u64).collect();
            prop_assert_eq!(seqs, expected);
        }
    }
}
