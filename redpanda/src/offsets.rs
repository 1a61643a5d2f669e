//! Offset commit tracking for out-of-order acknowledgements.
//!
//! Deliveries from one partition are processed on several lanes, so they are
//! acknowledged out of offset order. Kafka commits a single position per
//! partition ("everything before this offset is done"), so the position may
//! only advance past an offset once every lower offset has been acknowledged.

use std::collections::{BTreeSet, HashMap};

/// Commit state of a single partition.
#[derive(Debug, Default, Clone)]
pub struct PartitionOffsets {
    pending: BTreeSet<i64>,
    highest_seen: Option<i64>,
    committed: Option<i64>,
}

impl PartitionOffsets {
    /// Record that `offset` has been handed to the consumer.
    pub fn track(&mut self, offset: i64) {
        self.pending.insert(offset);
        self.highest_seen = Some(self.highest_seen.map_or(offset, |highest| highest.max(offset)));
    }

    /// Record that `offset` is fully processed.
    ///
    /// Returns the new commit position (the next offset to consume) when it
    /// advanced, `None` otherwise.
    pub fn ack(&mut self, offset: i64) -> Option<i64> {
        if !self.pending.remove(&offset) {
            return None;
        }

        let position = match self.pending.first() {
            Some(&lowest) => lowest,
            None => self.highest_seen? + 1,
        };

        if self.committed.is_some_and(|committed| committed >= position) {
            return None;
        }
        self.committed = Some(position);
        Some(position)
    }

    /// Offsets handed out but not yet acknowledged.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Last commit position returned by [`PartitionOffsets::ack`].
    #[must_use]
    pub const fn committed(&self) -> Option<i64> {
        self.committed
    }
}

/// Commit state of every partition a subscription reads.
#[derive(Debug, Default)]
pub struct CommitTracker {
    partitions: HashMap<(String, i32), PartitionOffsets>,
}

impl CommitTracker {
    /// Empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a delivered record.
    pub fn track(&mut self, topic: &str, partition: i32, offset: i64) {
        self.partitions
            .entry((topic.to_string(), partition))
            .or_default()
            .track(offset);
    }

    /// Record a processed record; see [`PartitionOffsets::ack`].
    pub fn ack(&mut self, topic: &str, partition: i32, offset: i64) -> Option<i64> {
        self.partitions
            .get_mut(&(topic.to_string(), partition))?
            .ack(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn in_order_acks_advance_one_by_one() {
        let mut offsets = PartitionOffsets::default();
        offsets.track(10);
        offsets.track(11);

        assert_eq!(offsets.ack(10), Some(11));
        assert_eq!(offsets.ack(11), Some(12));
        assert_eq!(offsets.pending(), 0);
    }

    #[test]
    fn gap_holds_the_position_back() {
        let mut offsets = PartitionOffsets::default();
        for offset in 0..3 {
            offsets.track(offset);
        }

        assert_eq!(offsets.ack(2), None);
        assert_eq!(offsets.ack(1), None);
        assert_eq!(offsets.ack(0), Some(3));
        assert_eq!(offsets.committed(), Some(3));
    }

    #[test]
    fn unknown_and_repeated_acks_are_ignored() {
        let mut offsets = PartitionOffsets::default();
        offsets.track(5);

        assert_eq!(offsets.ack(4), None);
        assert_eq!(offsets.ack(5), Some(6));
        assert_eq!(offsets.ack(5), None);
    }

    #[test]
    fn partitions_are_independent() {
        let mut tracker = CommitTracker::new();
        tracker.track("t", 0, 0);
        tracker.track("t", 1, 0);
        tracker.track("t", 0, 1);

        assert_eq!(tracker.ack("t", 0, 1), None);
        assert_eq!(tracker.ack("t", 1, 0), Some(1));
        assert_eq!(tracker.ack("t", 0, 0), Some(2));
        assert_eq!(tracker.ack("other", 0, 0), None);
    }

    proptest! {
        #[test]
        fn position_never_passes_an_unacked_offset(
            order in Just((0..20i64).collect::<Vec<_>>()).prop_shuffle()
        ) {
            let mut offsets = PartitionOffsets::default();
            for offset in 0..20 {
                offsets.track(offset);
            }

            let mut acked = BTreeSet::new();
            let mut last = None;
            for offset in order {
                acked.insert(offset);
                if let Some(position) = offsets.ack(offset) {
                    prop_assert!((0..position).all(|o| acked.contains(&o)));
                    prop_assert!(last.is_none_or(|l| l < position));
                    last = Some(position);
                }
            }
            prop_assert_eq!(offsets.committed(), Some(20));
        }
    }
}
