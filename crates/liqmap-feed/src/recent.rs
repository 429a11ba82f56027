//! Most recent liquidations, newest first.

use liqmap_core::{LiquidationEvent, LiquidationRecord};
use parking_lot::RwLock;
use std::collections::VecDeque;

pub const DEFAULT_RECENT_CAPACITY: usize = 50;

/// Bounded buffer of display rows. When full, the oldest row is dropped.
#[derive(Debug)]
pub struct RecentLiquidations {
    capacity: usize,
    records: RwLock<VecDeque<LiquidationRecord>>,
}

impl Default for RecentLiquidations {
    fn default() -> Self {
        Self::new(DEFAULT_RECENT_CAPACITY)
    }
}

impl RecentLiquidations {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            records: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record a batch in arrival order; the last event ends up first.
    pub fn push_batch(&self, events: &[LiquidationEvent]) {
        if self.capacity == 0 {
            return;
        }

        let mut records = self.records.write();
        for event in events {
            records.push_front(LiquidationRecord::from(event));
        }
        records.truncate(self.capacity);
    }

    pub fn records(&self) -> Vec<LiquidationRecord> {
        self.records.read().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use liqmap_core::{Price, Side, Size};
    use rust_decimal_macros::dec;

    fn event(t: i64) -> LiquidationEvent {
        LiquidationEvent::new(
            t,
            "SOLUSDT",
            Side::Buy,
            Price::new(dec!(150.25)),
            Size::new(dec!(10)),
        )
    }

    #[test]
    fn test_newest_first() {
        let recent = RecentLiquidations::new(10);
        recent.push_batch(&[event(1_000), event(2_000)]);
        recent.push_batch(&[event(3_000)]);

        let stamps: Vec<_> = recent.records().into_iter().map(|r| r.timestamp).collect();
        assert_eq!(
            stamps,
            vec![
                "1970-01-01 00:00:03",
                "1970-01-01 00:00:02",
                "1970-01-01 00:00:01",
            ]
        );
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let recent = RecentLiquidations::new(3);
        let batch: Vec<_> = (1..=5).map(|i| event(i * 1_000)).collect();
        recent.push_batch(&batch);

        let records = recent.records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].timestamp, "1970-01-01 00:00:05");
        assert_eq!(records[2].timestamp, "1970-01-01 00:00:03");
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let recent = RecentLiquidations::new(0);
        recent.push_batch(&[event(1_000)]);
        assert!(recent.is_empty());
    }

    #[test]
    fn test_default_capacity() {
        assert_eq!(RecentLiquidations::default().capacity(), 50);
    }
}
