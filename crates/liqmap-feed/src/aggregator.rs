//! Heatmap aggregation.
//!
//! The grid is a sorted map from [`BucketKey`] to accumulated volume. Keys
//! order by time slot first, so the same map serves as the time index for
//! the optional retention window: evicting old minutes is a single
//! `split_off` at the window floor.

use crate::error::{FeedError, FeedResult};
use liqmap_core::{
    validate_bucket_size, BucketKey, HeatmapPoint, LiquidationEvent, Price, Size, TIME_BUCKET_MS,
};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Aggregator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeatmapConfig {
    /// Width of a price bucket in quote units.
    pub price_bucket_size: Price,
    /// Keep only the newest N minutes. `None` keeps everything.
    pub retention_minutes: Option<u32>,
}

impl Default for HeatmapConfig {
    fn default() -> Self {
        Self {
            price_bucket_size: Price::new(Decimal::from(5)),
            retention_minutes: None,
        }
    }
}

impl HeatmapConfig {
    pub fn validate(&self) -> FeedResult<()> {
        validate_bucket_size(self.price_bucket_size)?;
        if self.retention_minutes == Some(0) {
            return Err(FeedError::InvalidConfig(
                "retention_minutes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Outcome of one `ingest` call. Informational only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Events added to a cell.
    pub accepted: usize,
    /// Events skipped for a negative value or an overflowing bucket or cell.
    pub invalid: usize,
    /// Events skipped because their minute was already outside the window.
    pub stale: usize,
    /// Cells dropped by the retention window after this batch.
    pub evicted: usize,
}

#[derive(Debug, Default)]
struct Grid {
    cells: BTreeMap<BucketKey, Size>,
    /// Largest time slot ever accepted.
    newest_slot: Option<i64>,
}

impl Grid {
    /// Smallest time slot still inside the window, if a window applies.
    fn window_floor(&self, retention_minutes: Option<u32>) -> Option<i64> {
        let minutes = retention_minutes?;
        let newest = self.newest_slot?;
        // No floor when it would precede i64::MIN: every slot is in range.
        newest.checked_sub((i64::from(minutes) - 1) * TIME_BUCKET_MS)
    }

    fn evict_before(&mut self, floor: i64) -> usize {
        let kept = self
            .cells
            .split_off(&BucketKey::new(floor, Price::new(Decimal::MIN)));
        let dropped = std::mem::replace(&mut self.cells, kept);
        dropped.len()
    }
}

/// Owns the heatmap grid.
///
/// `ingest` and `snapshot` may be called from different tasks or threads.
/// Each call holds the grid lock for its whole duration, so a snapshot never
/// sees a batch half applied and never observes a torn cell.
pub struct HeatmapAggregator {
    config: HeatmapConfig,
    grid: RwLock<Grid>,
}

impl HeatmapAggregator {
    pub fn new(config: HeatmapConfig) -> FeedResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            grid: RwLock::new(Grid::default()),
        })
    }

    pub fn config(&self) -> &HeatmapConfig {
        &self.config
    }

    pub fn bucket_size(&self) -> Price {
        self.config.price_bucket_size
    }

    /// Add each event's size to its cell, in order.
    ///
    /// Invalid events are logged and skipped; they never abort the batch.
    pub fn ingest(&self, events: &[LiquidationEvent]) -> IngestReport {
        let mut report = IngestReport::default();
        if events.is_empty() {
            return report;
        }

        let retention = self.config.retention_minutes;
        let mut grid = self.grid.write();

        for event in events {
            let key = match check_event(event, self.config.price_bucket_size) {
                Ok(key) => key,
                Err(e) => {
                    warn!(error = %e, symbol = %event.symbol, "Skipping invalid liquidation event");
                    report.invalid += 1;
                    continue;
                }
            };

            if let Some(floor) = grid.window_floor(retention) {
                if key.time_slot < floor {
                    debug!(key = %key, floor, "Skipping event older than retention window");
                    report.stale += 1;
                    continue;
                }
            }

            let current = grid.cells.get(&key).copied().unwrap_or(Size::ZERO);
            let Some(total) = current.checked_add(event.size) else {
                warn!(
                    key = %key,
                    size = %event.size,
                    symbol = %event.symbol,
                    "Skipping liquidation event that would overflow its cell"
                );
                report.invalid += 1;
                continue;
            };
            grid.cells.insert(key, total);
            let newest = grid.newest_slot.map_or(key.time_slot, |n| n.max(key.time_slot));
            grid.newest_slot = Some(newest);
            report.accepted += 1;
        }

        if let Some(floor) = grid.window_floor(retention) {
            report.evicted = grid.evict_before(floor);
            if report.evicted > 0 {
                debug!(evicted = report.evicted, floor, "Evicted cells outside retention window");
            }
        }

        report
    }

    /// Copy every populated cell out of the grid.
    ///
    /// Points come back sorted by (time, price).
    pub fn snapshot(&self) -> Vec<HeatmapPoint> {
        self.grid
            .read()
            .cells
            .iter()
            .map(|(key, value)| HeatmapPoint {
                time: key.time_slot,
                price: key.price_slot,
                value: *value,
            })
            .collect()
    }

    /// Accumulated value of one cell.
    pub fn value_at(&self, key: &BucketKey) -> Option<Size> {
        self.grid.read().cells.get(key).copied()
    }

    pub fn cell_count(&self) -> usize {
        self.grid.read().cells.len()
    }

    /// Sum over every cell currently held, saturating at `Decimal::MAX`.
    pub fn total_volume(&self) -> Size {
        self.grid
            .read()
            .cells
            .values()
            .fold(Size::ZERO, |acc, v| acc.saturating_add(*v))
    }

    pub fn newest_slot(&self) -> Option<i64> {
        self.grid.read().newest_slot
    }
}

/// Sign checks, then bucketing. Either failing makes the event invalid.
fn check_event(event: &LiquidationEvent, bucket_size: Price) -> FeedResult<BucketKey> {
    event.validate().map_err(FeedError::InvalidEvent)?;
    BucketKey::for_event(event, bucket_size).map_err(FeedError::InvalidEvent)
}
