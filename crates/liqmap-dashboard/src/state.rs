//! Dashboard state.
//!
//! Read-only handles onto the aggregator and the recent-liquidations buffer.
//! The dashboard never writes to either.

use std::sync::Arc;

use chrono::Utc;
use liqmap_feed::{HeatmapAggregator, RecentLiquidations};
use rust_decimal::Decimal;

use crate::types::{HeatmapCell, HeatmapSnapshot, LiquidationsResponse};

#[derive(Clone)]
pub struct DashboardState {
    aggregator: Arc<HeatmapAggregator>,
    recent: Arc<RecentLiquidations>,
    /// Volume at which a cell reaches full intensity.
    intensity_ceiling: Decimal,
}

impl DashboardState {
    pub fn new(
        aggregator: Arc<HeatmapAggregator>,
        recent: Arc<RecentLiquidations>,
        intensity_ceiling: Decimal,
    ) -> Self {
        Self {
            aggregator,
            recent,
            intensity_ceiling,
        }
    }

    /// Materialize the grid for rendering.
    pub fn heatmap_snapshot(&self) -> HeatmapSnapshot {
        let cells = self
            .aggregator
            .snapshot()
            .iter()
            .map(|p| HeatmapCell::from_point(p, self.intensity_ceiling))
            .collect();

        HeatmapSnapshot {
            timestamp_ms: Utc::now().timestamp_millis(),
            bucket_size: self.aggregator.bucket_size(),
            cells,
        }
    }

    pub fn liquidations(&self) -> LiquidationsResponse {
        LiquidationsResponse {
            liquidations: self.recent.records(),
        }
    }
}
