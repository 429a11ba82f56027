//! Dashboard API types.
//!
//! These types are used for JSON serialization in REST and WebSocket APIs.

use liqmap_core::{HeatmapPoint, LiquidationRecord, Price, Size};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

/// Heatmap grid as served by `/api/heatmap` and pushed over `/ws`.
#[derive(Debug, Clone, Serialize)]
pub struct HeatmapSnapshot {
    /// Timestamp when snapshot was taken (Unix milliseconds).
    pub timestamp_ms: i64,
    /// Price bucket width the grid was built with.
    pub bucket_size: Price,
    /// Populated cells sorted by (time, price).
    pub cells: Vec<HeatmapCell>,
}

/// One rendered cell.
#[derive(Debug, Clone, Serialize)]
pub struct HeatmapCell {
    /// Minute start (Unix milliseconds).
    pub time: i64,
    /// Price bucket lower edge.
    pub price: Price,
    /// Accumulated liquidated volume.
    pub value: Size,
    /// Colour scale position in `[0, 1]`.
    pub intensity: f64,
}

impl HeatmapCell {
    pub fn from_point(point: &HeatmapPoint, ceiling: Decimal) -> Self {
        Self {
            time: point.time,
            price: point.price,
            value: point.value,
            intensity: intensity(point.value, ceiling),
        }
    }
}

/// Response of `/api/liquidation`.
#[derive(Debug, Clone, Serialize)]
pub struct LiquidationsResponse {
    /// Newest first.
    pub liquidations: Vec<LiquidationRecord>,
}

/// `min(value / ceiling, 1)`, saturating. A non-positive ceiling maps every
/// non-zero value to full intensity.
pub fn intensity(value: Size, ceiling: Decimal) -> f64 {
    let value = value.inner();
    if value <= Decimal::ZERO {
        return 0.0;
    }
    if ceiling <= Decimal::ZERO {
        return 1.0;
    }
    (value / ceiling)
        .min(Decimal::ONE)
        .to_f64()
        .unwrap_or(1.0)
}
