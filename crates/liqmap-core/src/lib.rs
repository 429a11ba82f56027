//! Core domain types for the liquidation heatmap.
//!
//! This crate provides the value types shared by the feed connection and
//! the aggregator:
//! - `Price`, `Size`: Precision-safe numeric types
//! - `LiquidationEvent`, `Side`: A single forced-close report
//! - `BucketKey`, `HeatmapPoint`: Grid coordinates and rendered cells

pub mod decimal;
pub mod error;
pub mod event;
pub mod grid;

pub use decimal::{Price, Size};
pub use error::{CoreError, Result};
pub use event::{LiquidationEvent, LiquidationRecord, Side};
pub use grid::{time_slot, validate_bucket_size, BucketKey, HeatmapPoint, TIME_BUCKET_MS};
