//! Liquidation heatmap aggregation.
//!
//! Buckets decoded liquidation events into a (minute, price bucket) grid
//! and keeps a short buffer of the most recent events for display.

pub mod aggregator;
pub mod error;
pub mod recent;

pub use aggregator::{HeatmapAggregator, HeatmapConfig, IngestReport};
pub use error::{FeedError, FeedResult};
pub use recent::{RecentLiquidations, DEFAULT_RECENT_CAPACITY};
