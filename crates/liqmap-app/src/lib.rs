//! Real-time liquidation heatmap.
//!
//! Wires the components together:
//! - Feed connection to the exchange liquidation stream
//! - Heatmap aggregation and the recent-liquidations buffer
//! - Dashboard HTTP surface
//! - Metrics and graceful shutdown

pub mod app;
pub mod config;
pub mod error;

pub use app::Application;
pub use config::{AppConfig, ConfigSource};
pub use error::{AppError, AppResult};
