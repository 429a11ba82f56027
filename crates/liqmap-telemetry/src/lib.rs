//! Prometheus metrics and structured logging for the liquidation heatmap.
//!
//! - Prometheus metrics for connection state, message flow and grid size
//! - Structured logging with tracing (JSON in production)

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
