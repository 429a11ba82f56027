//! Aggregation error types.

use liqmap_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    /// Negative price or size, or coordinates that overflow. The event is
    /// skipped, never propagated past `ingest`.
    #[error("Invalid event: {0}")]
    InvalidEvent(#[source] CoreError),

    #[error("Invalid heatmap config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type FeedResult<T> = Result<T, FeedError>;
