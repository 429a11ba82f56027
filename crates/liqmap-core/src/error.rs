//! Error types for liqmap-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid size: {0}")]
    InvalidSize(String),

    #[error("Invalid side: {0}")]
    InvalidSide(String),

    #[error("Event time out of range: {0}")]
    TimeOutOfRange(i64),

    #[error("Invalid bucket size: {0}")]
    InvalidBucketSize(String),

    #[error("Decimal parse error: {0}")]
    DecimalParse(#[from] rust_decimal::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
