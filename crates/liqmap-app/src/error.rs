//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] liqmap_ws::WsError),

    #[error("Feed error: {0}")]
    Feed(#[from] liqmap_feed::FeedError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] liqmap_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
