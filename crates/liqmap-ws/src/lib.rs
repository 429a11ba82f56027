//! WebSocket connection to the exchange liquidation stream.
//!
//! Provides a best-effort always-connected feed with:
//! - Explicit `Disconnected -> Connecting -> Subscribed` state machine
//! - One subscribe command per connect covering every configured symbol
//! - Fixed-delay reconnection, retried forever until `stop()`
//! - Application-level ping/pong heartbeat
//! - Channel-based delivery of decoded `LiquidationEvent` batches

pub mod connection;
pub mod error;
pub mod heartbeat;
pub mod message;
pub mod stats;
pub mod subscription;

pub use connection::{ConnectionState, FeedConfig, FeedConnection};
pub use error::{WsError, WsResult};
pub use message::{CommandResponse, DataMessage, LiquidationBatch, WsMessage, WsRequest};
pub use stats::{FeedStats, FeedStatsSnapshot};
pub use subscription::{topic_for, SubscriptionManager};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any WebSocket connections are made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
