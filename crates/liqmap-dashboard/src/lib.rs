//! liqmap-dashboard - HTTP read surface for the liquidation heatmap.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        liqmap process                         │
//! │                                                              │
//! │  ┌────────────────────┐        ┌──────────────────────┐      │
//! │  │ HeatmapAggregator  │        │  RecentLiquidations  │      │
//! │  │      (Arc<>)       │        │       (Arc<>)        │      │
//! │  └─────────┬──────────┘        └──────────┬───────────┘      │
//! │            └──────────────┬───────────────┘                  │
//! │                           ▼                                  │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │                 DashboardState (read only)              │  │
//! │  └────────────────────────┬───────────────────────────────┘  │
//! │                           │                                  │
//! │  ┌────────────────────────┼───────────────────────────────┐  │
//! │  │          axum HTTP server (port 5000)                   │  │
//! │  │  GET /api/liquidation → recent liquidations             │  │
//! │  │  GET /api/heatmap     → grid snapshot                   │  │
//! │  │  GET /metrics         → Prometheus text                 │  │
//! │  │  GET /ws              → periodic heatmap push           │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use liqmap_dashboard::{run_server, DashboardConfig, DashboardState};
//!
//! let state = DashboardState::new(aggregator.clone(), recent.clone(), ceiling);
//! tokio::spawn(async move {
//!     if let Err(e) = run_server(state, DashboardConfig::default(), shutdown).await {
//!         tracing::error!(error = %e, "Dashboard server failed");
//!     }
//! });
//! ```

mod broadcast;
mod config;
mod server;
mod state;
mod types;

pub use config::DashboardConfig;
pub use server::{create_router, run_server, AppState};
pub use state::DashboardState;
pub use types::{intensity, HeatmapCell, HeatmapSnapshot, LiquidationsResponse};
