//! `[dashboard]` section.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Serve the heatmap over HTTP at all.
    pub enabled: bool,
    pub port: u16,
    /// Cadence of heatmap pushes to `/ws` clients (ms).
    pub update_interval_ms: u64,
    /// Live `/ws` clients allowed at once.
    pub max_connections: usize,
    /// Chart assets served at `/` when set.
    pub static_dir: Option<PathBuf>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 5000,
            update_interval_ms: 1000,
            max_connections: 10,
            static_dir: None,
        }
    }
}

impl DashboardConfig {
    /// Listen on every interface.
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms.max(1))
    }
}
