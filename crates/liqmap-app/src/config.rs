//! Application configuration.
//!
//! Loaded from TOML. Every section is optional; missing keys fall back to the
//! defaults below. A config that loads but fails [`AppConfig::validate`] is
//! the only fatal startup condition.

use crate::error::{AppError, AppResult};
use liqmap_core::{validate_bucket_size, Price};
use liqmap_dashboard::DashboardConfig;
use liqmap_feed::{HeatmapConfig, DEFAULT_RECENT_CAPACITY};
use liqmap_ws::FeedConfig;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_ENV_VAR: &str = "LIQMAP_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// WebSocket endpoint URL.
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    /// Symbols to follow. All of them feed one shared grid.
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,
    /// Topic prefix, joined to each symbol as `<stream_name>.<SYMBOL>`.
    #[serde(default = "default_stream_name")]
    pub stream_name: String,
    #[serde(default)]
    pub websocket: WsConfig,
    #[serde(default)]
    pub heatmap: HeatmapSettings,
    #[serde(default)]
    pub recent: RecentConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_ws_url() -> String {
    "wss://stream.bybit.com/v5/public/linear".to_string()
}

fn default_symbols() -> Vec<String> {
    vec![
        "BTCUSDT".to_string(),
        "ETHUSDT".to_string(),
        "SOLUSDT".to_string(),
    ]
}

fn default_stream_name() -> String {
    "allLiquidation".to_string()
}

/// WebSocket configuration subset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WsConfig {
    /// Fixed delay before every reconnect (ms).
    pub reconnect_delay_ms: u64,
    /// Heartbeat interval (ms).
    pub heartbeat_interval_ms: u64,
    /// Pong deadline (ms).
    pub heartbeat_timeout_ms: u64,
    /// Event batches buffered between the connection and the aggregator.
    pub channel_capacity: usize,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: 3000,
            heartbeat_interval_ms: 20000,
            heartbeat_timeout_ms: 10000,
            channel_capacity: 1024,
        }
    }
}

/// `[heatmap]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeatmapSettings {
    pub price_bucket_size: Price,
    /// Unset keeps every minute forever.
    pub retention_minutes: Option<u32>,
    /// Volume at which a cell renders at full intensity.
    pub intensity_ceiling: Decimal,
}

impl Default for HeatmapSettings {
    fn default() -> Self {
        let base = HeatmapConfig::default();
        Self {
            price_bucket_size: base.price_bucket_size,
            retention_minutes: base.retention_minutes,
            intensity_ceiling: Decimal::from(10_000),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecentConfig {
    pub capacity: usize,
}

impl Default for RecentConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_RECENT_CAPACITY,
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Default log level when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Filter directive handed to the subscriber.
    pub fn log_filter(&self) -> String {
        format!("{},liqmap=debug", self.log_level)
    }
}

/// Where the configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    /// Default path absent, built-in defaults used.
    Defaults,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            symbols: default_symbols(),
            stream_name: default_stream_name(),
            websocket: WsConfig::default(),
            heatmap: HeatmapSettings::default(),
            recent: RecentConfig::default(),
            dashboard: DashboardConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl AppConfig {
    /// Resolve and load configuration.
    ///
    /// Path order: `cli_path`, then `LIQMAP_CONFIG`, then the default path.
    /// An explicit path must exist; a missing default path yields defaults.
    pub fn load(cli_path: Option<&str>) -> AppResult<(Self, ConfigSource)> {
        let explicit = cli_path
            .map(str::to_string)
            .or_else(|| std::env::var(CONFIG_ENV_VAR).ok());

        let (config, source) = match explicit {
            Some(path) => (Self::from_file(&path)?, ConfigSource::File(path.into())),
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => (
                Self::from_file(DEFAULT_CONFIG_PATH)?,
                ConfigSource::File(DEFAULT_CONFIG_PATH.into()),
            ),
            None => (Self::default(), ConfigSource::Defaults),
        };

        config.validate()?;
        Ok((config, source))
    }

    /// Load from a specific file. Does not validate.
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config {}: {e}", path.display()))
        })?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    /// Reject configurations the service cannot run with.
    pub fn validate(&self) -> AppResult<()> {
        self.feed_config()
            .validate()
            .map_err(|e| AppError::Config(e.to_string()))?;

        validate_bucket_size(self.heatmap.price_bucket_size)
            .map_err(|e| AppError::Config(e.to_string()))?;
        self.heatmap_config()
            .validate()
            .map_err(|e| AppError::Config(e.to_string()))?;

        if self.websocket.channel_capacity == 0 {
            return Err(AppError::Config(
                "websocket.channel_capacity must be positive".to_string(),
            ));
        }
        if self.heatmap.intensity_ceiling <= Decimal::ZERO {
            return Err(AppError::Config(
                "heatmap.intensity_ceiling must be positive".to_string(),
            ));
        }
        if self.dashboard.enabled && self.dashboard.update_interval_ms == 0 {
            return Err(AppError::Config(
                "dashboard.update_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn feed_config(&self) -> FeedConfig {
        FeedConfig {
            url: self.ws_url.clone(),
            stream_name: self.stream_name.clone(),
            symbols: self.symbols.clone(),
            reconnect_delay_ms: self.websocket.reconnect_delay_ms,
            heartbeat_interval_ms: self.websocket.heartbeat_interval_ms,
            heartbeat_timeout_ms: self.websocket.heartbeat_timeout_ms,
        }
    }

    pub fn heatmap_config(&self) -> HeatmapConfig {
        HeatmapConfig {
            price_bucket_size: self.heatmap.price_bucket_size,
            retention_minutes: self.heatmap.retention_minutes,
        }
    }
}
