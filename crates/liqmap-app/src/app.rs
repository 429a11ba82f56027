//! Main application orchestration.
//!
//! Coordinates:
//! - Feed connection lifecycle
//! - Heatmap ingestion and recent-liquidation tracking
//! - Dashboard server
//! - Metrics and graceful shutdown

use crate::config::AppConfig;
use crate::error::AppResult;
use liqmap_core::LiquidationEvent;
use liqmap_dashboard::{run_server, DashboardState};
use liqmap_feed::{HeatmapAggregator, IngestReport, RecentLiquidations};
use liqmap_telemetry::Metrics;
use liqmap_ws::{ConnectionState, FeedConnection, FeedStatsSnapshot};
use rust_decimal::prelude::ToPrimitive;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How often feed counters are folded into metrics.
const STATS_INTERVAL: Duration = Duration::from_secs(10);

/// Upper bound on waiting for background tasks at shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Main application.
pub struct Application {
    config: AppConfig,
    aggregator: Arc<HeatmapAggregator>,
    recent: Arc<RecentLiquidations>,
    shutdown: CancellationToken,
}

impl Application {
    /// Create a new application. Validates the configuration.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate()?;

        let aggregator = Arc::new(HeatmapAggregator::new(config.heatmap_config())?);
        let recent = Arc::new(RecentLiquidations::new(config.recent.capacity));

        Ok(Self {
            config,
            aggregator,
            recent,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn aggregator(&self) -> &Arc<HeatmapAggregator> {
        &self.aggregator
    }

    pub fn recent(&self) -> &Arc<RecentLiquidations> {
        &self.recent
    }

    /// Token that ends `run` when cancelled, in addition to Ctrl-C.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run until Ctrl-C or the shutdown token fires.
    pub async fn run(self) -> AppResult<()> {
        info!(
            symbols = ?self.config.symbols,
            bucket_size = %self.config.heatmap.price_bucket_size,
            retention_minutes = ?self.config.heatmap.retention_minutes,
            "Starting application"
        );

        let (event_tx, mut event_rx) =
            mpsc::channel::<Vec<LiquidationEvent>>(self.config.websocket.channel_capacity);

        let feed = Arc::new(FeedConnection::new(self.config.feed_config(), event_tx));
        let state_handle = spawn_state_watcher(&feed);
        let feed_handle = feed.start();

        let dashboard_handle = self.spawn_dashboard();

        info!("Entering main event loop");
        let mut stats_interval = tokio::time::interval(STATS_INTERVAL);
        let mut last_stats = FeedStatsSnapshot::default();
        let mut batches = 0u64;

        loop {
            tokio::select! {
                Some(batch) = event_rx.recv() => {
                    batches += 1;
                    self.handle_batch(&batch);
                }

                _ = stats_interval.tick() => {
                    last_stats = sync_feed_metrics(&feed, last_stats);
                    debug!(
                        cells = self.aggregator.cell_count(),
                        recent = self.recent.len(),
                        state = %feed.state(),
                        "Periodic heatmap status"
                    );
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    break;
                }

                () = self.shutdown.cancelled() => {
                    info!("Shutdown requested");
                    break;
                }
            }
        }

        feed.stop();
        self.shutdown.cancel();

        if let Some(handle) = feed_handle {
            await_task("feed connection", handle).await;
        }
        if let Some(handle) = dashboard_handle {
            await_task("dashboard", handle).await;
        }
        state_handle.abort();

        // Drain batches already decoded before the connection stopped.
        while let Ok(batch) = event_rx.try_recv() {
            self.handle_batch(&batch);
        }
        let final_stats = sync_feed_metrics(&feed, last_stats);

        info!(
            batches,
            cells = self.aggregator.cell_count(),
            total_volume = %self.aggregator.total_volume(),
            newest_slot = ?self.aggregator.newest_slot(),
            sessions = final_stats.sessions,
            connect_attempts = final_stats.connect_attempts,
            messages = final_stats.messages,
            malformed = final_stats.malformed_messages,
            decode_failures = final_stats.decode_failures,
            "Final heatmap statistics"
        );

        Ok(())
    }

    /// Feed one decoded batch into the grid and the recent buffer.
    pub fn handle_batch(&self, batch: &[LiquidationEvent]) -> IngestReport {
        for event in batch {
            Metrics::event_received(
                &event.symbol,
                &event.side.to_string(),
                event.size.inner().to_f64().unwrap_or(0.0),
            );
        }

        self.recent.push_batch(batch);
        let report = self.aggregator.ingest(batch);

        Metrics::ingest(report.accepted, report.invalid, report.stale, report.evicted);
        Metrics::grid_cells(self.aggregator.cell_count());

        if report.invalid > 0 || report.stale > 0 {
            debug!(
                accepted = report.accepted,
                invalid = report.invalid,
                stale = report.stale,
                "Batch partially skipped"
            );
        }
        report
    }

    fn spawn_dashboard(&self) -> Option<JoinHandle<()>> {
        if !self.config.dashboard.enabled {
            info!("Dashboard disabled");
            return None;
        }

        let state = DashboardState::new(
            Arc::clone(&self.aggregator),
            Arc::clone(&self.recent),
            self.config.heatmap.intensity_ceiling,
        );
        let config = self.config.dashboard.clone();
        let shutdown = self.shutdown.clone();

        Some(tokio::spawn(async move {
            if let Err(e) = run_server(state, config, shutdown).await {
                error!(error = %e, "Dashboard server failed");
            }
        }))
    }
}

/// Mirror connection state into metrics and count reconnects.
fn spawn_state_watcher(feed: &Arc<FeedConnection>) -> JoinHandle<()> {
    let mut rx = feed.subscribe_state();
    tokio::spawn(async move {
        let mut previous = *rx.borrow_and_update();
        Metrics::ws_state_set(previous.as_str());

        while rx.changed().await.is_ok() {
            let current = *rx.borrow_and_update();
            Metrics::ws_state_set(current.as_str());

            if current == ConnectionState::Disconnected {
                let reason = match previous {
                    ConnectionState::Subscribed => "session_lost",
                    _ => "connect_failed",
                };
                Metrics::ws_reconnect(reason);
            }
            previous = current;
        }
    })
}

/// Fold the connection's counters into metrics since `last`.
fn sync_feed_metrics(feed: &FeedConnection, last: FeedStatsSnapshot) -> FeedStatsSnapshot {
    let now = feed.stats();
    let malformed_now = now.malformed_messages + now.decode_failures;
    let malformed_last = last.malformed_messages + last.decode_failures;
    Metrics::ws_messages(
        now.messages.saturating_sub(last.messages),
        malformed_now.saturating_sub(malformed_last),
    );
    now
}

async fn await_task(name: &str, handle: JoinHandle<()>) {
    match tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await {
        Ok(Ok(())) => debug!(task = name, "Task finished"),
        Ok(Err(e)) => warn!(task = name, error = %e, "Task panicked or was cancelled"),
        Err(_) => warn!(task = name, "Task did not finish before shutdown timeout"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use liqmap_core::{BucketKey, Price, Side, Size};
    use rust_decimal_macros::dec;

    fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.ws_url = "ws://127.0.0.1:9".to_string();
        config.websocket.reconnect_delay_ms = 50;
        config.dashboard.enabled = false;
        config
    }

    fn event(t: i64, price: rust_decimal::Decimal, size: rust_decimal::Decimal) -> LiquidationEvent {
        LiquidationEvent::new(t, "BTCUSDT", Side::Buy, Price::new(price), Size::new(size))
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config = test_config();
        config.symbols.clear();
        assert!(Application::new(config).is_err());
    }

    #[test]
    fn test_handle_batch_updates_grid_and_recent() {
        let app = Application::new(test_config()).unwrap();

        let report = app.handle_batch(&[
            event(1_000, dec!(100.0), dec!(2)),
            event(61_000, dec!(102.0), dec!(3)),
            event(1_500, dec!(103.9), dec!(1)),
            event(2_000, dec!(100), dec!(-1)),
        ]);

        assert_eq!(report.accepted, 3);
        assert_eq!(report.invalid, 1);
        assert_eq!(
            app.aggregator()
                .value_at(&BucketKey::new(0, Price::new(dec!(100)))),
            Some(Size::new(dec!(3)))
        );
        // The recent table shows what arrived, valid or not.
        assert_eq!(app.recent().len(), 4);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown_token() {
        let app = Application::new(test_config()).unwrap();
        let token = app.shutdown_token();
        let handle = tokio::spawn(app.run());

        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("run should return after shutdown")
            .unwrap();
        assert!(result.is_ok());
    }
}
