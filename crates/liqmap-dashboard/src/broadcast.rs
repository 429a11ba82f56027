//! WebSocket push.
//!
//! The broadcaster materializes the heatmap at a fixed interval and sends it
//! to every connected WebSocket client.

use std::time::Duration;

use liqmap_telemetry::Metrics;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::state::DashboardState;

/// Run the broadcaster until `shutdown` fires.
pub async fn run_broadcaster(
    state: DashboardState,
    tx: broadcast::Sender<String>,
    period: Duration,
    shutdown: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            () = shutdown.cancelled() => {
                debug!("Broadcaster stopping");
                return;
            }
        }

        // Nobody listening, skip the copy.
        if tx.receiver_count() == 0 {
            continue;
        }

        let snapshot = state.heatmap_snapshot();
        Metrics::grid_cells(snapshot.cells.len());

        match serde_json::to_string(&snapshot) {
            Ok(json) => match tx.send(json) {
                Ok(n) => trace!(receivers = n, "Heatmap update sent"),
                Err(_) => trace!("No WebSocket receivers connected"),
            },
            Err(e) => debug!(error = %e, "Failed to serialize heatmap update"),
        }
    }
}
