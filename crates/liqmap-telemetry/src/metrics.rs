//! Prometheus metrics for the liquidation heatmap.
//!
//! Covers:
//! - Feed connection state and reconnects
//! - Inbound message flow and decode failures
//! - Aggregation results and grid size
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A registration failure means a
//! duplicate metric name, which is a programming error caught on first use.

use crate::error::{TelemetryError, TelemetryResult};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_gauge_vec, register_int_gauge,
    Counter, CounterVec, Encoder, Gauge, GaugeVec, IntGauge, TextEncoder,
};

const WS_STATES: [&str; 3] = ["disconnected", "connecting", "subscribed"];

/// Feed connection state (1 = subscribed, 0 = otherwise).
pub static WS_CONNECTED: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "liqmap_ws_connected",
        "Feed connection subscribed (1=subscribed)"
    )
    .unwrap()
});

/// Feed state machine current state.
/// Labels: state (disconnected/connecting/subscribed)
pub static WS_STATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "liqmap_ws_state",
        "Feed state machine current state (1=active, 0=inactive)",
        &["state"]
    )
    .unwrap()
});

/// Total reconnects.
pub static WS_RECONNECT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "liqmap_ws_reconnect_total",
        "Total feed reconnects",
        &["reason"]
    )
    .unwrap()
});

pub static WS_MESSAGES_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "liqmap_ws_messages_total",
        "Total text messages received from the feed"
    )
    .unwrap()
});

pub static WS_MALFORMED_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "liqmap_ws_malformed_total",
        "Messages or liquidation entries dropped as undecodable"
    )
    .unwrap()
});

/// Liquidations received from the feed.
/// Labels: symbol, side
pub static EVENTS_RECEIVED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "liqmap_events_received_total",
        "Liquidation events received",
        &["symbol", "side"]
    )
    .unwrap()
});

/// Liquidated volume received.
/// Labels: symbol, side
pub static VOLUME_RECEIVED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "liqmap_volume_received_total",
        "Liquidated volume received in base units",
        &["symbol", "side"]
    )
    .unwrap()
});

pub static EVENTS_INGESTED_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "liqmap_events_ingested_total",
        "Events accumulated into the heatmap grid"
    )
    .unwrap()
});

/// Events skipped by the aggregator.
/// Labels: reason (invalid/stale)
pub static EVENTS_SKIPPED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "liqmap_events_skipped_total",
        "Events skipped by the aggregator",
        &["reason"]
    )
    .unwrap()
});

pub static CELLS_EVICTED_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "liqmap_cells_evicted_total",
        "Grid cells dropped by the retention window"
    )
    .unwrap()
});

pub static GRID_CELLS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("liqmap_grid_cells", "Populated heatmap grid cells").unwrap()
});

pub static DASHBOARD_CLIENTS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "liqmap_dashboard_clients",
        "Connected dashboard WebSocket clients"
    )
    .unwrap()
});

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    /// Set feed state. Only the active state is 1.
    pub fn ws_state_set(state: &str) {
        for s in WS_STATES {
            WS_STATE.with_label_values(&[s]).set(0.0);
        }
        WS_STATE.with_label_values(&[state]).set(1.0);
        WS_CONNECTED.set(if state == "subscribed" { 1.0 } else { 0.0 });
    }

    pub fn ws_reconnect(reason: &str) {
        WS_RECONNECT_TOTAL.with_label_values(&[reason]).inc();
    }

    /// Add deltas of the connection's own counters.
    pub fn ws_messages(received: u64, malformed: u64) {
        WS_MESSAGES_TOTAL.inc_by(received as f64);
        WS_MALFORMED_TOTAL.inc_by(malformed as f64);
    }

    pub fn event_received(symbol: &str, side: &str, volume: f64) {
        EVENTS_RECEIVED_TOTAL
            .with_label_values(&[symbol, side])
            .inc();
        if volume.is_finite() && volume > 0.0 {
            VOLUME_RECEIVED_TOTAL
                .with_label_values(&[symbol, side])
                .inc_by(volume);
        }
    }

    /// Record one `ingest` outcome.
    pub fn ingest(accepted: usize, invalid: usize, stale: usize, evicted: usize) {
        EVENTS_INGESTED_TOTAL.inc_by(accepted as f64);
        EVENTS_SKIPPED_TOTAL
            .with_label_values(&["invalid"])
            .inc_by(invalid as f64);
        EVENTS_SKIPPED_TOTAL
            .with_label_values(&["stale"])
            .inc_by(stale as f64);
        CELLS_EVICTED_TOTAL.inc_by(evicted as f64);
    }

    pub fn grid_cells(count: usize) {
        GRID_CELLS.set(count as i64);
    }

    pub fn dashboard_clients(count: usize) {
        DASHBOARD_CLIENTS.set(count as i64);
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn encode_text() -> TelemetryResult<String> {
        let encoder = TextEncoder::new();
        let families = prometheus::gather();
        let mut buf = Vec::new();
        encoder
            .encode(&families, &mut buf)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        Ok(String::from_utf8(buf)?)
    }
}
