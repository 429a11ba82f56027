//! HTTP server implementation using axum.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use futures_util::stream::StreamExt;
use futures_util::SinkExt;
use liqmap_telemetry::Metrics;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{debug, error, info, warn};

use crate::config::DashboardConfig;
use crate::state::DashboardState;
use crate::types::{HeatmapSnapshot, LiquidationsResponse};

/// Caps concurrent WebSocket clients.
pub struct ConnectionLimiter {
    current: AtomicUsize,
    max: usize,
}

impl ConnectionLimiter {
    pub fn new(max: usize) -> Self {
        Self {
            current: AtomicUsize::new(0),
            max,
        }
    }

    pub fn try_acquire(self: &Arc<Self>) -> Option<ConnectionGuard> {
        loop {
            let current = self.current.load(Ordering::Acquire);
            if current >= self.max {
                return None;
            }
            if self
                .current
                .compare_exchange(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Some(ConnectionGuard {
                    limiter: Arc::clone(self),
                });
            }
        }
    }

    pub fn current_count(&self) -> usize {
        self.current.load(Ordering::Relaxed)
    }
}

/// Holds one connection slot until dropped.
pub struct ConnectionGuard {
    limiter: Arc<ConnectionLimiter>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.limiter.current.fetch_sub(1, Ordering::Release);
    }
}

/// Shared application state for axum handlers.
#[derive(Clone)]
pub struct AppState {
    dashboard_state: DashboardState,
    broadcast_tx: broadcast::Sender<String>,
    connection_limiter: Arc<ConnectionLimiter>,
    config: DashboardConfig,
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        dashboard_state: DashboardState,
        broadcast_tx: broadcast::Sender<String>,
        config: DashboardConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            dashboard_state,
            broadcast_tx,
            connection_limiter: Arc::new(ConnectionLimiter::new(config.max_connections)),
            config,
            shutdown,
        }
    }
}

/// Create the axum router.
pub fn create_router(state: AppState) -> Router {
    let static_dir = state.config.static_dir.clone();

    let router = Router::new()
        .route("/api/liquidation", get(get_liquidations))
        .route("/api/heatmap", get(get_heatmap))
        .route("/metrics", get(get_metrics))
        .route("/ws", get(ws_handler))
        .with_state(state)
        .layer(CorsLayer::permissive());

    match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    }
}

/// Recent liquidations, newest first.
async fn get_liquidations(State(state): State<AppState>) -> Json<LiquidationsResponse> {
    Json(state.dashboard_state.liquidations())
}

/// Current heatmap grid.
async fn get_heatmap(State(state): State<AppState>) -> Json<HeatmapSnapshot> {
    Json(state.dashboard_state.heatmap_snapshot())
}

/// Prometheus scrape endpoint.
async fn get_metrics() -> Response {
    match Metrics::encode_text() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics unavailable").into_response()
        }
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let guard = match state.connection_limiter.try_acquire() {
        Some(guard) => guard,
        None => {
            warn!(
                current = state.connection_limiter.current_count(),
                max = state.config.max_connections,
                "WebSocket connection limit reached"
            );
            return (StatusCode::SERVICE_UNAVAILABLE, "Too many connections").into_response();
        }
    };

    let connections = state.connection_limiter.current_count();
    Metrics::dashboard_clients(connections);
    info!(connections, "New WebSocket connection");

    ws.on_upgrade(move |socket| handle_ws_connection(socket, state, guard))
}

/// Push heatmap updates to one client until it leaves or the server stops.
async fn handle_ws_connection(socket: WebSocket, state: AppState, guard: ConnectionGuard) {
    let (mut sender, mut receiver) = socket.split();
    let mut broadcast_rx = state.broadcast_tx.subscribe();

    let initial = state.dashboard_state.heatmap_snapshot();
    if let Ok(json) = serde_json::to_string(&initial) {
        if sender.send(Message::Text(json.into())).await.is_err() {
            debug!("Failed to send initial snapshot, client disconnected");
            return;
        }
    }

    let mut incoming_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Close(_)) => {
                    debug!("Client sent close frame");
                    break;
                }
                Err(e) => {
                    debug!(error = %e, "WebSocket receive error");
                    break;
                }
                _ => {}
            }
        }
    });

    loop {
        tokio::select! {
            result = broadcast_rx.recv() => {
                match result {
                    Ok(msg) => {
                        if sender.send(Message::Text(msg.into())).await.is_err() {
                            debug!("Failed to send message, client disconnected");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "WebSocket client lagged, catching up");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Broadcast channel closed");
                        break;
                    }
                }
            }
            _ = &mut incoming_task => {
                debug!("Incoming task completed, closing connection");
                break;
            }
            () = state.shutdown.cancelled() => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
        }
    }

    incoming_task.abort();
    drop(guard);
    let connections = state.connection_limiter.current_count();
    Metrics::dashboard_clients(connections);
    info!(connections, "WebSocket connection closed");
}

/// Run the dashboard HTTP server until `shutdown` fires.
pub async fn run_server(
    dashboard_state: DashboardState,
    config: DashboardConfig,
    shutdown: CancellationToken,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // One update per interval; a slow client can fall this many behind.
    let (broadcast_tx, _) = broadcast::channel::<String>(16);

    let state = AppState::new(
        dashboard_state.clone(),
        broadcast_tx.clone(),
        config.clone(),
        shutdown.clone(),
    );
    let app = create_router(state);

    tokio::spawn(crate::broadcast::run_broadcaster(
        dashboard_state,
        broadcast_tx,
        config.update_interval(),
        shutdown.clone(),
    ));

    let addr = config.bind_addr();
    info!(port = config.port, "Starting dashboard server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("Dashboard server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use liqmap_core::{LiquidationEvent, Price, Side, Size};
    use liqmap_feed::{HeatmapAggregator, HeatmapConfig, RecentLiquidations};
    use rust_decimal_macros::dec;
    use tower::ServiceExt;

    fn router_with(events: &[LiquidationEvent], max_connections: usize) -> Router {
        let aggregator = Arc::new(HeatmapAggregator::new(HeatmapConfig::default()).unwrap());
        let recent = Arc::new(RecentLiquidations::new(50));
        aggregator.ingest(events);
        recent.push_batch(events);

        let dashboard = DashboardState::new(aggregator, recent, dec!(12));
        let (tx, _) = broadcast::channel(4);
        let config = DashboardConfig {
            max_connections,
            ..Default::default()
        };
        create_router(AppState::new(dashboard, tx, config, CancellationToken::new()))
    }

    async fn get_json(router: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let resp = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn sample_events() -> Vec<LiquidationEvent> {
        vec![
            LiquidationEvent::new(
                1_000,
                "BTCUSDT",
                Side::Buy,
                Price::new(dec!(100.0)),
                Size::new(dec!(2)),
            ),
            LiquidationEvent::new(
                61_000,
                "ETHUSDT",
                Side::Sell,
                Price::new(dec!(102.0)),
                Size::new(dec!(3)),
            ),
            LiquidationEvent::new(
                1_500,
                "BTCUSDT",
                Side::Sell,
                Price::new(dec!(103.9)),
                Size::new(dec!(1)),
            ),
        ]
    }

    #[tokio::test]
    async fn test_heatmap_endpoint() {
        let (status, json) = get_json(router_with(&sample_events(), 10), "/api/heatmap").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["bucket_size"], "5");
        let cells = json["cells"].as_array().unwrap();
        assert_eq!(cells.len(), 2);
        assert_eq!(cells[0]["time"], 0);
        assert_eq!(cells[0]["price"], "100");
        assert_eq!(cells[0]["value"], "3");
        assert_eq!(cells[0]["intensity"], 0.25);
        assert_eq!(cells[1]["time"], 60_000);
    }

    #[tokio::test]
    async fn test_liquidation_endpoint_newest_first() {
        let (status, json) =
            get_json(router_with(&sample_events(), 10), "/api/liquidation").await;

        assert_eq!(status, StatusCode::OK);
        let rows = json["liquidations"].as_array().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["timestamp"], "1970-01-01 00:00:01");
        assert_eq!(rows[0]["price"], "103.9");
        assert_eq!(rows[1]["symbol"], "ETHUSDT");
    }

    #[tokio::test]
    async fn test_empty_state() {
        let (_, json) = get_json(router_with(&[], 10), "/api/liquidation").await;
        assert!(json["liquidations"].as_array().unwrap().is_empty());

        let (_, json) = get_json(router_with(&[], 10), "/api/heatmap").await;
        assert!(json["cells"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        Metrics::grid_cells(2);
        let resp = router_with(&[], 10)
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let text = tokio_test::assert_ok!(String::from_utf8(bytes.to_vec()));
        assert!(text.contains("liqmap_grid_cells"));
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let resp = router_with(&[], 10)
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_connection_limiter() {
        let limiter = Arc::new(ConnectionLimiter::new(2));
        let a = limiter.try_acquire();
        let b = limiter.try_acquire();
        assert!(a.is_some() && b.is_some());
        assert!(limiter.try_acquire().is_none());

        drop(a);
        assert_eq!(limiter.current_count(), 1);
        assert!(limiter.try_acquire().is_some());
    }
}
