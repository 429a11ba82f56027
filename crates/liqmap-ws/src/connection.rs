//! Feed connection lifecycle.
//!
//! Owns one live subscription to the liquidation stream. The connection walks
//! `Disconnected -> Connecting -> Subscribed`, drops back to `Disconnected`
//! on any close or transport error, waits a fixed delay, and tries again.
//! It never gives up on its own; only [`FeedConnection::stop`] ends it.

use crate::error::{WsError, WsResult};
use crate::heartbeat::HeartbeatManager;
use crate::message::{WsMessage, WsRequest};
use crate::stats::{FeedStats, FeedStatsSnapshot};
use crate::subscription::SubscriptionManager;
use futures_util::{SinkExt, StreamExt};
use liqmap_core::LiquidationEvent;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::{connect_async_tls_with_config, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// WebSocket URL.
    pub url: String,
    /// Stream name prefix of every topic (e.g. "allLiquidation").
    pub stream_name: String,
    /// Symbols to subscribe to, one topic each.
    pub symbols: Vec<String>,
    /// Fixed wait between a disconnect and the next connect attempt.
    pub reconnect_delay_ms: u64,
    /// Ping cadence.
    pub heartbeat_interval_ms: u64,
    /// Pong must arrive within this.
    pub heartbeat_timeout_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: "wss://stream.bybit.com/v5/public/linear".to_string(),
            stream_name: "allLiquidation".to_string(),
            symbols: vec![
                "BTCUSDT".to_string(),
                "ETHUSDT".to_string(),
                "SOLUSDT".to_string(),
            ],
            reconnect_delay_ms: 3000,
            heartbeat_interval_ms: 20000,
            heartbeat_timeout_ms: 10000,
        }
    }
}

impl FeedConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Reject configurations the connection cannot run with.
    pub fn validate(&self) -> WsResult<()> {
        if self.url.is_empty() {
            return Err(WsError::InvalidConfig("url is empty".to_string()));
        }
        if self.stream_name.is_empty() {
            return Err(WsError::InvalidConfig("stream_name is empty".to_string()));
        }
        if self.symbols.is_empty() {
            return Err(WsError::InvalidConfig("symbol list is empty".to_string()));
        }
        if let Some(blank) = self.symbols.iter().find(|s| s.trim().is_empty()) {
            return Err(WsError::InvalidConfig(format!(
                "blank symbol in list: {blank:?}"
            )));
        }
        if self.reconnect_delay_ms == 0 {
            return Err(WsError::InvalidConfig(
                "reconnect_delay_ms must be positive".to_string(),
            ));
        }
        if self.heartbeat_interval_ms == 0 || self.heartbeat_timeout_ms == 0 {
            return Err(WsError::InvalidConfig(
                "heartbeat interval and timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Subscribed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Subscribed => "subscribed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;
type WsSink = futures_util::stream::SplitSink<WsStream, Message>;

/// Feed connection.
///
/// Decoded events go out through the `mpsc` sender given at construction,
/// one `Vec` per inbound message, in the order the transport received them.
/// Duplicates from upstream are passed through untouched.
pub struct FeedConnection {
    config: FeedConfig,
    state_tx: watch::Sender<ConnectionState>,
    subscriptions: SubscriptionManager,
    heartbeat: HeartbeatManager,
    event_tx: mpsc::Sender<Vec<LiquidationEvent>>,
    stats: FeedStats,
    started: AtomicBool,
    /// Cancellation token for graceful shutdown.
    shutdown_token: CancellationToken,
}

impl FeedConnection {
    pub fn new(config: FeedConfig, event_tx: mpsc::Sender<Vec<LiquidationEvent>>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            subscriptions: SubscriptionManager::new(&config.stream_name, &config.symbols),
            heartbeat: HeartbeatManager::new(
                config.heartbeat_interval_ms,
                config.heartbeat_timeout_ms,
            ),
            config,
            state_tx,
            event_tx,
            stats: FeedStats::default(),
            started: AtomicBool::new(false),
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Get current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }

    pub fn stats(&self) -> FeedStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// Spawn the connection loop.
    ///
    /// Returns `None` if the loop was already started; a stopped connection
    /// cannot be started again.
    pub fn start(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.started.swap(true, Ordering::AcqRel) {
            debug!("Feed connection already started");
            return None;
        }

        let this = Arc::clone(self);
        Some(tokio::spawn(async move { this.run().await }))
    }

    /// Signal graceful shutdown.
    ///
    /// Cancels a pending reconnect delay, closes an open transport, and
    /// prevents any further reconnect.
    pub fn stop(&self) {
        info!("Feed connection stop requested");
        self.shutdown_token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "Connection state changed");
        }
    }

    async fn run(&self) {
        let mut reconnects = 0u64;

        loop {
            if self.is_stopped() {
                info!("Stop requested, exiting connect loop");
                self.set_state(ConnectionState::Disconnected);
                return;
            }

            self.set_state(ConnectionState::Connecting);
            self.stats.record_connect_attempt();

            match self.run_session().await {
                Ok(()) => info!("Feed connection closed"),
                Err(e) => error!(error = %e, "Feed connection error"),
            }

            self.set_state(ConnectionState::Disconnected);
            self.subscriptions.reset();

            if self.is_stopped() {
                info!("Stop requested after disconnect, not reconnecting");
                return;
            }

            reconnects += 1;
            let delay = self.config.reconnect_delay();
            warn!(
                reconnects,
                delay_ms = delay.as_millis() as u64,
                "Reconnecting"
            );

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.shutdown_token.cancelled() => {
                    info!("Stop requested during reconnect delay, exiting");
                    return;
                }
            }
        }
    }

    /// One connection epoch: connect, subscribe, pump messages until the
    /// transport goes away or stop is requested.
    async fn run_session(&self) -> WsResult<()> {
        info!(url = %self.config.url, "Connecting to liquidation stream");

        let connect = connect_async_tls_with_config(&self.config.url, None, true, None);
        let (ws_stream, _response) = tokio::select! {
            result = connect => result?,
            () = self.shutdown_token.cancelled() => return Ok(()),
        };
        let (mut write, mut read) = ws_stream.split();

        self.heartbeat.reset();
        self.subscribe(&mut write).await?;
        self.set_state(ConnectionState::Subscribed);
        self.stats.record_session();

        let mut heartbeat_check = tokio::time::interval(self.heartbeat.check_period());
        heartbeat_check.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                () = self.shutdown_token.cancelled() => {
                    info!("Stop signal received in message loop");
                    if let Err(e) = write.send(Message::Close(None)).await {
                        warn!(error = %e, "Failed to send Close frame during stop");
                    }
                    return Ok(());
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_text_message(&text).await;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            debug!("Received ping, sending pong");
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            self.heartbeat.record_pong();
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (u16::from(f.code), f.reason.to_string()))
                                .unwrap_or((1000, "Normal close".to_string()));
                            warn!(code, %reason, "WebSocket closed by server");
                            return Err(WsError::ConnectionClosed { code, reason });
                        }
                        Some(Err(e)) => {
                            return Err(e.into());
                        }
                        None => {
                            warn!("WebSocket stream ended");
                            return Ok(());
                        }
                        _ => {}
                    }
                }

                _ = heartbeat_check.tick() => {
                    if self.heartbeat.is_timed_out() {
                        return Err(WsError::HeartbeatTimeout);
                    }

                    if self.heartbeat.should_send_ping() {
                        let ping = serde_json::to_string(&WsRequest::ping())?;
                        write.send(Message::Text(ping)).await?;
                        self.heartbeat.record_ping();
                        debug!(
                            idle_ms = self.heartbeat.time_since_last_message().as_millis() as u64,
                            "Sent heartbeat ping"
                        );
                    }
                }
            }
        }
    }

    /// Send the one subscribe command listing every topic.
    async fn subscribe(&self, write: &mut WsSink) -> WsResult<()> {
        let request = self.subscriptions.subscribe_request();
        let payload = serde_json::to_string(&request)?;
        write
            .send(Message::Text(payload))
            .await
            .map_err(|e| WsError::SendFailed(format!("subscribe: {e}")))?;

        info!(
            topics = ?request.args,
            req_id = ?request.req_id,
            "Subscription sent"
        );
        Ok(())
    }

    /// Decode one inbound text frame and forward any liquidations.
    ///
    /// Malformed input is counted and dropped; it never ends the session.
    async fn handle_text_message(&self, text: &str) {
        self.heartbeat.record_message();
        self.stats.record_message();

        let msg: WsMessage = match serde_json::from_str(text) {
            Ok(msg) => msg,
            Err(e) => {
                self.stats.record_malformed();
                debug!(error = %e, len = text.len(), "Dropping malformed message");
                return;
            }
        };

        let data = match msg {
            WsMessage::Response(resp) => {
                if resp.is_pong() {
                    self.heartbeat.record_pong();
                    return;
                }
                match self.subscriptions.handle_response(&resp) {
                    Some(true) if self.subscriptions.all_confirmed() => {
                        info!(topics = self.subscriptions.topics().len(), "All topics confirmed");
                    }
                    Some(_) => {}
                    None => {
                        debug!(op = %resp.op, ret_msg = %resp.ret_msg, "Unhandled command response");
                    }
                }
                return;
            }
            WsMessage::Data(data) => data,
        };

        if let Some(topic) = data.topic.as_deref() {
            self.subscriptions.record_data(topic);
        }

        let batch = data.liquidations();
        if batch.failed_count > 0 {
            self.stats.record_decode_failures(batch.failed_count);
            debug!(
                topic = ?data.topic,
                failed = batch.failed_count,
                "Dropped undecodable liquidation entries"
            );
        }
        if batch.events.is_empty() {
            return;
        }

        self.stats.record_events(batch.events.len());
        if self.event_tx.send(batch.events).await.is_err() {
            warn!("Event receiver dropped");
        }
    }
}
