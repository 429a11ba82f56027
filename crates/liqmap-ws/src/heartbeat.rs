//! Heartbeat management for the feed connection.
//!
//! The exchange drops idle sockets, so the client pings on a fixed cadence
//! and treats a missing reply within the timeout as a transport failure.

use parking_lot::RwLock;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Heartbeat manager for WebSocket connection health.
pub struct HeartbeatManager {
    /// How often to send ping.
    interval: Duration,
    /// How long to wait for pong.
    timeout: Duration,
    last_ping: RwLock<Option<Instant>>,
    /// Last message received (any message).
    last_message: RwLock<Instant>,
    waiting_for_pong: RwLock<bool>,
}

impl HeartbeatManager {
    pub fn new(interval_ms: u64, timeout_ms: u64) -> Self {
        Self {
            interval: Duration::from_millis(interval_ms),
            timeout: Duration::from_millis(timeout_ms),
            last_ping: RwLock::new(None),
            last_message: RwLock::new(Instant::now()),
            waiting_for_pong: RwLock::new(false),
        }
    }

    /// Reset heartbeat state (called on connection).
    pub fn reset(&self) {
        *self.last_ping.write() = None;
        *self.last_message.write() = Instant::now();
        *self.waiting_for_pong.write() = false;
    }

    pub fn record_ping(&self) {
        *self.last_ping.write() = Some(Instant::now());
        *self.waiting_for_pong.write() = true;
    }

    pub fn record_pong(&self) {
        *self.waiting_for_pong.write() = false;

        if let Some(ping_time) = *self.last_ping.read() {
            debug!(rtt_ms = ping_time.elapsed().as_millis() as u64, "Received pong");
        }
    }

    pub fn record_message(&self) {
        *self.last_message.write() = Instant::now();
    }

    /// A ping is outstanding and its reply is overdue.
    pub fn is_timed_out(&self) -> bool {
        if !*self.waiting_for_pong.read() {
            return false;
        }

        match *self.last_ping.read() {
            Some(ping_time) => ping_time.elapsed() > self.timeout,
            None => false,
        }
    }

    /// No ping outstanding and nothing has arrived for a full interval.
    pub fn should_send_ping(&self) -> bool {
        if *self.waiting_for_pong.read() {
            return false;
        }

        self.time_since_last_message() >= self.interval
    }

    /// How often the connection loop should run the checks above.
    pub fn check_period(&self) -> Duration {
        (self.interval.min(self.timeout) / 2).max(Duration::from_millis(10))
    }

    pub fn time_since_last_message(&self) -> Duration {
        self.last_message.read().elapsed()
    }
}
