//! Feed counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for the feed connection. Cheap to update from the message loop.
#[derive(Debug, Default)]
pub struct FeedStats {
    connect_attempts: AtomicU64,
    sessions: AtomicU64,
    messages: AtomicU64,
    malformed_messages: AtomicU64,
    decode_failures: AtomicU64,
    events_delivered: AtomicU64,
}

impl FeedStats {
    pub fn record_connect_attempt(&self) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session(&self) {
        self.sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_message(&self) {
        self.messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_failures(&self, count: usize) {
        self.decode_failures
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_events(&self, count: usize) {
        self.events_delivered
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> FeedStatsSnapshot {
        FeedStatsSnapshot {
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            sessions: self.sessions.load(Ordering::Relaxed),
            messages: self.messages.load(Ordering::Relaxed),
            malformed_messages: self.malformed_messages.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            events_delivered: self.events_delivered.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`FeedStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedStatsSnapshot {
    /// Transport connects attempted, successful or not.
    pub connect_attempts: u64,
    /// Connects that reached `Subscribed`.
    pub sessions: u64,
    pub messages: u64,
    pub malformed_messages: u64,
    pub decode_failures: u64,
    pub events_delivered: u64,
}
