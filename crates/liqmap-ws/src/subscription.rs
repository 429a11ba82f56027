//! Subscription management for the liquidation stream.
//!
//! Builds the per-symbol topic list, issues the subscribe command with a
//! request id, and tracks which topics the exchange has acknowledged and
//! which have actually delivered data since the last connect.

use crate::message::{CommandResponse, WsRequest};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Topic string for one symbol: `"<stream>.<SYMBOL>"`.
pub fn topic_for(stream_name: &str, symbol: &str) -> String {
    format!("{stream_name}.{symbol}")
}

/// Subscription manager.
///
/// The topic list is fixed at construction; everything else is per-session
/// state and is cleared by [`SubscriptionManager::reset`] on disconnect.
pub struct SubscriptionManager {
    topics: Vec<String>,
    next_req_id: AtomicU64,
    /// req_id -> topics requested under it.
    pending: RwLock<HashMap<String, Vec<String>>>,
    confirmed: RwLock<HashSet<String>>,
    /// topic -> first data seen this session.
    first_data: RwLock<HashMap<String, Instant>>,
}

impl SubscriptionManager {
    pub fn new(stream_name: &str, symbols: &[String]) -> Self {
        Self {
            topics: symbols
                .iter()
                .map(|symbol| topic_for(stream_name, symbol))
                .collect(),
            next_req_id: AtomicU64::new(1),
            pending: RwLock::new(HashMap::new()),
            confirmed: RwLock::new(HashSet::new()),
            first_data: RwLock::new(HashMap::new()),
        }
    }

    /// All configured topics, in symbol order.
    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    /// Build the single subscribe command covering every topic and record it
    /// as pending.
    pub fn subscribe_request(&self) -> WsRequest {
        let req_id = self.next_req_id.fetch_add(1, Ordering::Relaxed).to_string();
        self.pending
            .write()
            .insert(req_id.clone(), self.topics.clone());
        WsRequest::subscribe(req_id, self.topics.clone())
    }

    /// Apply a subscribe ACK.
    ///
    /// Returns `Some(success)` if the response matched a pending request.
    pub fn handle_response(&self, resp: &CommandResponse) -> Option<bool> {
        if !resp.is_subscribe() {
            return None;
        }

        // Some gateways echo an empty req_id; fall back to the oldest pending request.
        let topics = {
            let mut pending = self.pending.write();
            let key = resp
                .req_id
                .as_ref()
                .filter(|id| pending.contains_key(id.as_str()))
                .cloned()
                .or_else(|| pending.keys().min().cloned())?;
            pending.remove(&key)?
        };

        if resp.is_success() {
            info!(count = topics.len(), "Subscription confirmed");
            self.confirmed.write().extend(topics);
            Some(true)
        } else {
            warn!(
                ret_msg = %resp.ret_msg,
                topics = ?topics,
                "Subscription rejected"
            );
            Some(false)
        }
    }

    /// Note that a topic delivered data.
    pub fn record_data(&self, topic: &str) {
        if self.first_data.read().contains_key(topic) {
            return;
        }
        self.first_data
            .write()
            .entry(topic.to_string())
            .or_insert_with(|| {
                debug!(topic, "First data received");
                Instant::now()
            });
    }

    /// Every configured topic has been acknowledged.
    pub fn all_confirmed(&self) -> bool {
        let confirmed = self.confirmed.read();
        self.topics.iter().all(|t| confirmed.contains(t))
    }

    pub fn has_data(&self, topic: &str) -> bool {
        self.first_data.read().contains_key(topic)
    }

    /// Clear per-session state (called on disconnect).
    pub fn reset(&self) {
        self.pending.write().clear();
        self.confirmed.write().clear();
        self.first_data.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbols() -> Vec<String> {
        vec!["BTCUSDT".to_string(), "ETHUSDT".to_string(), "SOLUSDT".to_string()]
    }

    fn response(req_id: &str, success: bool) -> CommandResponse {
        CommandResponse {
            op: "subscribe".to_string(),
            success: Some(success),
            ret_msg: String::new(),
            conn_id: None,
            req_id: Some(req_id.to_string()),
        }
    }

    #[test]
    fn test_topic_format() {
        assert_eq!(topic_for("allLiquidation", "BTCUSDT"), "allLiquidation.BTCUSDT");
    }

    #[test]
    fn test_subscribe_request_lists_every_symbol() {
        let subs = SubscriptionManager::new("allLiquidation", &symbols());
        let req = subs.subscribe_request();

        assert_eq!(req.op, "subscribe");
        assert_eq!(
            req.args,
            vec![
                "allLiquidation.BTCUSDT",
                "allLiquidation.ETHUSDT",
                "allLiquidation.SOLUSDT"
            ]
        );
        assert_eq!(req.req_id.as_deref(), Some("1"));
        assert_eq!(subs.subscribe_request().req_id.as_deref(), Some("2"));
    }

    #[test]
    fn test_ack_confirms_topics() {
        let subs = SubscriptionManager::new("allLiquidation", &symbols());
        let req = subs.subscribe_request();
        assert!(!subs.all_confirmed());

        let result = subs.handle_response(&response(req.req_id.as_deref().unwrap(), true));

        assert_eq!(result, Some(true));
        assert!(subs.all_confirmed());
    }

    #[test]
    fn test_rejected_ack_confirms_nothing() {
        let subs = SubscriptionManager::new("allLiquidation", &symbols());
        let req = subs.subscribe_request();

        let result = subs.handle_response(&response(req.req_id.as_deref().unwrap(), false));

        assert_eq!(result, Some(false));
        assert!(!subs.all_confirmed());
    }

    #[test]
    fn test_empty_req_id_falls_back_to_pending() {
        let subs = SubscriptionManager::new("allLiquidation", &symbols());
        subs.subscribe_request();

        assert_eq!(subs.handle_response(&response("", true)), Some(true));
        assert!(subs.all_confirmed());
        // Nothing left pending.
        assert_eq!(subs.handle_response(&response("", true)), None);
    }

    #[test]
    fn test_non_subscribe_response_ignored() {
        let subs = SubscriptionManager::new("allLiquidation", &symbols());
        subs.subscribe_request();

        let mut resp = response("1", true);
        resp.op = "unsubscribe".to_string();
        assert_eq!(subs.handle_response(&resp), None);
        assert!(!subs.all_confirmed());
    }

    #[test]
    fn test_reset_clears_session_state() {
        let subs = SubscriptionManager::new("allLiquidation", &symbols());
        let req = subs.subscribe_request();
        subs.handle_response(&response(req.req_id.as_deref().unwrap(), true));
        subs.record_data("allLiquidation.BTCUSDT");
        assert!(subs.has_data("allLiquidation.BTCUSDT"));

        subs.reset();

        assert!(!subs.all_confirmed());
        assert!(!subs.has_data("allLiquidation.BTCUSDT"));
        assert_eq!(subs.topics().len(), 3);
    }
}
