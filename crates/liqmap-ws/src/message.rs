//! WebSocket message types.
//!
//! Outgoing commands use the `{"op": ..., "args": [...]}` envelope; incoming
//! traffic is either a command response (carries `op`) or a topic push
//! (carries `data`). Anything else is malformed and dropped by the caller.

use liqmap_core::{CoreError, LiquidationEvent, Price, Side, Size};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;

// ============================================================================
// Outgoing
// ============================================================================

/// Outgoing command to the WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsRequest {
    pub op: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub req_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

impl WsRequest {
    /// Create a ping request.
    pub fn ping() -> Self {
        Self {
            op: "ping".to_string(),
            req_id: None,
            args: Vec::new(),
        }
    }

    /// Create a subscribe request for the given topics.
    pub fn subscribe(req_id: impl Into<String>, topics: Vec<String>) -> Self {
        Self {
            op: "subscribe".to_string(),
            req_id: Some(req_id.into()),
            args: topics,
        }
    }
}

// ============================================================================
// Incoming
// ============================================================================

/// Incoming WebSocket message.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WsMessage {
    /// Response to a command we sent (subscribe ACK, pong).
    Response(CommandResponse),
    /// Topic push carrying a `data` payload.
    Data(DataMessage),
}

impl WsMessage {
    /// Check if this is a heartbeat reply.
    pub fn is_pong(&self) -> bool {
        matches!(self, Self::Response(r) if r.is_pong())
    }

    /// Topic name if this is a data push.
    pub fn topic(&self) -> Option<&str> {
        match self {
            Self::Data(d) => d.topic.as_deref(),
            Self::Response(_) => None,
        }
    }
}

/// Response to a command.
///
/// `{"success":true,"ret_msg":"","conn_id":"...","req_id":"1","op":"subscribe"}`
#[derive(Debug, Clone, Deserialize)]
pub struct CommandResponse {
    pub op: String,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub ret_msg: String,
    #[serde(default)]
    pub conn_id: Option<String>,
    #[serde(default)]
    pub req_id: Option<String>,
}

impl CommandResponse {
    /// Linear streams answer a ping with `op: "ping"` and `ret_msg: "pong"`,
    /// other stream families use `op: "pong"`.
    pub fn is_pong(&self) -> bool {
        self.op == "pong" || (self.op == "ping" && self.ret_msg == "pong")
    }

    pub fn is_subscribe(&self) -> bool {
        self.op == "subscribe"
    }

    /// Missing `success` counts as success.
    pub fn is_success(&self) -> bool {
        self.success.unwrap_or(true)
    }
}

/// Topic push.
///
/// `{"topic":"allLiquidation.BTCUSDT","type":"snapshot","ts":...,"data":[...]}`
#[derive(Debug, Clone, Deserialize)]
pub struct DataMessage {
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub ts: Option<i64>,
    pub data: serde_json::Value,
}

/// Result of decoding the liquidation entries of one message.
#[derive(Debug, Clone, Default)]
pub struct LiquidationBatch {
    /// Successfully decoded events, in message order.
    pub events: Vec<LiquidationEvent>,
    /// Entries that could not be decoded.
    pub failed_count: usize,
}

impl DataMessage {
    /// Decode every liquidation entry in `data`.
    ///
    /// `data` must be an array; entries that fail to decode are counted and
    /// skipped without affecting their neighbours.
    pub fn liquidations(&self) -> LiquidationBatch {
        let entries = match &self.data {
            serde_json::Value::Array(arr) => arr,
            other => {
                tracing::debug!(
                    topic = ?self.topic,
                    data_type = ?other,
                    "Data payload is not an array, ignoring"
                );
                return LiquidationBatch::default();
            }
        };

        let mut events = Vec::with_capacity(entries.len());
        let mut failed_count = 0;

        for entry in entries {
            let decoded = serde_json::from_value::<RawLiquidation>(entry.clone())
                .map_err(|e| e.to_string())
                .and_then(|raw| raw.into_event().map_err(|e| e.to_string()));

            match decoded {
                Ok(event) => events.push(event),
                Err(e) => {
                    tracing::debug!(
                        error = %e,
                        element = ?entry,
                        "Failed to decode liquidation entry"
                    );
                    failed_count += 1;
                }
            }
        }

        LiquidationBatch {
            events,
            failed_count,
        }
    }
}

/// One entry of the liquidation stream as sent on the wire.
///
/// `{"T":1739502302929,"s":"ROSEUSDT","S":"Sell","v":"20000","p":"0.04499"}`
#[derive(Debug, Clone, Deserialize)]
pub struct RawLiquidation {
    #[serde(rename = "T", deserialize_with = "de_epoch_ms")]
    pub time_ms: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "S")]
    pub side: String,
    #[serde(rename = "v", deserialize_with = "de_decimal")]
    pub size: Decimal,
    #[serde(rename = "p", deserialize_with = "de_decimal")]
    pub price: Decimal,
}

impl RawLiquidation {
    /// Convert into a typed event. Sign checks are left to the aggregator.
    pub fn into_event(self) -> Result<LiquidationEvent, CoreError> {
        let side = Side::from_str(&self.side)?;
        Ok(LiquidationEvent::new(
            self.time_ms,
            self.symbol,
            side,
            Price::new(self.price),
            Size::new(self.size),
        ))
    }
}

/// Accept a decimal as JSON text or JSON number.
fn de_decimal<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => parse_decimal_str(&s).map_err(D::Error::custom),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Decimal::from(i))
            } else if let Some(u) = n.as_u64() {
                Ok(Decimal::from(u))
            } else {
                n.as_f64()
                    .ok_or_else(|| D::Error::custom(format!("unrepresentable number {n}")))
                    .and_then(|f| Decimal::try_from(f).map_err(D::Error::custom))
            }
        }
        other => Err(D::Error::custom(format!("expected decimal, got {other}"))),
    }
}

fn parse_decimal_str(s: &str) -> Result<Decimal, rust_decimal::Error> {
    let s = s.trim();
    if s.contains(['e', 'E']) {
        Decimal::from_scientific(s)
    } else {
        Decimal::from_str(s)
    }
}

/// Accept epoch milliseconds as JSON number or numeric text.
fn de_epoch_ms<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| D::Error::custom(format!("timestamp out of range: {n}"))),
        serde_json::Value::String(s) => s.trim().parse::<i64>().map_err(D::Error::custom),
        other => Err(D::Error::custom(format!("expected timestamp, got {other}"))),
    }
}
