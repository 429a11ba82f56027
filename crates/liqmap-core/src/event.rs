//! Liquidation event types.

use crate::decimal::{Price, Size};
use crate::error::{CoreError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Side of the liquidated order as reported by the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "Buy"),
            Self::Sell => write!(f, "Sell"),
        }
    }
}

impl FromStr for Side {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Buy" | "buy" | "BUY" | "B" => Ok(Self::Buy),
            "Sell" | "sell" | "SELL" | "S" => Ok(Self::Sell),
            other => Err(CoreError::InvalidSide(other.to_string())),
        }
    }
}

/// A single forced-close trade report.
///
/// Immutable once received. Bucketing only looks at `event_time_ms` and
/// `price`; `symbol` and `side` travel along for the recent-liquidations
/// table and metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationEvent {
    /// Source-provided trade time, epoch milliseconds.
    pub event_time_ms: i64,
    pub symbol: String,
    pub side: Side,
    pub price: Price,
    /// Liquidated volume.
    pub size: Size,
}

impl LiquidationEvent {
    pub fn new(
        event_time_ms: i64,
        symbol: impl Into<String>,
        side: Side,
        price: Price,
        size: Size,
    ) -> Self {
        Self {
            event_time_ms,
            symbol: symbol.into(),
            side,
            price,
            size,
        }
    }

    /// Check that price and size are usable for aggregation.
    ///
    /// Finiteness is guaranteed by `Decimal`, so only the sign is left to check.
    pub fn validate(&self) -> Result<()> {
        if self.price.is_negative() {
            return Err(CoreError::InvalidPrice(format!(
                "{} {} at {}",
                self.symbol, self.price, self.event_time_ms
            )));
        }
        if self.size.is_negative() {
            return Err(CoreError::InvalidSize(format!(
                "{} {} at {}",
                self.symbol, self.size, self.event_time_ms
            )));
        }
        Ok(())
    }

    /// Event time as a UTC timestamp, if representable.
    pub fn event_time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.event_time_ms)
    }
}

/// Flat, non-aggregated row for the recent-liquidations table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiquidationRecord {
    /// UTC time formatted as `YYYY-MM-DD HH:MM:SS`.
    pub timestamp: String,
    pub symbol: String,
    pub side: Side,
    pub size: Size,
    pub price: Price,
}

impl From<&LiquidationEvent> for LiquidationRecord {
    fn from(event: &LiquidationEvent) -> Self {
        let timestamp = event
            .event_time()
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| event.event_time_ms.to_string());
        Self {
            timestamp,
            symbol: event.symbol.clone(),
            side: event.side,
            size: event.size,
            price: event.price,
        }
    }
}
