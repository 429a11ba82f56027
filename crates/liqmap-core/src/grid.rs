//! Heatmap grid coordinates.

use crate::decimal::{Price, Size};
use crate::error::{CoreError, Result};
use crate::event::LiquidationEvent;
use serde::Serialize;
use std::fmt;

/// Width of a time bucket (1 minute).
pub const TIME_BUCKET_MS: i64 = 60_000;

/// Grid cell coordinate: (time slot, price slot).
///
/// Ordered by time slot first so that an ordered map keyed by `BucketKey`
/// doubles as the time index used for retention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct BucketKey {
    /// Lower edge of the minute, epoch milliseconds.
    pub time_slot: i64,
    /// Lower edge of the price bucket.
    pub price_slot: Price,
}

impl BucketKey {
    pub fn new(time_slot: i64, price_slot: Price) -> Self {
        Self {
            time_slot,
            price_slot,
        }
    }

    /// Bucket an event. Pure function of event time and price.
    ///
    /// Fails when either coordinate falls outside the representable range.
    pub fn for_event(event: &LiquidationEvent, bucket_size: Price) -> Result<Self> {
        let time_slot = time_slot(event.event_time_ms)
            .ok_or(CoreError::TimeOutOfRange(event.event_time_ms))?;
        let price_slot = event.price.floor_to_bucket(bucket_size).ok_or_else(|| {
            CoreError::InvalidPrice(format!(
                "{} does not fit a bucket of {}",
                event.price, bucket_size
            ))
        })?;
        Ok(Self {
            time_slot,
            price_slot,
        })
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.time_slot, self.price_slot)
    }
}

/// Floor an epoch-millisecond timestamp to its minute.
///
/// `None` for the few timestamps near `i64::MIN` whose minute is not an `i64`.
#[inline]
pub fn time_slot(event_time_ms: i64) -> Option<i64> {
    event_time_ms
        .div_euclid(TIME_BUCKET_MS)
        .checked_mul(TIME_BUCKET_MS)
}

/// Validate a configured price bucket width.
pub fn validate_bucket_size(bucket_size: Price) -> Result<()> {
    if bucket_size.is_zero() || bucket_size.is_negative() {
        return Err(CoreError::InvalidBucketSize(bucket_size.to_string()));
    }
    Ok(())
}

/// One populated grid cell, as handed to the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HeatmapPoint {
    /// Minute timestamp, epoch milliseconds.
    pub time: i64,
    pub price: Price,
    /// Accumulated liquidated volume.
    pub value: Size,
}

impl HeatmapPoint {
    pub fn key(&self) -> BucketKey {
        BucketKey::new(self.time, self.price)
    }
}
