//! Statistical recorders owned by metric attributes
//!
//! A recorder is updated with one primitive value per accepted event and read
//! as a structured value with a fixed field layout per family:
//!
//! - **Gauges** ([`RatedGauge`], [`RangedGauge`]): last/min/max/mean plus rate
//! - **Flag** ([`Flag`]): last value, true/false counts, ratio plus rate
//! - **String gauge** ([`StringGauge`]): last/min/max plus rate
//! - **Timers** ([`Timer`], [`RangedTimer`], [`Arrivals`]): durations,
//!   percentiles and rate; arrivals add concurrency over a number of channels
//!
//! Recorders are not synchronized themselves. The owning attribute guards
//! each one with a lock that also serializes snapshot restores.

pub mod flag;
pub mod gauge;
pub mod rate;
pub mod string_gauge;
pub mod timer;

use std::fmt::Debug;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::{Payload, PayloadType};

pub use flag::Flag;
pub use gauge::{GaugeValue, RangedGauge, RatedGauge};
pub use rate::{Rate, RateReadout};
pub use string_gauge::StringGauge;
pub use timer::{Arrivals, RangedTimer, Timer};

/// Errors raised while recording a value
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("expected a {expected:?} payload but received {actual:?}")]
    UnexpectedPayload {
        expected: PayloadType,
        actual: PayloadType,
    },

    #[error("value {0} is not a finite number")]
    NotFinite(f64),
}

impl RecordError {
    pub(crate) fn unexpected(expected: PayloadType, payload: &Payload) -> Self {
        RecordError::UnexpectedPayload {
            expected,
            actual: payload.payload_type(),
        }
    }
}

/// State that can be captured and replaced wholesale for cluster transport
pub trait Replicable {
    fn snapshot(&self) -> Result<serde_json::Value, serde_json::Error>;

    /// Replace the current state with `state`
    fn restore(&mut self, state: serde_json::Value) -> Result<(), serde_json::Error>;
}

impl<T> Replicable for T
where
    T: Serialize + DeserializeOwned,
{
    fn snapshot(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    fn restore(&mut self, state: serde_json::Value) -> Result<(), serde_json::Error> {
        *self = serde_json::from_value(state)?;
        Ok(())
    }
}

/// Stateful accumulator behind a metric attribute
pub trait MetricRecorder: Replicable + Debug + Send + Sync {
    /// The only payload type this recorder can be updated with
    fn accepts(&self) -> PayloadType;

    fn record(&mut self, payload: &Payload, at: DateTime<Utc>) -> Result<(), RecordError>;

    /// Structured statistics as observed at `now`
    fn readout(&self, now: DateTime<Utc>) -> serde_json::Value;

    fn reset(&mut self);
}

pub(crate) fn to_json<T: Serialize>(readout: &T) -> serde_json::Value {
    serde_json::to_value(readout).unwrap_or_default()
}

/// Position of recorded values relative to a configured range
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeCounts {
    less: u64,
    within: u64,
    greater: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeRatios {
    pub less_than_range: f64,
    pub is_in_range: f64,
    pub greater_than_range: f64,
}

impl RangeCounts {
    pub fn record<T: PartialOrd>(&mut self, value: T, start: T, end: T) {
        if value < start {
            self.less += 1;
        } else if value > end {
            self.greater += 1;
        } else {
            self.within += 1;
        }
    }

    pub fn ratios(&self) -> RangeRatios {
        let total = (self.less + self.within + self.greater) as f64;
        let ratio = |n: u64| if total > 0.0 { n as f64 / total } else { 0.0 };
        RangeRatios {
            less_than_range: ratio(self.less),
            is_in_range: ratio(self.within),
            greater_than_range: ratio(self.greater),
        }
    }
}
