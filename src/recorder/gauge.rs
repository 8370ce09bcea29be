use std::fmt::Debug;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::rate::{Rate, RateReadout};
use super::{MetricRecorder, RangeCounts, RangeRatios, RecordError, to_json};
use crate::event::{Payload, PayloadType, Scalar};

/// Numeric type a gauge is specialised for
pub trait GaugeValue:
    Copy + PartialOrd + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const PAYLOAD: PayloadType;

    fn from_scalar(scalar: &Scalar) -> Option<Self>;

    fn as_f64(self) -> f64;
}

impl GaugeValue for i64 {
    const PAYLOAD: PayloadType = PayloadType::Integer;

    fn from_scalar(scalar: &Scalar) -> Option<Self> {
        match scalar {
            Scalar::Integer(i) => Some(*i),
            _ => None,
        }
    }

    fn as_f64(self) -> f64 {
        self as f64
    }
}

impl GaugeValue for f64 {
    const PAYLOAD: PayloadType = PayloadType::Float;

    fn from_scalar(scalar: &Scalar) -> Option<Self> {
        match scalar {
            Scalar::Float(f) => Some(*f),
            _ => None,
        }
    }

    fn as_f64(self) -> f64 {
        self
    }
}

fn extract<T: GaugeValue>(payload: &Payload) -> Result<T, RecordError> {
    let value = match payload {
        Payload::Value(m) => T::from_scalar(&m.value),
        _ => None,
    }
    .ok_or_else(|| RecordError::unexpected(T::PAYLOAD, payload))?;

    let as_f64 = value.as_f64();
    if !as_f64.is_finite() {
        return Err(RecordError::NotFinite(as_f64));
    }
    Ok(value)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GaugeReadout<T> {
    pub last: Option<T>,
    pub min: Option<T>,
    pub max: Option<T>,
    pub mean: f64,
    pub rate: RateReadout,
}

/// Gauge tracking last/min/max/mean and the rate of updates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatedGauge<T> {
    last: Option<T>,
    min: Option<T>,
    max: Option<T>,
    sum: f64,
    count: u64,
    rate: Rate,
}

impl<T> Default for RatedGauge<T> {
    fn default() -> Self {
        Self {
            last: None,
            min: None,
            max: None,
            sum: 0.0,
            count: 0,
            rate: Rate::default(),
        }
    }
}

impl<T: GaugeValue> RatedGauge<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, value: T, at: DateTime<Utc>) {
        self.last = Some(value);
        self.min = Some(match self.min {
            Some(min) if min <= value => min,
            _ => value,
        });
        self.max = Some(match self.max {
            Some(max) if max >= value => max,
            _ => value,
        });
        self.sum += value.as_f64();
        self.count += 1;
        self.rate.mark(at);
    }

    pub fn last(&self) -> Option<T> {
        self.last
    }

    pub fn summary(&self, now: DateTime<Utc>) -> GaugeReadout<T> {
        GaugeReadout {
            last: self.last,
            min: self.min,
            max: self.max,
            mean: if self.count > 0 {
                self.sum / self.count as f64
            } else {
                0.0
            },
            rate: self.rate.readout(now),
        }
    }
}

impl<T: GaugeValue> MetricRecorder for RatedGauge<T> {
    fn accepts(&self) -> PayloadType {
        T::PAYLOAD
    }

    fn record(&mut self, payload: &Payload, at: DateTime<Utc>) -> Result<(), RecordError> {
        let value = extract::<T>(payload)?;
        self.update(value, at);
        Ok(())
    }

    fn readout(&self, now: DateTime<Utc>) -> serde_json::Value {
        to_json(&self.summary(now))
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RangedGaugeReadout<T> {
    #[serde(flatten)]
    pub gauge: GaugeReadout<T>,
    pub range_start: T,
    pub range_end: T,
    #[serde(flatten)]
    pub ratios: RangeRatios,
}

/// Gauge that also tracks where values fall relative to `[start, end]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangedGauge<T> {
    gauge: RatedGauge<T>,
    range_start: T,
    range_end: T,
    counts: RangeCounts,
}

impl<T: GaugeValue> RangedGauge<T> {
    pub fn new(range_start: T, range_end: T) -> Self {
        Self {
            gauge: RatedGauge::new(),
            range_start,
            range_end,
            counts: RangeCounts::default(),
        }
    }

    pub fn update(&mut self, value: T, at: DateTime<Utc>) {
        self.gauge.update(value, at);
        self.counts.record(value, self.range_start, self.range_end);
    }
}

impl<T: GaugeValue> MetricRecorder for RangedGauge<T> {
    fn accepts(&self) -> PayloadType {
        T::PAYLOAD
    }

    fn record(&mut self, payload: &Payload, at: DateTime<Utc>) -> Result<(), RecordError> {
        let value = extract::<T>(payload)?;
        self.update(value, at);
        Ok(())
    }

    fn readout(&self, now: DateTime<Utc>) -> serde_json::Value {
        to_json(&RangedGaugeReadout {
            gauge: self.gauge.summary(now),
            range_start: self.range_start,
            range_end: self.range_end,
            ratios: self.counts.ratios(),
        })
    }

    fn reset(&mut self) {
        *self = Self::new(self.range_start, self.range_end);
    }
}
