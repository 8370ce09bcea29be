use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::rate::{Rate, RateReadout};
use super::{MetricRecorder, RecordError, to_json};
use crate::event::{Payload, PayloadType, Scalar};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagReadout {
    pub value: Option<bool>,
    pub true_count: u64,
    pub false_count: u64,
    /// Share of `true` among all recorded values
    pub ratio: f64,
    pub rate: RateReadout,
}

/// Boolean recorder
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Flag {
    last: Option<bool>,
    true_count: u64,
    false_count: u64,
    rate: Rate,
}

impl Flag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, value: bool, at: DateTime<Utc>) {
        self.last = Some(value);
        if value {
            self.true_count += 1;
        } else {
            self.false_count += 1;
        }
        self.rate.mark(at);
    }
}

impl MetricRecorder for Flag {
    fn accepts(&self) -> PayloadType {
        PayloadType::Boolean
    }

    fn record(&mut self, payload: &Payload, at: DateTime<Utc>) -> Result<(), RecordError> {
        match payload {
            Payload::Value(m) => match m.value {
                Scalar::Boolean(b) => {
                    self.update(b, at);
                    Ok(())
                }
                _ => Err(RecordError::unexpected(PayloadType::Boolean, payload)),
            },
            _ => Err(RecordError::unexpected(PayloadType::Boolean, payload)),
        }
    }

    fn readout(&self, now: DateTime<Utc>) -> serde_json::Value {
        let total = self.true_count + self.false_count;
        to_json(&FlagReadout {
            value: self.last,
            true_count: self.true_count,
            false_count: self.false_count,
            ratio: if total > 0 {
                self.true_count as f64 / total as f64
            } else {
                0.0
            },
            rate: self.rate.readout(now),
        })
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}
