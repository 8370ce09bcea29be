use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::rate::{Rate, RateReadout};
use super::{MetricRecorder, RecordError, to_json};
use crate::event::{Payload, PayloadType, Scalar};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StringGaugeReadout<'a> {
    pub last: Option<&'a str>,
    pub min: Option<&'a str>,
    pub max: Option<&'a str>,
    pub rate: RateReadout,
}

/// Gauge over string values; min and max are lexicographic
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StringGauge {
    last: Option<String>,
    min: Option<String>,
    max: Option<String>,
    rate: Rate,
}

impl StringGauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, value: &str, at: DateTime<Utc>) {
        if self.min.as_deref().is_none_or(|min| value < min) {
            self.min = Some(value.to_string());
        }
        if self.max.as_deref().is_none_or(|max| value > max) {
            self.max = Some(value.to_string());
        }
        self.last = Some(value.to_string());
        self.rate.mark(at);
    }
}

impl MetricRecorder for StringGauge {
    fn accepts(&self) -> PayloadType {
        PayloadType::Text
    }

    fn record(&mut self, payload: &Payload, at: DateTime<Utc>) -> Result<(), RecordError> {
        match payload {
            Payload::Value(m) => match &m.value {
                Scalar::Text(text) => {
                    self.update(text, at);
                    Ok(())
                }
                _ => Err(RecordError::unexpected(PayloadType::Text, payload)),
            },
            _ => Err(RecordError::unexpected(PayloadType::Text, payload)),
        }
    }

    fn readout(&self, now: DateTime<Utc>) -> serde_json::Value {
        to_json(&StringGaugeReadout {
            last: self.last.as_deref(),
            min: self.min.as_deref(),
            max: self.max.as_deref(),
            rate: self.rate.readout(now),
        })
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}
