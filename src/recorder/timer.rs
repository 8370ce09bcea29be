//! Duration recorders
//!
//! Durations are reported in milliseconds. Percentiles are computed from a
//! reservoir of the most recent samples.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::rate::{Rate, RateInterval, RateReadout};
use super::{MetricRecorder, RangeCounts, RangeRatios, RecordError, to_json};
use crate::event::{Payload, PayloadType};

/// Samples kept for percentile estimation
const RESERVOIR_SIZE: usize = 1024;

fn millis(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / 1_000_000.0
}

fn extract(payload: &Payload) -> Result<Duration, RecordError> {
    match payload {
        Payload::Duration(m) => Ok(m.duration),
        _ => Err(RecordError::unexpected(PayloadType::Duration, payload)),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerReadout {
    pub last_duration: Option<f64>,
    pub min_duration: Option<f64>,
    pub max_duration: Option<f64>,
    pub mean_duration: f64,
    pub percentile50: Option<f64>,
    pub percentile90: Option<f64>,
    pub percentile95: Option<f64>,
    pub rate: RateReadout,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timer {
    last: Option<Duration>,
    min: Option<Duration>,
    max: Option<Duration>,
    sum: Duration,
    count: u64,
    samples: VecDeque<Duration>,
    rate: Rate,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, duration: Duration, at: DateTime<Utc>) {
        self.last = Some(duration);
        self.min = Some(self.min.map_or(duration, |min| min.min(duration)));
        self.max = Some(self.max.map_or(duration, |max| max.max(duration)));
        self.sum = self.sum.saturating_add(duration);
        self.count += 1;
        if self.samples.len() == RESERVOIR_SIZE {
            self.samples.pop_front();
        }
        self.samples.push_back(duration);
        self.rate.mark(at);
    }

    pub fn mean(&self) -> Duration {
        match u32::try_from(self.count) {
            Ok(0) => Duration::ZERO,
            Ok(count) => self.sum / count,
            Err(_) => Duration::from_secs_f64(self.sum.as_secs_f64() / self.count as f64),
        }
    }

    /// Nearest-rank percentile over the reservoir
    pub fn percentile(&self, quantile: f64) -> Option<Duration> {
        if self.samples.is_empty() {
            return None;
        }
        let mut sorted: Vec<Duration> = self.samples.iter().copied().collect();
        sorted.sort_unstable();
        let rank = (quantile * sorted.len() as f64).ceil() as usize;
        sorted.get(rank.saturating_sub(1).min(sorted.len() - 1)).copied()
    }

    pub fn rate(&self) -> &Rate {
        &self.rate
    }

    pub fn summary(&self, now: DateTime<Utc>) -> TimerReadout {
        TimerReadout {
            last_duration: self.last.map(millis),
            min_duration: self.min.map(millis),
            max_duration: self.max.map(millis),
            mean_duration: millis(self.mean()),
            percentile50: self.percentile(0.5).map(millis),
            percentile90: self.percentile(0.9).map(millis),
            percentile95: self.percentile(0.95).map(millis),
            rate: self.rate.readout(now),
        }
    }
}

impl MetricRecorder for Timer {
    fn accepts(&self) -> PayloadType {
        PayloadType::Duration
    }

    fn record(&mut self, payload: &Payload, at: DateTime<Utc>) -> Result<(), RecordError> {
        self.update(extract(payload)?, at);
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
pub struct RangedTimerReadout {
    #[serde(flatten)]
    pub timer: TimerReadout,
    pub range_start: f64,
    pub range_end: f64,
    #[serde(flatten)]
    pub ratios: RangeRatios,
}

/// Timer that also tracks where durations fall relative to `[start, end]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangedTimer {
    timer: Timer,
    range_start: Duration,
    range_end: Duration,
    counts: RangeCounts,
}

impl RangedTimer {
    pub fn new(range_start: Duration, range_end: Duration) -> Self {
        Self {
            timer: Timer::new(),
            range_start,
            range_end,
            counts: RangeCounts::default(),
        }
    }
}

impl MetricRecorder for RangedTimer {
    fn accepts(&self) -> PayloadType {
        PayloadType::Duration
    }

    fn record(&mut self, payload: &Payload, at: DateTime<Utc>) -> Result<(), RecordError> {
        let duration = extract(payload)?;
        self.timer.update(duration, at);
        self.counts.record(duration, self.range_start, self.range_end);
        Ok(())
    }

    fn readout(&self, now: DateTime<Utc>) -> serde_json::Value {
        to_json(&RangedTimerReadout {
            timer: self.timer.summary(now),
            range_start: millis(self.range_start),
            range_end: millis(self.range_end),
            ratios: self.counts.ratios(),
        })
    }

    fn reset(&mut self) {
        *self = Self::new(self.range_start, self.range_end);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrivalsReadout {
    #[serde(flatten)]
    pub timer: TimerReadout,
    pub channels: u32,
    /// Arrivals per second over the last complete minute
    pub arrival_rate: f64,
    /// Mean number of requests in service (arrival rate × mean duration)
    pub concurrency: f64,
    /// Concurrency per channel, capped at 1
    pub utilization: f64,
}

/// Arrivals of requests together with their service time
///
/// Concurrency follows Little's law over the last complete minute and is
/// spread over the configured number of channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arrivals {
    timer: Timer,
    channels: u32,
}

impl Arrivals {
    pub fn new(channels: u32) -> Self {
        Self {
            timer: Timer::new(),
            channels: channels.max(1),
        }
    }
}

impl MetricRecorder for Arrivals {
    fn accepts(&self) -> PayloadType {
        PayloadType::Duration
    }

    fn record(&mut self, payload: &Payload, at: DateTime<Utc>) -> Result<(), RecordError> {
        self.timer.update(extract(payload)?, at);
        Ok(())
    }

    fn readout(&self, now: DateTime<Utc>) -> serde_json::Value {
        let per_minute = self.timer.rate().last(RateInterval::Minute, now);
        let arrival_rate = per_minute as f64 / 60.0;
        let concurrency = arrival_rate * self.timer.mean().as_secs_f64();
        to_json(&ArrivalsReadout {
            timer: self.timer.summary(now),
            channels: self.channels,
            arrival_rate,
            concurrency,
            utilization: (concurrency / self.channels as f64).min(1.0),
        })
    }

    fn reset(&mut self) {
        *self = Self::new(self.channels);
    }
}
