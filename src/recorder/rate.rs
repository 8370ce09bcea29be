//! Time-windowed event rate
//!
//! For every interval (second up to day) the rate keeps the count of the window
//! in progress and of the last complete window. Windows are aligned to the Unix
//! epoch so two nodes agree on window boundaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateInterval {
    Second,
    Minute,
    FiveMinutes,
    FifteenMinutes,
    Hour,
    Day,
}

impl RateInterval {
    pub const ALL: [RateInterval; 6] = [
        RateInterval::Second,
        RateInterval::Minute,
        RateInterval::FiveMinutes,
        RateInterval::FifteenMinutes,
        RateInterval::Hour,
        RateInterval::Day,
    ];

    pub fn millis(self) -> i64 {
        match self {
            RateInterval::Second => 1_000,
            RateInterval::Minute => 60_000,
            RateInterval::FiveMinutes => 300_000,
            RateInterval::FifteenMinutes => 900_000,
            RateInterval::Hour => 3_600_000,
            RateInterval::Day => 86_400_000,
        }
    }

    fn slot(self, at: DateTime<Utc>) -> i64 {
        at.timestamp_millis().div_euclid(self.millis())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
struct Window {
    slot: Option<i64>,
    current: u64,
    previous: u64,
    max: u64,
}

impl Window {
    fn mark(&mut self, slot: i64) {
        match self.slot {
            Some(s) if slot == s + 1 => {
                self.previous = self.current;
                self.current = 0;
                self.slot = Some(slot);
            }
            Some(s) if slot > s + 1 => {
                self.previous = 0;
                self.current = 0;
                self.slot = Some(slot);
            }
            // late events are counted into the window in progress
            Some(_) => {}
            None => self.slot = Some(slot),
        }
        self.current += 1;
        self.max = self.max.max(self.current);
    }

    /// Count of the last complete window as seen from `slot`
    fn last(&self, slot: i64) -> u64 {
        match self.slot {
            Some(s) if slot == s + 1 => self.current,
            Some(s) if slot > s + 1 => 0,
            Some(_) => self.previous,
            None => 0,
        }
    }
}

/// Per-interval counts exposed in read-outs
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntervalCounts {
    pub second: u64,
    pub minute: u64,
    pub five_minutes: u64,
    pub fifteen_minutes: u64,
    pub hour: u64,
    pub day: u64,
}

impl IntervalCounts {
    fn from_fn(f: impl Fn(usize) -> u64) -> Self {
        Self {
            second: f(0),
            minute: f(1),
            five_minutes: f(2),
            fifteen_minutes: f(3),
            hour: f(4),
            day: f(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateReadout {
    /// Number of events ever recorded
    pub total_rate: u64,
    /// Events in the last complete window of each interval
    pub last_rate: IntervalCounts,
    /// Highest count observed in any window of each interval
    pub max_rate: IntervalCounts,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rate {
    total: u64,
    windows: [Window; 6],
}

impl Rate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&mut self, at: DateTime<Utc>) {
        self.total += 1;
        for (window, interval) in self.windows.iter_mut().zip(RateInterval::ALL) {
            window.mark(interval.slot(at));
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Events in the last complete window of `interval`
    pub fn last(&self, interval: RateInterval, now: DateTime<Utc>) -> u64 {
        let index = RateInterval::ALL
            .iter()
            .position(|i| *i == interval)
            .unwrap_or_default();
        self.windows[index].last(interval.slot(now))
    }

    pub fn readout(&self, now: DateTime<Utc>) -> RateReadout {
        RateReadout {
            total_rate: self.total,
            last_rate: IntervalCounts::from_fn(|i| {
                self.windows[i].last(RateInterval::ALL[i].slot(now))
            }),
            max_rate: IntervalCounts::from_fn(|i| self.windows[i].max),
        }
    }
}
