//! Configuration dictionaries for attributes, event categories and connectors
//!
//! Every connected attribute and event category carries a [`Descriptor`]: a flat,
//! string-keyed map of parameters. Values may be written as strings, numbers or
//! booleans in the configuration file. They are normalised to strings and
//! parsed on demand by the helpers below.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConnectorError, ConnectorResult};
use crate::filter::NotificationFilter;

/// Recognized descriptor keys
pub mod keys {
    /// Metric family selector
    pub const GAUGE: &str = "gauge";
    /// Source measurement name (attributes) or physical event type (events)
    pub const NAME: &str = "name";
    pub const FROM: &str = "from";
    pub const TO: &str = "to";
    pub const CHANNELS: &str = "channels";
    pub const FILTER: &str = "filter";
    /// Sibling attribute read by a processing attribute
    pub const SOURCE: &str = "source";
    pub const FIELD: &str = "field";
    pub const SCALE: &str = "scale";
    pub const SYNCHRONIZATION_PERIOD: &str = "synchronizationPeriod";
    pub const BATCH_TIMEOUT: &str = "batchTimeout";
}

/// Value accepted for a parameter in configuration files
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ConfigScalar {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl From<ConfigScalar> for String {
    fn from(value: ConfigScalar) -> Self {
        match value {
            ConfigScalar::Boolean(b) => b.to_string(),
            ConfigScalar::Integer(i) => i.to_string(),
            ConfigScalar::Float(f) => f.to_string(),
            ConfigScalar::Text(s) => s,
        }
    }
}

/// String-keyed configuration dictionary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, ConfigScalar>",
    into = "BTreeMap<String, String>"
)]
pub struct Descriptor {
    parameters: BTreeMap<String, String>,
}

impl From<BTreeMap<String, ConfigScalar>> for Descriptor {
    fn from(raw: BTreeMap<String, ConfigScalar>) -> Self {
        Self {
            parameters: raw.into_iter().map(|(k, v)| (k, v.into())).collect(),
        }
    }
}

impl From<Descriptor> for BTreeMap<String, String> {
    fn from(descriptor: Descriptor) -> Self {
        descriptor.parameters
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Descriptor {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            parameters: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl Descriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl ToString) {
        self.parameters.insert(key.into(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.parameters.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.parameters.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Value of the `gauge` selector
    pub fn gauge(&self) -> Option<&str> {
        self.get(keys::GAUGE)
    }

    /// Value of `name`, falling back to `default`
    pub fn alternative_name<'a>(&'a self, default: &'a str) -> &'a str {
        self.get(keys::NAME).unwrap_or(default)
    }

    /// Parse a parameter that must be present
    pub fn parse_required<T>(&self, owner: &str, key: &str) -> ConnectorResult<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        let raw = self
            .get(key)
            .ok_or_else(|| ConnectorError::missing(owner, key))?;
        raw.trim()
            .parse()
            .map_err(|e| ConnectorError::invalid(key, raw, e))
    }

    /// Parse an optional parameter
    pub fn parse_optional<T>(&self, key: &str) -> ConnectorResult<Option<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.get(key)
            .map(|raw| {
                raw.trim()
                    .parse()
                    .map_err(|e| ConnectorError::invalid(key, raw, e))
            })
            .transpose()
    }

    /// Parse an optional parameter, falling back to `default`
    pub fn parse_or<T>(&self, key: &str, default: T) -> ConnectorResult<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        Ok(self.parse_optional(key)?.unwrap_or(default))
    }

    /// Parse a duration that must be present
    pub fn duration_required(&self, owner: &str, key: &str) -> ConnectorResult<Duration> {
        let raw = self
            .get(key)
            .ok_or_else(|| ConnectorError::missing(owner, key))?;
        parse_duration(raw).map_err(|e| ConnectorError::invalid(key, raw, e))
    }

    /// Parse an optional duration, falling back to `default`
    pub fn duration_or(&self, key: &str, default: Duration) -> ConnectorResult<Duration> {
        match self.get(key) {
            Some(raw) => parse_duration(raw).map_err(|e| ConnectorError::invalid(key, raw, e)),
            None => Ok(default),
        }
    }

    /// Channel count for arrivals recorders (at least 1, default 1)
    pub fn channels(&self) -> ConnectorResult<u32> {
        let channels: u32 = self.parse_or(keys::CHANNELS, 1)?;
        if channels == 0 {
            return Err(ConnectorError::invalid(
                keys::CHANNELS,
                "0",
                "must be at least 1",
            ));
        }
        Ok(channels)
    }

    /// Compiled `filter` parameter (match-all when absent)
    pub fn filter(&self) -> ConnectorResult<NotificationFilter> {
        match self.get(keys::FILTER) {
            Some(expression) => NotificationFilter::parse(expression),
            None => Ok(NotificationFilter::match_all()),
        }
    }
}

/// Parse a duration such as `150`, `150ms`, `2s`, `1.5m` or `1h`
///
/// A bare number is read as milliseconds.
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(raw.len());
    let (number, unit) = raw.split_at(split);

    let number: f64 = number
        .parse()
        .map_err(|_| format!("'{raw}' is not a duration"))?;

    let millis = match unit.trim() {
        "" | "ms" => number,
        "s" => number * 1_000.0,
        "m" => number * 60_000.0,
        "h" => number * 3_600_000.0,
        other => return Err(format!("unknown duration unit '{other}'")),
    };

    if !millis.is_finite() || millis < 0.0 {
        return Err(format!("'{raw}' is out of range"));
    }

    if millis.fract() == 0.0 && millis < u64::MAX as f64 {
        Ok(Duration::from_millis(millis as u64))
    } else {
        Duration::try_from_secs_f64(millis / 1_000.0)
            .map_err(|_| format!("'{raw}' is out of range"))
    }
}
