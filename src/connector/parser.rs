//! Inbound notification parsing
//!
//! A parser turns the raw headers and body of a pushed notification into an
//! internal [`Event`]. `Ok(None)` means the input was understood but carries
//! nothing to dispatch.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::event::{DurationMeasurement, Event, Payload, Scalar, Span, ValueMeasurement};

/// Header naming the component that produced a measurement
pub const SOURCE_HEADER: &str = "X-Measurement-Source";

pub trait NotificationParser: Send + Sync {
    fn parse(&self, headers: &HashMap<String, String>, body: &[u8]) -> Result<Option<Event>>;
}

/// Case-insensitive header lookup
pub fn header<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum PushMessage {
    Integer {
        name: String,
        value: i64,
        message: Option<String>,
    },
    Float {
        name: String,
        value: f64,
        message: Option<String>,
    },
    Boolean {
        name: String,
        value: bool,
        message: Option<String>,
    },
    String {
        name: String,
        value: String,
        message: Option<String>,
    },
    Duration {
        name: String,
        /// Milliseconds
        duration: f64,
        message: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Span {
        name: String,
        duration: f64,
        span_id: String,
        parent_span_id: Option<String>,
        correlation_id: Option<String>,
        message: Option<String>,
    },
}

fn from_millis(name: &str, millis: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(millis / 1000.0)
        .with_context(|| format!("invalid duration {millis} ms for measurement {name}"))
}

impl PushMessage {
    fn into_event(self) -> Result<Event> {
        let (payload, message) = match self {
            PushMessage::Integer { name, value, message } => {
                (value_payload(name, Scalar::Integer(value)), message)
            }
            PushMessage::Float { name, value, message } => {
                (value_payload(name, Scalar::Float(value)), message)
            }
            PushMessage::Boolean { name, value, message } => {
                (value_payload(name, Scalar::Boolean(value)), message)
            }
            PushMessage::String { name, value, message } => {
                (value_payload(name, Scalar::Text(value)), message)
            }
            PushMessage::Duration { name, duration, message } => {
                let duration = from_millis(&name, duration)?;
                (Payload::Duration(DurationMeasurement { name, duration }), message)
            }
            PushMessage::Span {
                name,
                duration,
                span_id,
                parent_span_id,
                correlation_id,
                message,
            } => {
                let duration = from_millis(&name, duration)?;
                let span = Span {
                    name,
                    duration,
                    span_id,
                    parent_span_id,
                    correlation_id,
                };
                (Payload::Span(span), message)
            }
        };

        let event = Event::measurement(payload);
        Ok(match message {
            Some(message) => event.with_message(message),
            None => event,
        })
    }
}

fn value_payload(name: String, value: Scalar) -> Payload {
    Payload::Value(ValueMeasurement { name, value })
}

/// Parser for JSON measurements pushed over HTTP
///
/// ```json
/// {"type": "integer", "name": "latency", "value": 42}
/// {"type": "duration", "name": "request", "duration": 12.5, "message": "GET /"}
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonNotificationParser;

impl NotificationParser for JsonNotificationParser {
    fn parse(&self, headers: &HashMap<String, String>, body: &[u8]) -> Result<Option<Event>> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        let message: PushMessage =
            serde_json::from_slice(body).context("failed to parse measurement JSON")?;
        let event = message.into_event()?;

        Ok(Some(match header(headers, SOURCE_HEADER) {
            Some(source) => event.with_source(source),
            None => event,
        }))
    }
}
