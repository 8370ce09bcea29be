//! Event model shared by connectors, attributes and listeners
//!
//! An [`Event`] is an immutable record of something that happened: a measurement
//! arriving from the monitored resource, or an attribute that was touched by one.
//! Events are shared as `Arc<Event>` once the connector has stamped them.

pub mod sequence;

use std::borrow::Cow;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::filter::{FieldValue, FilterTarget};

pub use sequence::{LocalSequence, SequenceGenerator};

/// Well-known event type tags
pub mod types {
    /// Synthesized when an attribute processed an event
    pub const ATTRIBUTE_CHANGE: &str = "attribute.change";

    /// Carries an integer, float, boolean or string measurement
    pub const VALUE_MEASUREMENT: &str = "measurement.value";

    /// Carries a duration measurement
    pub const DURATION_MEASUREMENT: &str = "measurement.duration";

    /// Carries a span of a distributed trace
    pub const SPAN: &str = "measurement.span";
}

/// Primitive value of a value measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    pub fn payload_type(&self) -> PayloadType {
        match self {
            Scalar::Boolean(_) => PayloadType::Boolean,
            Scalar::Integer(_) => PayloadType::Integer,
            Scalar::Float(_) => PayloadType::Float,
            Scalar::Text(_) => PayloadType::Text,
        }
    }

    fn as_field(&self) -> FieldValue<'_> {
        match self {
            Scalar::Boolean(b) => FieldValue::Boolean(*b),
            Scalar::Integer(i) => FieldValue::Number(*i as f64),
            Scalar::Float(f) => FieldValue::Number(*f),
            Scalar::Text(s) => FieldValue::Text(Cow::Borrowed(s)),
        }
    }
}

/// Runtime type of a payload
///
/// Attributes declare exactly one payload type and ignore every other one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadType {
    Integer,
    Float,
    Boolean,
    Text,
    Duration,
    Span,
    AttributeChange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueMeasurement {
    /// Logical name of the measured quantity
    pub name: String,
    pub value: Scalar,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurationMeasurement {
    pub name: String,
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub name: String,
    pub duration: Duration,
    pub span_id: String,
    pub parent_span_id: Option<String>,
    pub correlation_id: Option<String>,
}

/// Payload of a synthesized attribute-change event
///
/// `old_value` is the same as `new_value`: the event says "this attribute was
/// touched", not what changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeChange {
    pub attribute_name: String,
    pub attribute_type: String,
    pub old_value: serde_json::Value,
    pub new_value: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    Value(ValueMeasurement),
    Duration(DurationMeasurement),
    Span(Span),
    AttributeChange(AttributeChange),
}

impl Payload {
    pub fn payload_type(&self) -> PayloadType {
        match self {
            Payload::Value(m) => m.value.payload_type(),
            Payload::Duration(_) => PayloadType::Duration,
            Payload::Span(_) => PayloadType::Span,
            Payload::AttributeChange(_) => PayloadType::AttributeChange,
        }
    }

    /// Logical name of the measured quantity, if this is a measurement
    pub fn measurement_name(&self) -> Option<&str> {
        match self {
            Payload::Value(m) => Some(&m.name),
            Payload::Duration(m) => Some(&m.name),
            Payload::Span(s) => Some(&s.name),
            Payload::AttributeChange(_) => None,
        }
    }

    /// Event type a payload travels under when the producer does not pick one
    pub fn default_event_type(&self) -> &'static str {
        match self {
            Payload::Value(_) => types::VALUE_MEASUREMENT,
            Payload::Duration(_) => types::DURATION_MEASUREMENT,
            Payload::Span(_) => types::SPAN,
            Payload::AttributeChange(_) => types::ATTRIBUTE_CHANGE,
        }
    }
}

/// Immutable record dispatched through the connector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Type tag used for category matching
    pub event_type: String,

    /// Identity of the emitting resource
    pub source: String,

    /// Assigned by the connector when the event is dispatched
    pub sequence_number: u64,

    pub timestamp: DateTime<Utc>,

    /// Human-readable description
    pub message: String,

    pub payload: Option<Payload>,
}

impl Event {
    /// Create an event without payload
    pub fn new(event_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            source: String::new(),
            sequence_number: 0,
            timestamp: Utc::now(),
            message: message.into(),
            payload: None,
        }
    }

    /// Create an event carrying a payload under the payload's default type
    pub fn measurement(payload: Payload) -> Self {
        let message = match payload.measurement_name() {
            Some(name) => format!("measurement of {name}"),
            None => String::new(),
        };
        Self {
            event_type: payload.default_event_type().to_string(),
            payload: Some(payload),
            ..Self::new("", message)
        }
    }

    /// Shorthand for a value measurement event
    pub fn value(name: impl Into<String>, value: Scalar) -> Self {
        Self::measurement(Payload::Value(ValueMeasurement {
            name: name.into(),
            value,
        }))
    }

    /// Shorthand for a duration measurement event
    pub fn duration(name: impl Into<String>, duration: Duration) -> Self {
        Self::measurement(Payload::Duration(DurationMeasurement {
            name: name.into(),
            duration,
        }))
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_sequence_number(mut self, sequence_number: u64) -> Self {
        self.sequence_number = sequence_number;
        self
    }

    /// Copy of this event under a different type tag
    pub fn retyped(&self, event_type: &str) -> Event {
        Event {
            event_type: event_type.to_string(),
            ..self.clone()
        }
    }

    pub fn payload_type(&self) -> Option<PayloadType> {
        self.payload.as_ref().map(Payload::payload_type)
    }

    pub fn measurement_name(&self) -> Option<&str> {
        self.payload.as_ref().and_then(Payload::measurement_name)
    }
}

fn millis(duration: &Duration) -> f64 {
    duration.as_nanos() as f64 / 1_000_000.0
}

impl FilterTarget for Event {
    fn field(&self, key: &str) -> Option<FieldValue<'_>> {
        let text = |s: &str| Some(FieldValue::Text(Cow::Owned(s.to_string())));
        match key {
            "type" => text(&self.event_type),
            "source" => text(&self.source),
            "message" => text(&self.message),
            "sequenceNumber" => Some(FieldValue::Number(self.sequence_number as f64)),
            _ => match (&self.payload, key) {
                (Some(payload), "name") => payload.measurement_name().and_then(text),
                (Some(Payload::Value(m)), "value") => Some(m.value.as_field()),
                (Some(Payload::Duration(m)), "duration") => {
                    Some(FieldValue::Number(millis(&m.duration)))
                }
                (Some(Payload::Span(s)), "duration") => {
                    Some(FieldValue::Number(millis(&s.duration)))
                }
                (Some(Payload::Span(s)), "spanId") => text(&s.span_id),
                (Some(Payload::Span(s)), "parentSpanId") => s.parent_span_id.as_deref().and_then(text),
                (Some(Payload::Span(s)), "correlationId") => {
                    s.correlation_id.as_deref().and_then(text)
                }
                (Some(Payload::AttributeChange(c)), "attributeName") => text(&c.attribute_name),
                (Some(Payload::AttributeChange(c)), "attributeType") => text(&c.attribute_type),
                _ => None,
            },
        }
    }
}
