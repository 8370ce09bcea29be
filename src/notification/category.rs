use crate::descriptor::Descriptor;
use crate::error::ConnectorResult;
use crate::event::{Event, Payload, types};
use crate::filter::NotificationFilter;

/// Wrapper selected from the physical event type of a category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryKind {
    AttributeChange,
    DurationMeasurement,
    Span,
    ValueMeasurement,
    /// Any other event type, delivered as is
    Generic,
}

impl CategoryKind {
    pub fn for_event_type(event_type: &str) -> Self {
        match event_type {
            types::ATTRIBUTE_CHANGE => CategoryKind::AttributeChange,
            types::DURATION_MEASUREMENT => CategoryKind::DurationMeasurement,
            types::SPAN => CategoryKind::Span,
            types::VALUE_MEASUREMENT => CategoryKind::ValueMeasurement,
            _ => CategoryKind::Generic,
        }
    }

    /// Whether the payload has the kind this wrapper expects
    pub fn accepts_payload(self, payload: Option<&Payload>) -> bool {
        match (self, payload) {
            (CategoryKind::Generic, _) => true,
            (CategoryKind::AttributeChange, Some(Payload::AttributeChange(_))) => true,
            (CategoryKind::DurationMeasurement, Some(Payload::Duration(_))) => true,
            (CategoryKind::Span, Some(Payload::Span(_))) => true,
            (CategoryKind::ValueMeasurement, Some(Payload::Value(_))) => true,
            _ => false,
        }
    }
}

/// A connected event category
#[derive(Debug, Clone)]
pub struct EventCategory {
    id: String,
    event_type: String,
    kind: CategoryKind,
    filter: NotificationFilter,
    descriptor: Descriptor,
}

impl EventCategory {
    /// The physical event type is taken from `name`, or the category id
    pub fn from_descriptor(id: &str, descriptor: Descriptor) -> ConnectorResult<Self> {
        let event_type = descriptor.alternative_name(id).to_string();
        let filter = descriptor.filter()?;
        Ok(Self {
            id: id.to_string(),
            kind: CategoryKind::for_event_type(&event_type),
            event_type,
            filter,
            descriptor,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Physical event type the category listens to
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn kind(&self) -> CategoryKind {
        self.kind
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    pub fn accepts(&self, event: &Event) -> bool {
        event.event_type == self.event_type
            && self.kind.accepts_payload(event.payload.as_ref())
            && self.filter.accepts(event)
    }
}
