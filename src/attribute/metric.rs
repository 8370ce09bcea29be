use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use anyhow::anyhow;
use parking_lot::Mutex;
use tracing::trace;

use super::registry::MetricFamily;
use super::{Attribute, AttributeResolver, DistributedAttribute, ProcessingResult};
use crate::clock::Clock;
use crate::descriptor::Descriptor;
use crate::error::{ConnectorError, ConnectorResult};
use crate::event::{Event, PayloadType};
use crate::filter::NotificationFilter;
use crate::recorder::MetricRecorder;

/// Decides whether an event applies to an attribute
///
/// An event applies when its payload has exactly the declared type, the filter
/// accepts it and its measurement name equals the configured source name.
#[derive(Debug, Clone)]
pub struct EventMatcher {
    payload_type: PayloadType,
    source_name: String,
    filter: NotificationFilter,
}

impl EventMatcher {
    pub fn new(
        payload_type: PayloadType,
        source_name: impl Into<String>,
        filter: NotificationFilter,
    ) -> Self {
        Self {
            payload_type,
            source_name: source_name.into(),
            filter,
        }
    }

    pub fn applies_to(&self, event: &Event) -> bool {
        event.payload_type() == Some(self.payload_type)
            && self.filter.accepts(event)
            && event.measurement_name() == Some(self.source_name.as_str())
    }

    pub fn payload_type(&self) -> PayloadType {
        self.payload_type
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn filter(&self) -> &NotificationFilter {
        &self.filter
    }
}

/// Attribute holding a metric recorder
///
/// The recorder lock serializes event updates, reads and snapshot loads, so a
/// snapshot can never interleave with a dispatch on the same attribute.
pub struct MetricAttribute {
    name: String,
    family: MetricFamily,
    descriptor: Descriptor,
    matcher: EventMatcher,
    recorder: Mutex<Box<dyn MetricRecorder>>,
    clock: Arc<dyn Clock>,
    revision: AtomicU64,
    closed: AtomicBool,
}

impl MetricAttribute {
    pub fn new(
        name: impl Into<String>,
        family: MetricFamily,
        descriptor: Descriptor,
        recorder: Box<dyn MetricRecorder>,
        clock: Arc<dyn Clock>,
    ) -> ConnectorResult<Self> {
        let name = name.into();
        let matcher = EventMatcher::new(
            recorder.accepts(),
            descriptor.alternative_name(&name),
            descriptor.filter()?,
        );

        Ok(Self {
            name,
            family,
            descriptor,
            matcher,
            recorder: Mutex::new(recorder),
            clock,
            revision: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        })
    }

    pub fn family(&self) -> MetricFamily {
        self.family
    }

    pub fn matcher(&self) -> &EventMatcher {
        &self.matcher
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Attribute for MetricAttribute {
    fn name(&self) -> &str {
        &self.name
    }

    fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    fn attribute_type(&self) -> &str {
        self.family.as_str()
    }

    fn is_notification_enabled(&self) -> bool {
        true
    }

    fn dispatch(&self, event: &Event) -> ProcessingResult {
        if self.is_closed() || !self.matcher.applies_to(event) {
            return ProcessingResult::Ignored;
        }
        let Some(payload) = &event.payload else {
            return ProcessingResult::Ignored;
        };

        let mut recorder = self.recorder.lock();
        match recorder.record(payload, event.timestamp) {
            Ok(()) => {
                self.revision.fetch_add(1, Ordering::AcqRel);
                trace!(
                    attribute = %self.name,
                    sequence = event.sequence_number,
                    "recorded event"
                );
                ProcessingResult::Processed(recorder.readout(self.clock.now()))
            }
            Err(e) => ProcessingResult::Failed(anyhow!(e).context(format!(
                "attribute '{}' failed to record event #{}",
                self.name, event.sequence_number
            ))),
        }
    }

    fn read(&self, _resolver: &dyn AttributeResolver) -> ConnectorResult<serde_json::Value> {
        if self.is_closed() {
            return Err(ConnectorError::AttributeClosed(self.name.clone()));
        }
        Ok(self.recorder.lock().readout(self.clock.now()))
    }

    fn as_distributed(&self) -> Option<&dyn DistributedAttribute> {
        Some(self)
    }

    fn reset(&self) {
        self.recorder.lock().reset();
        self.revision.fetch_add(1, Ordering::AcqRel);
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

impl DistributedAttribute for MetricAttribute {
    fn take_snapshot(&self) -> ConnectorResult<Option<serde_json::Value>> {
        Ok(Some(self.recorder.lock().snapshot()?))
    }

    fn load_from_snapshot(&self, snapshot: serde_json::Value) -> ConnectorResult<u64> {
        let mut recorder = self.recorder.lock();
        recorder.restore(snapshot)?;
        // dispatch bumps the revision under the same lock
        Ok(self.revision.load(Ordering::Acquire))
    }

    fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }
}
