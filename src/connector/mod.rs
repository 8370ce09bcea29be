//! Connector - Entry point for notifications of one monitored resource
//!
//! ## Pipeline
//!
//! 1. The raw notification is parsed into an [`Event`]
//! 2. The event is stamped with source, timestamp and sequence number
//! 3. A fan-out task is spawned and a [`DispatchTicket`] returned right away
//!
//! The fan-out offers the event to the attribute repository first. Every
//! attribute that processed it produces an `attribute.change` event. Those
//! changes and then the original event go through the event repository to the
//! listeners.
//!
//! ## Shutdown
//!
//! [`Connector::close`] stops accepting notifications, waits for the running
//! fan-outs, stops the synchronizer and disconnects everything.

pub mod builder;
pub mod parser;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::attribute::{Attribute, AttributeRepository, ProcessingResult};
use crate::clock::Clock;
use crate::cluster::{ClusterStore, SynchronizerHandle};
use crate::config::ConnectorConfig;
use crate::descriptor::Descriptor;
use crate::error::{ConnectorError, ConnectorResult};
use crate::event::{AttributeChange, Event, Payload, SequenceGenerator, types};
use crate::notification::{EventCategory, EventRepository, ListenerId, NotificationListener};

pub use builder::ConnectorBuilder;
pub use parser::{JsonNotificationParser, NotificationParser, SOURCE_HEADER};

/// Handle on a dispatched notification
pub struct DispatchTicket {
    event: Arc<Event>,
    completion: JoinHandle<()>,
}

impl DispatchTicket {
    /// The event as stamped by the connector
    pub fn event(&self) -> &Arc<Event> {
        &self.event
    }

    pub fn sequence_number(&self) -> u64 {
        self.event.sequence_number
    }

    /// Wait until attributes and listeners have seen the event
    pub async fn completed(self) -> ConnectorResult<()> {
        self.completion
            .await
            .map_err(|e| ConnectorError::Interrupted(e.to_string()))
    }
}

#[derive(Default)]
struct InFlight {
    count: AtomicUsize,
    drained: Notify,
}

/// Decrements the in-flight count when a fan-out ends, even by panic
struct InFlightGuard(Arc<InFlight>);

impl InFlightGuard {
    fn enter(in_flight: &Arc<InFlight>) -> Self {
        in_flight.count.fetch_add(1, Ordering::SeqCst);
        Self(in_flight.clone())
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.drained.notify_waiters();
        }
    }
}

/// Everything a fan-out task needs, cheap to clone into it
#[derive(Clone)]
struct Pipeline {
    resource_name: Arc<str>,
    attributes: Arc<AttributeRepository>,
    events: Arc<EventRepository>,
    sequence: Arc<dyn SequenceGenerator>,
    clock: Arc<dyn Clock>,
}

impl Pipeline {
    #[instrument(skip_all, fields(resource = %self.resource_name, sequence = event.sequence_number))]
    async fn fan_out(self, event: Arc<Event>) {
        let mut changes = Vec::new();
        self.attributes
            .handle_notification(event.clone(), |attribute, result| match result {
                ProcessingResult::Ignored => {}
                ProcessingResult::Failed(e) => {
                    error!("attribute {} failed to process event: {e:#}", attribute.name());
                }
                ProcessingResult::Processed(value) => {
                    changes.push(self.attribute_change(attribute, value));
                }
            })
            .await;

        trace!("{} attributes changed", changes.len());
        for change in &changes {
            self.events.dispatch(change).await;
        }
        self.events.dispatch(&event).await;
    }

    /// Event announcing that `attribute` was touched; old and new value are the same
    fn attribute_change(&self, attribute: &Arc<dyn Attribute>, value: Value) -> Event {
        let change = AttributeChange {
            attribute_name: attribute.name().to_string(),
            attribute_type: attribute.attribute_type().to_string(),
            old_value: value.clone(),
            new_value: value,
        };
        Event {
            event_type: types::ATTRIBUTE_CHANGE.to_string(),
            source: self.resource_name.to_string(),
            sequence_number: self.sequence.next(),
            timestamp: self.clock.now(),
            message: format!("attribute {} changed", attribute.name()),
            payload: Some(Payload::AttributeChange(change)),
        }
    }
}

pub struct Connector {
    pipeline: Pipeline,
    parser: Arc<dyn NotificationParser>,
    runtime: Handle,
    synchronizer: Option<SynchronizerHandle>,
    accepting: AtomicBool,
    in_flight: Arc<InFlight>,
}

impl Connector {
    pub fn builder(resource_name: impl Into<String>, runtime: Handle) -> ConnectorBuilder {
        ConnectorBuilder::new(resource_name, runtime)
    }

    /// Build a connector and connect everything the configuration declares
    ///
    /// Attributes and events whose descriptor is invalid are logged and left
    /// out; they do not prevent the others from being connected.
    pub fn from_config(
        config: &ConnectorConfig,
        runtime: Handle,
        store: Option<Arc<dyn ClusterStore>>,
    ) -> ConnectorResult<Self> {
        let mut builder = Connector::builder(&config.resource, runtime)
            .batch_timeout(config.batch_timeout()?)
            .synchronization_period(config.synchronization_period()?)
            .parallel_listeners(config.threads.is_some());
        if let Some(store) = store {
            builder = builder.cluster(config.node_id(), store);
        }
        let connector = builder.build();

        // failures are logged by the repositories
        let skipped_attributes = config
            .attributes
            .iter()
            .filter(|(id, descriptor)| connector.connect_attribute(id, descriptor).is_err())
            .count();
        let skipped_events = config
            .events
            .iter()
            .filter(|(id, descriptor)| connector.connect_event(id, descriptor).is_err())
            .count();
        if skipped_attributes + skipped_events > 0 {
            debug!(
                "skipped {skipped_attributes} attributes and {skipped_events} event categories with invalid descriptors"
            );
        }
        info!(
            "connector for {} ready with {} attributes and {} event categories",
            config.resource,
            connector.attributes().len(),
            connector.events().len()
        );
        Ok(connector)
    }

    pub fn resource_name(&self) -> &str {
        &self.pipeline.resource_name
    }

    pub fn attributes(&self) -> &Arc<AttributeRepository> {
        &self.pipeline.attributes
    }

    pub fn events(&self) -> &Arc<EventRepository> {
        &self.pipeline.events
    }

    pub fn synchronizer(&self) -> Option<&SynchronizerHandle> {
        self.synchronizer.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        !self.accepting.load(Ordering::Acquire)
    }

    /// Parse and dispatch a raw notification
    ///
    /// Returns `None` when the notification is dropped: unparseable input,
    /// nothing to dispatch, or a closed connector. Each case is logged.
    pub fn dispatch(&self, headers: &HashMap<String, String>, body: &[u8]) -> Option<DispatchTicket> {
        let event = match self.parser.parse(headers, body) {
            Ok(Some(event)) => event,
            Ok(None) => {
                warn!("notification for {} carries no event", self.resource_name());
                return None;
            }
            Err(e) => {
                warn!("failed to parse notification for {}: {e:#}", self.resource_name());
                return None;
            }
        };

        self.submit(event)
            .inspect_err(|e| warn!("dropping notification: {e}"))
            .ok()
    }

    /// Stamp and dispatch an already built event
    pub fn submit(&self, mut event: Event) -> ConnectorResult<DispatchTicket> {
        // entered before the check so a racing close() drains this fan-out
        let guard = InFlightGuard::enter(&self.in_flight);
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(ConnectorError::Closed(self.resource_name().to_string()));
        }

        if event.source.is_empty() {
            event.source = self.resource_name().to_string();
        }
        event.timestamp = self.pipeline.clock.now();
        event.sequence_number = self.pipeline.sequence.next();
        let event = Arc::new(event);
        trace!("dispatching {} #{}", event.event_type, event.sequence_number);

        let pipeline = self.pipeline.clone();
        let fan_out_event = event.clone();
        let completion = self.runtime.spawn(async move {
            let _guard = guard;
            pipeline.fan_out(fan_out_event).await;
        });

        Ok(DispatchTicket { event, completion })
    }

    pub fn connect_attribute(
        &self,
        id: &str,
        descriptor: &Descriptor,
    ) -> ConnectorResult<Arc<dyn Attribute>> {
        self.attributes().connect(id, descriptor)
    }

    pub fn disconnect_attribute(&self, id: &str) -> bool {
        self.attributes().disconnect(id)
    }

    pub fn connect_event(&self, id: &str, descriptor: &Descriptor) -> ConnectorResult<Arc<EventCategory>> {
        self.events().connect(id, descriptor)
    }

    pub fn disconnect_event(&self, id: &str) -> bool {
        self.events().disconnect(id)
    }

    pub fn get_attribute(&self, id: &str) -> ConnectorResult<Value> {
        self.attributes().get_attribute(id)
    }

    pub async fn get_attributes(&self, ids: Option<&[String]>) -> ConnectorResult<HashMap<String, Value>> {
        self.attributes().get_attributes(ids).await
    }

    pub fn set_attribute(&self, id: &str, value: Value) -> ConnectorResult<()> {
        self.attributes().set_attribute(id, value)
    }

    pub async fn set_attributes(
        &self,
        values: HashMap<String, Value>,
    ) -> ConnectorResult<HashMap<String, Value>> {
        self.attributes().set_attributes(values).await
    }

    pub fn reset_attribute(&self, id: &str) -> ConnectorResult<()> {
        self.attributes().reset(id)
    }

    pub fn add_listener(&self, listener: Arc<dyn NotificationListener>) -> ListenerId {
        self.events().add_listener(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.events().remove_listener(id)
    }

    /// Wait until no fan-out is running
    pub async fn drain(&self) {
        loop {
            let drained = self.in_flight.drained.notified();
            if self.in_flight.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            drained.await;
        }
    }

    /// Stop accepting notifications and release every attribute and category
    ///
    /// Closing twice is a no-op.
    #[instrument(skip(self), fields(resource = %self.resource_name()))]
    pub async fn close(&self) {
        if self.accepting.swap(false, Ordering::SeqCst) {
            debug!("closing connector");
        } else {
            return;
        }

        self.drain().await;

        if let Some(synchronizer) = &self.synchronizer {
            if let Err(e) = synchronizer.shutdown().await {
                warn!("failed to stop synchronizer: {e:#}");
            }
        }

        let attributes = self.attributes().disconnect_all();
        let events = self.events().disconnect_all();
        info!("connector closed ({attributes} attributes, {events} event categories released)");
    }
}
