//! Helper functions for integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use guardia_connector::{
    Attribute, Connector, ConnectorResult, Descriptor, Event, NotificationListener,
    attribute::AttributeResolver, connector::DispatchTicket,
};
use parking_lot::{Condvar, Mutex};
use serde_json::{Value, json};
use tokio::runtime::Handle;

/// Connector with default collaborators on the current runtime
pub fn create_test_connector(resource: &str) -> Connector {
    Connector::builder(resource, Handle::current()).build()
}

pub fn descriptor(parameters: &[(&str, &str)]) -> Descriptor {
    parameters.iter().copied().collect()
}

/// Dispatch a JSON push body and wait until it has been fanned out
pub async fn push(connector: &Connector, body: Value) -> Arc<Event> {
    let ticket = connector
        .dispatch(&HashMap::new(), body.to_string().as_bytes())
        .expect("notification should be accepted");
    complete(ticket).await
}

pub async fn complete(ticket: DispatchTicket) -> Arc<Event> {
    let event = ticket.event().clone();
    ticket.completed().await.unwrap();
    event
}

pub fn integer(name: &str, value: i64) -> Value {
    json!({"type": "integer", "name": name, "value": value})
}

pub fn duration_ms(name: &str, millis: f64) -> Value {
    json!({"type": "duration", "name": name, "duration": millis})
}

/// Listener keeping every notification it receives
#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<Event>>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn of_type(&self, event_type: &str) -> Vec<Event> {
        self.events
            .lock()
            .iter()
            .filter(|event| event.event_type == event_type)
            .cloned()
            .collect()
    }
}

impl NotificationListener for RecordingListener {
    fn handle_notification(&self, event: &Event) -> anyhow::Result<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

/// Latch a blocked attribute waits on
#[derive(Default)]
pub struct Gate {
    open: Mutex<bool>,
    opened: Condvar,
}

impl Gate {
    pub fn open(&self) {
        *self.open.lock() = true;
        self.opened.notify_all();
    }

    fn wait(&self, limit: Duration) {
        let mut open = self.open.lock();
        if !*open {
            let _ = self.opened.wait_for(&mut open, limit);
        }
    }
}

/// Read-only attribute whose reads block until its gate opens
pub struct BlockedAttribute {
    name: String,
    descriptor: Descriptor,
    pub gate: Arc<Gate>,
}

impl BlockedAttribute {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            descriptor: Descriptor::new(),
            gate: Arc::new(Gate::default()),
        })
    }
}

impl Attribute for BlockedAttribute {
    fn name(&self) -> &str {
        &self.name
    }

    fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    fn attribute_type(&self) -> &str {
        "blocked"
    }

    fn is_notification_enabled(&self) -> bool {
        false
    }

    fn read(&self, _resolver: &dyn AttributeResolver) -> ConnectorResult<Value> {
        self.gate.wait(Duration::from_secs(10));
        Ok(json!("released"))
    }
}

/// Event-driven attribute that panics on every event
pub struct PanickingAttribute {
    descriptor: Descriptor,
}

impl PanickingAttribute {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            descriptor: Descriptor::new(),
        })
    }
}

impl Attribute for PanickingAttribute {
    fn name(&self) -> &str {
        "panicking"
    }

    fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    fn attribute_type(&self) -> &str {
        "panicking"
    }

    fn is_notification_enabled(&self) -> bool {
        true
    }

    fn dispatch(&self, _event: &Event) -> guardia_connector::ProcessingResult {
        panic!("attribute handler crashed");
    }

    fn read(&self, _resolver: &dyn AttributeResolver) -> ConnectorResult<Value> {
        Ok(Value::Null)
    }
}
