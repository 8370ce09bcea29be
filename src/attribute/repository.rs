//! AttributeRepository - Attributes connected to one resource
//!
//! ## Concurrency
//!
//! - The attribute map sits behind a read-write lock; lookups never wait for
//!   event processing because the lock is released before any work is started
//! - Each event is offered to every notification-enabled attribute in parallel
//!   on the blocking pool of the injected runtime
//! - Bulk reads and writes run in parallel too and share one deadline
//!   (`batchTimeout`); attributes that miss it are left out of the result

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, error, instrument, trace, warn};

use super::registry::{AttributeRegistry, FactoryContext};
use super::{Attribute, AttributeResolver, ProcessingResult};
use crate::clock::Clock;
use crate::descriptor::Descriptor;
use crate::error::{ConnectorError, ConnectorResult};
use crate::event::Event;

/// Deadline shared by the attributes of one bulk read or write
pub const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_secs(30);

pub struct AttributeRepository {
    resource_name: String,
    registry: Arc<AttributeRegistry>,
    context: FactoryContext,
    runtime: Handle,
    batch_timeout: Duration,
    attributes: RwLock<HashMap<String, Arc<dyn Attribute>>>,
}

impl AttributeRepository {
    pub fn new(
        resource_name: impl Into<String>,
        registry: Arc<AttributeRegistry>,
        clock: Arc<dyn Clock>,
        runtime: Handle,
    ) -> Self {
        Self {
            resource_name: resource_name.into(),
            registry,
            context: FactoryContext::new(clock),
            runtime,
            batch_timeout: DEFAULT_BATCH_TIMEOUT,
            attributes: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_batch_timeout(mut self, batch_timeout: Duration) -> Self {
        self.batch_timeout = batch_timeout;
        self
    }

    pub fn resource_name(&self) -> &str {
        &self.resource_name
    }

    pub fn batch_timeout(&self) -> Duration {
        self.batch_timeout
    }

    /// Create the attribute `id` from its descriptor and register it
    ///
    /// Connecting an id that is already connected returns the existing instance
    /// and ignores the new descriptor. A configuration error leaves the
    /// repository untouched.
    #[instrument(skip(self, descriptor), fields(resource = %self.resource_name))]
    pub fn connect(&self, id: &str, descriptor: &Descriptor) -> ConnectorResult<Arc<dyn Attribute>> {
        if let Some(existing) = self.get(id) {
            trace!("attribute {id} already connected");
            return Ok(existing);
        }

        let attribute = self
            .registry
            .create(id, descriptor, &self.context)
            .inspect_err(|e| error!("failed to connect attribute {id}: {e}"))?;
        Ok(self.insert(id, attribute))
    }

    /// Register an already built attribute under `id`
    ///
    /// Same idempotency as [`connect`](Self::connect): an existing attribute wins.
    pub fn connect_instance(&self, id: &str, attribute: Arc<dyn Attribute>) -> Arc<dyn Attribute> {
        self.insert(id, attribute)
    }

    fn insert(&self, id: &str, attribute: Arc<dyn Attribute>) -> Arc<dyn Attribute> {
        match self.attributes.write().entry(id.to_string()) {
            Entry::Occupied(existing) => existing.get().clone(),
            Entry::Vacant(slot) => {
                debug!(
                    "connected attribute {id} of type {} to {}",
                    attribute.attribute_type(),
                    self.resource_name
                );
                slot.insert(attribute).clone()
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Attribute>> {
        self.attributes.read().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.attributes.read().contains_key(id)
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.attributes.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.attributes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.read().is_empty()
    }

    /// Remove and close the attribute `id`; returns whether it was connected
    pub fn disconnect(&self, id: &str) -> bool {
        let removed = self.attributes.write().remove(id);
        match removed {
            Some(attribute) => {
                attribute.close();
                debug!("disconnected attribute {id} from {}", self.resource_name);
                true
            }
            None => false,
        }
    }

    /// Remove and close every attribute; returns how many were connected
    pub fn disconnect_all(&self) -> usize {
        let drained: Vec<_> = self.attributes.write().drain().collect();
        for (_, attribute) in &drained {
            attribute.close();
        }
        debug!(
            "disconnected {} attributes from {}",
            drained.len(),
            self.resource_name
        );
        drained.len()
    }

    /// Drop the accumulated state of attribute `id`
    pub fn reset(&self, id: &str) -> ConnectorResult<()> {
        let attribute = self
            .get(id)
            .ok_or_else(|| ConnectorError::AttributeNotFound(id.to_string()))?;
        attribute.reset();
        debug!("reset attribute {id}");
        Ok(())
    }

    /// Attributes with replicable state
    pub fn distributed_attributes(&self) -> Vec<(String, Arc<dyn Attribute>)> {
        self.attributes
            .read()
            .iter()
            .filter(|(_, attribute)| attribute.as_distributed().is_some())
            .map(|(id, attribute)| (id.clone(), attribute.clone()))
            .collect()
    }

    /// Offer `event` to every notification-enabled attribute
    ///
    /// Attributes are dispatched in parallel and `on_result` is invoked once per
    /// attribute as its result becomes available. A failing or panicking
    /// attribute never prevents the others from being processed.
    pub async fn handle_notification<F>(&self, event: Arc<Event>, mut on_result: F)
    where
        F: FnMut(&Arc<dyn Attribute>, ProcessingResult) + Send,
    {
        let targets: Vec<Arc<dyn Attribute>> = self
            .attributes
            .read()
            .values()
            .filter(|attribute| attribute.is_notification_enabled())
            .cloned()
            .collect();

        let mut pending: FuturesUnordered<_> = targets
            .into_iter()
            .map(|attribute| {
                let event = event.clone();
                let worker = attribute.clone();
                let task = self.runtime.spawn_blocking(move || worker.dispatch(&event));
                async move { (attribute, task.await) }
            })
            .collect();

        while let Some((attribute, outcome)) = pending.next().await {
            let result = match outcome {
                Ok(result) => result,
                Err(e) if e.is_panic() => ProcessingResult::Failed(anyhow!(
                    "attribute '{}' panicked while processing event #{}",
                    attribute.name(),
                    event.sequence_number
                )),
                Err(e) => ProcessingResult::Failed(anyhow!(e)),
            };
            on_result(&attribute, result);
        }
    }

    /// Read a single attribute
    pub fn get_attribute(&self, id: &str) -> ConnectorResult<Value> {
        let attribute = self
            .get(id)
            .ok_or_else(|| ConnectorError::AttributeNotFound(id.to_string()))?;
        attribute.read(self)
    }

    /// Read several attributes at once, or all of them when `ids` is `None`
    ///
    /// Attributes that fail or do not answer within the batch timeout are left
    /// out of the result and logged.
    #[instrument(skip(self, ids), fields(resource = %self.resource_name))]
    pub async fn get_attributes(
        self: &Arc<Self>,
        ids: Option<&[String]>,
    ) -> ConnectorResult<HashMap<String, Value>> {
        let jobs: Vec<_> = self
            .select(ids)
            .into_iter()
            .map(|(id, attribute)| {
                let resolver = Arc::clone(self);
                (id, move || attribute.read(resolver.as_ref()))
            })
            .collect();
        self.run_batch("read", jobs).await
    }

    /// Write a single attribute
    ///
    /// Event-driven attributes are always rejected.
    pub fn set_attribute(&self, id: &str, value: Value) -> ConnectorResult<()> {
        let attribute = self
            .get(id)
            .ok_or_else(|| ConnectorError::AttributeNotFound(id.to_string()))?;
        if attribute.is_notification_enabled() {
            return Err(ConnectorError::CannotBeModified(id.to_string()));
        }
        attribute.write(value)
    }

    /// Write several attributes at once; returns the values that were applied
    #[instrument(skip(self, values), fields(resource = %self.resource_name))]
    pub async fn set_attributes(
        self: &Arc<Self>,
        values: HashMap<String, Value>,
    ) -> ConnectorResult<HashMap<String, Value>> {
        let jobs: Vec<_> = values
            .into_iter()
            .map(|(id, value)| {
                let repository = Arc::clone(self);
                let job_id = id.clone();
                (id, move || -> ConnectorResult<Value> {
                    repository.set_attribute(&job_id, value.clone())?;
                    Ok(value)
                })
            })
            .collect();
        self.run_batch("write", jobs).await
    }

    fn select(&self, ids: Option<&[String]>) -> Vec<(String, Arc<dyn Attribute>)> {
        let attributes = self.attributes.read();
        match ids {
            None => attributes
                .iter()
                .map(|(id, attribute)| (id.clone(), attribute.clone()))
                .collect(),
            Some(ids) => ids
                .iter()
                .filter_map(|id| match attributes.get(id) {
                    Some(attribute) => Some((id.clone(), attribute.clone())),
                    None => {
                        warn!("attribute {id} is not connected to {}", self.resource_name);
                        None
                    }
                })
                .collect(),
        }
    }

    /// Run `jobs` on the blocking pool under one shared deadline
    async fn run_batch<T, J>(
        &self,
        operation: &str,
        jobs: Vec<(String, J)>,
    ) -> ConnectorResult<HashMap<String, T>>
    where
        T: Send + 'static,
        J: FnOnce() -> ConnectorResult<T> + Send + 'static,
    {
        let deadline = Instant::now() + self.batch_timeout;
        let tasks: Vec<_> = jobs
            .into_iter()
            .map(|(id, job)| (id, self.runtime.spawn_blocking(job)))
            .collect();

        let mut results = HashMap::with_capacity(tasks.len());
        for (id, task) in tasks {
            match timeout_at(deadline, task).await {
                Ok(Ok(Ok(value))) => {
                    results.insert(id, value);
                }
                Ok(Ok(Err(e))) => error!("failed to {operation} attribute {id}: {e}"),
                Ok(Err(e)) if e.is_cancelled() => {
                    return Err(ConnectorError::Interrupted(format!(
                        "{operation} of attribute {id} was cancelled"
                    )));
                }
                Ok(Err(e)) => error!("{operation} of attribute {id} panicked: {e}"),
                Err(_) => error!(
                    "{operation} of attribute {id} did not complete within {:?}",
                    self.batch_timeout
                ),
            }
        }
        Ok(results)
    }
}

impl AttributeResolver for AttributeRepository {
    /// Only event-driven attributes can be used as a source, which rules out
    /// chains of derived attributes and therefore cycles.
    fn resolve_value(&self, requester: &str, name: &str) -> ConnectorResult<Value> {
        let source = self
            .get(name)
            .ok_or_else(|| ConnectorError::AttributeNotFound(name.to_string()))?;
        if !source.is_notification_enabled() {
            return Err(ConnectorError::InvalidSource {
                attribute: requester.to_string(),
                source_name: name.to_string(),
            });
        }
        source.read(self)
    }
}
