use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::{debug, error, instrument, trace};

use super::category::EventCategory;
use super::{ListenerId, ListenerInvoker, NotificationListener, Subscription};
use crate::descriptor::Descriptor;
use crate::error::{ConnectorError, ConnectorResult};
use crate::event::Event;

/// Event categories connected to one resource, plus their listeners
pub struct EventRepository {
    resource_name: String,
    invoker: ListenerInvoker,
    categories: RwLock<HashMap<String, Arc<EventCategory>>>,
    subscriptions: RwLock<Vec<Subscription>>,
    next_listener: AtomicU64,
}

impl EventRepository {
    pub fn new(resource_name: impl Into<String>, invoker: ListenerInvoker) -> Self {
        Self {
            resource_name: resource_name.into(),
            invoker,
            categories: RwLock::new(HashMap::new()),
            subscriptions: RwLock::new(Vec::new()),
            next_listener: AtomicU64::new(1),
        }
    }

    /// Connect the category `id`; an already connected id returns the existing entry
    #[instrument(skip(self, descriptor), fields(resource = %self.resource_name))]
    pub fn connect(&self, id: &str, descriptor: &Descriptor) -> ConnectorResult<Arc<EventCategory>> {
        if let Some(existing) = self.get(id) {
            trace!("category {id} already connected");
            return Ok(existing);
        }

        let category = EventCategory::from_descriptor(id, descriptor.clone())
            .inspect_err(|e| error!("failed to connect category {id}: {e}"))?;

        match self.categories.write().entry(id.to_string()) {
            Entry::Occupied(existing) => Ok(existing.get().clone()),
            Entry::Vacant(slot) => {
                debug!(
                    "connected category {id} for {} ({:?})",
                    category.event_type(),
                    category.kind()
                );
                Ok(slot.insert(Arc::new(category)).clone())
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<EventCategory>> {
        self.categories.read().get(id).cloned()
    }

    /// Category `id`, failing with `EventNotFound` when it is not connected
    pub fn require(&self, id: &str) -> ConnectorResult<Arc<EventCategory>> {
        self.get(id)
            .ok_or_else(|| ConnectorError::EventNotFound(id.to_string()))
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.categories.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.categories.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.read().is_empty()
    }

    pub fn disconnect(&self, id: &str) -> bool {
        let removed = self.categories.write().remove(id).is_some();
        if removed {
            debug!("disconnected category {id} from {}", self.resource_name);
        }
        removed
    }

    pub fn disconnect_all(&self) -> usize {
        let count = {
            let mut categories = self.categories.write();
            let count = categories.len();
            categories.clear();
            count
        };
        debug!("disconnected {count} categories from {}", self.resource_name);
        count
    }

    pub fn add_listener(&self, listener: Arc<dyn NotificationListener>) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.subscriptions.write().push(Subscription { id, listener });
        debug!("added {id} to {}", self.resource_name);
        id
    }

    /// Returns whether the listener was registered
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut subscriptions = self.subscriptions.write();
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);
        before != subscriptions.len()
    }

    pub fn listener_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Deliver `event` through every category that accepts it
    ///
    /// Listeners see the event re-typed to the category id. Returns the number of
    /// categories the event was delivered through.
    pub async fn dispatch(&self, event: &Event) -> usize {
        let matching: Vec<Arc<EventCategory>> = self
            .categories
            .read()
            .values()
            .filter(|category| category.accepts(event))
            .cloned()
            .collect();
        if matching.is_empty() {
            return 0;
        }

        // listeners may come and go while the notification is delivered
        let subscriptions: Vec<Subscription> = self.subscriptions.read().clone();

        for category in &matching {
            trace!(
                "delivering {} #{} as {}",
                event.event_type,
                event.sequence_number,
                category.id()
            );
            if !subscriptions.is_empty() {
                let notification = Arc::new(event.retyped(category.id()));
                self.invoker.invoke(&subscriptions, notification).await;
            }
        }
        matching.len()
    }
}
