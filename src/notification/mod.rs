//! Event categories and their subscribers
//!
//! The event repository turns internal events into notifications: every
//! connected category watches one physical event type, re-types matching
//! events to the category id and hands them to the registered listeners.

pub mod category;
pub mod repository;

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures::future::join_all;
use tokio::runtime::Handle;
use tracing::{error, warn};

use crate::event::Event;

pub use category::{CategoryKind, EventCategory};
pub use repository::EventRepository;

/// Receiver of notifications emitted by a connector
pub trait NotificationListener: Send + Sync {
    fn handle_notification(&self, event: &Event) -> anyhow::Result<()>;
}

impl<F> NotificationListener for F
where
    F: Fn(&Event) -> anyhow::Result<()> + Send + Sync,
{
    fn handle_notification(&self, event: &Event) -> anyhow::Result<()> {
        self(event)
    }
}

/// Handle returned by `add_listener`, used to remove the listener again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub(crate) u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

#[derive(Clone)]
pub(crate) struct Subscription {
    pub(crate) id: ListenerId,
    pub(crate) listener: Arc<dyn NotificationListener>,
}

/// How a notification is delivered to the listeners
#[derive(Debug, Clone)]
pub enum ListenerInvoker {
    /// One listener after the other on the dispatching task
    Sequential,

    /// One blocking task per listener on the given runtime
    Parallel(Handle),
}

impl ListenerInvoker {
    /// Deliver `event` to every subscription; errors are logged per listener
    pub(crate) async fn invoke(&self, subscriptions: &[Subscription], event: Arc<Event>) {
        match self {
            ListenerInvoker::Sequential => {
                for subscription in subscriptions {
                    let listener = &subscription.listener;
                    let outcome =
                        panic::catch_unwind(AssertUnwindSafe(|| listener.handle_notification(&event)));
                    match outcome {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => warn!(
                            "{} failed to handle {} #{}: {e:#}",
                            subscription.id, event.event_type, event.sequence_number
                        ),
                        Err(_) => error!(
                            "{} panicked while handling {}",
                            subscription.id, event.event_type
                        ),
                    }
                }
            }
            ListenerInvoker::Parallel(runtime) => {
                let tasks = subscriptions.iter().map(|subscription| {
                    let listener = subscription.listener.clone();
                    let event = event.clone();
                    let id = subscription.id;
                    let task = runtime.spawn_blocking(move || listener.handle_notification(&event));
                    async move { (id, task.await) }
                });

                for (id, outcome) in join_all(tasks).await {
                    match outcome {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => warn!(
                            "{id} failed to handle {} #{}: {e:#}",
                            event.event_type, event.sequence_number
                        ),
                        Err(e) => error!("{id} panicked while handling {}: {e}", event.event_type),
                    }
                }
            }
        }
    }
}
