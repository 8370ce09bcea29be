use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use tokio::runtime::Handle;

use super::parser::{JsonNotificationParser, NotificationParser};
use super::{Connector, InFlight, Pipeline};
use crate::attribute::{AttributeRegistry, AttributeRepository, DEFAULT_BATCH_TIMEOUT};
use crate::clock::{Clock, SystemClock};
use crate::cluster::synchronizer::DEFAULT_SYNCHRONIZATION_PERIOD;
use crate::cluster::{ClusterStore, SynchronizerHandle};
use crate::event::{LocalSequence, SequenceGenerator};
use crate::notification::{EventRepository, ListenerInvoker};

/// Assembles a [`Connector`] from its collaborators
///
/// Everything except the resource name and the runtime has a default: system
/// clock, process-wide sequence, JSON parser, standard registry, sequential
/// listener delivery and no cluster synchronization.
pub struct ConnectorBuilder {
    resource_name: String,
    runtime: Handle,
    clock: Arc<dyn Clock>,
    sequence: Arc<dyn SequenceGenerator>,
    parser: Arc<dyn NotificationParser>,
    registry: Arc<AttributeRegistry>,
    batch_timeout: Duration,
    parallel_listeners: bool,
    cluster: Option<(String, Arc<dyn ClusterStore>)>,
    synchronization_period: Duration,
}

impl ConnectorBuilder {
    pub fn new(resource_name: impl Into<String>, runtime: Handle) -> Self {
        Self {
            resource_name: resource_name.into(),
            runtime,
            clock: Arc::new(SystemClock),
            sequence: Arc::new(LocalSequence::new()),
            parser: Arc::new(JsonNotificationParser),
            registry: Arc::new(AttributeRegistry::standard()),
            batch_timeout: DEFAULT_BATCH_TIMEOUT,
            parallel_listeners: false,
            cluster: None,
            synchronization_period: DEFAULT_SYNCHRONIZATION_PERIOD,
        }
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn sequence(mut self, sequence: Arc<dyn SequenceGenerator>) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn parser(mut self, parser: Arc<dyn NotificationParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn registry(mut self, registry: Arc<AttributeRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn batch_timeout(mut self, batch_timeout: Duration) -> Self {
        self.batch_timeout = batch_timeout;
        self
    }

    /// Deliver notifications to listeners in parallel on the runtime
    pub fn parallel_listeners(mut self, parallel: bool) -> Self {
        self.parallel_listeners = parallel;
        self
    }

    /// Replicate attribute state through `store`, publishing as `node_id`
    pub fn cluster(mut self, node_id: impl Into<String>, store: Arc<dyn ClusterStore>) -> Self {
        self.cluster = Some((node_id.into(), store));
        self
    }

    pub fn synchronization_period(mut self, period: Duration) -> Self {
        self.synchronization_period = period;
        self
    }

    /// Build the connector; spawns the synchronizer when a cluster is configured
    pub fn build(self) -> Connector {
        let attributes = Arc::new(
            AttributeRepository::new(
                self.resource_name.clone(),
                self.registry,
                self.clock.clone(),
                self.runtime.clone(),
            )
            .with_batch_timeout(self.batch_timeout),
        );

        let invoker = if self.parallel_listeners {
            ListenerInvoker::Parallel(self.runtime.clone())
        } else {
            ListenerInvoker::Sequential
        };
        let events = Arc::new(EventRepository::new(self.resource_name.clone(), invoker));

        let synchronizer = self.cluster.map(|(node_id, store)| {
            SynchronizerHandle::spawn(
                node_id,
                self.synchronization_period,
                attributes.clone(),
                store,
                self.clock.clone(),
                &self.runtime,
            )
        });

        Connector {
            pipeline: Pipeline {
                resource_name: Arc::from(self.resource_name),
                attributes,
                events,
                sequence: self.sequence,
                clock: self.clock,
            },
            parser: self.parser,
            runtime: self.runtime,
            synchronizer,
            accepting: AtomicBool::new(true),
            in_flight: Arc::new(InFlight::default()),
        }
    }
}
