//! SynchronizationActor - Periodic snapshot exchange with the cluster store
//!
//! The actor owns the bookkeeping of what it has published and loaded, so
//! attributes themselves only expose a revision counter and their snapshots.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tracing::{debug, instrument, trace, warn};

use super::messages::{SyncCommand, SyncReport};
use super::{ClusterStore, Snapshot};
use crate::attribute::{AttributeRepository, DistributedAttribute};
use crate::clock::Clock;

/// Default period between synchronization rounds
pub const DEFAULT_SYNCHRONIZATION_PERIOD: Duration = Duration::from_secs(5);

/// Shortest accepted period
const MIN_PERIOD: Duration = Duration::from_millis(10);

enum Outcome {
    Published,
    Applied,
    Unchanged,
}

pub struct SynchronizationActor {
    node_id: String,
    repository: Arc<AttributeRepository>,
    store: Arc<dyn ClusterStore>,
    clock: Arc<dyn Clock>,
    command_rx: mpsc::Receiver<SyncCommand>,
    period: Duration,

    /// Attribute revision at the last publish or load
    synchronized_revisions: HashMap<String, u64>,

    /// Newest store version published or loaded per attribute
    seen_versions: HashMap<String, u64>,
}

impl SynchronizationActor {
    pub fn new(
        node_id: impl Into<String>,
        period: Duration,
        repository: Arc<AttributeRepository>,
        store: Arc<dyn ClusterStore>,
        clock: Arc<dyn Clock>,
        command_rx: mpsc::Receiver<SyncCommand>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            repository,
            store,
            clock,
            command_rx,
            period: period.max(MIN_PERIOD),
            synchronized_revisions: HashMap::new(),
            seen_versions: HashMap::new(),
        }
    }

    fn ticker(&self) -> Interval {
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    /// Run the actor's main loop
    ///
    /// Runs until a Shutdown command is received or every handle is dropped.
    #[instrument(skip(self), fields(node = %self.node_id, resource = %self.repository.resource_name()))]
    pub async fn run(mut self) {
        debug!("starting synchronizer with period {:?}", self.period);

        let mut ticker = self.ticker();
        let mut stopped_by: Option<oneshot::Sender<()>> = None;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.synchronize().await;
                    if report != SyncReport::default() {
                        debug!(
                            "synchronized: {} published, {} applied, {} failed",
                            report.published, report.applied, report.failed
                        );
                    }
                }

                cmd = self.command_rx.recv() => {
                    let Some(cmd) = cmd else {
                        debug!("all synchronizer handles dropped, shutting down");
                        break;
                    };
                    match cmd {
                        SyncCommand::SyncNow { respond_to } => {
                            trace!("received SyncNow command");
                            let report = self.synchronize().await;
                            let _ = respond_to.send(report);
                        }

                        SyncCommand::UpdatePeriod { period } => {
                            self.period = period.max(MIN_PERIOD);
                            debug!("updating synchronization period to {:?}", self.period);
                            ticker = self.ticker();
                        }

                        SyncCommand::Shutdown { respond_to } => {
                            debug!("received shutdown command");
                            stopped_by = Some(respond_to);
                            break;
                        }
                    }
                }
            }
        }

        debug!("synchronizer stopped");
        if let Some(respond_to) = stopped_by {
            let _ = respond_to.send(());
        }
    }

    /// One round over every replicable attribute
    async fn synchronize(&mut self) -> SyncReport {
        let attributes = self.repository.distributed_attributes();

        // forget attributes that were disconnected since the last round
        self.synchronized_revisions
            .retain(|id, _| attributes.iter().any(|(connected, _)| connected == id));
        self.seen_versions
            .retain(|id, _| attributes.iter().any(|(connected, _)| connected == id));

        let mut report = SyncReport::default();
        for (id, attribute) in &attributes {
            let Some(distributed) = attribute.as_distributed() else {
                continue;
            };
            match self.synchronize_attribute(id, distributed).await {
                Ok(Outcome::Published) => report.published += 1,
                Ok(Outcome::Applied) => report.applied += 1,
                Ok(Outcome::Unchanged) => {}
                Err(e) => {
                    report.failed += 1;
                    warn!("failed to synchronize attribute {id}: {e:#}");
                }
            }
        }
        report
    }

    async fn synchronize_attribute(
        &mut self,
        id: &str,
        attribute: &dyn DistributedAttribute,
    ) -> Result<Outcome> {
        let repository = self.repository.clone();
        let resource = repository.resource_name();
        let revision = attribute.revision();

        if self.synchronized_revisions.get(id).copied().unwrap_or(0) != revision {
            let Some(state) = attribute.take_snapshot()? else {
                return Ok(Outcome::Unchanged);
            };
            let snapshot = Snapshot {
                origin: self.node_id.clone(),
                taken_at: self.clock.now(),
                state,
            };
            let version = self
                .store
                .publish(resource, id, snapshot)
                .await
                .with_context(|| format!("failed to publish snapshot of {id}"))?;

            trace!("published {id} at revision {revision} as v{version}");
            self.synchronized_revisions.insert(id.to_string(), revision);
            self.seen_versions.insert(id.to_string(), version);
            return Ok(Outcome::Published);
        }

        let Some(latest) = self
            .store
            .fetch_latest(resource, id)
            .await
            .with_context(|| format!("failed to fetch snapshot of {id}"))?
        else {
            return Ok(Outcome::Unchanged);
        };

        let seen = self.seen_versions.get(id).copied().unwrap_or(0);
        if latest.version <= seen {
            return Ok(Outcome::Unchanged);
        }
        self.seen_versions.insert(id.to_string(), latest.version);
        if latest.snapshot.origin == self.node_id {
            return Ok(Outcome::Unchanged);
        }

        let loaded_at = attribute
            .load_from_snapshot(latest.snapshot.state)
            .with_context(|| format!("failed to load snapshot v{} of {id}", latest.version))?;
        // loading is not a local change and must not be published back
        self.synchronized_revisions.insert(id.to_string(), loaded_at);
        trace!(
            "loaded {id} v{} from {}",
            latest.version,
            latest.snapshot.origin
        );
        Ok(Outcome::Applied)
    }
}

/// Handle for controlling a SynchronizationActor
#[derive(Clone)]
pub struct SynchronizerHandle {
    sender: mpsc::Sender<SyncCommand>,

    /// Node the synchronizer publishes as
    pub node_id: String,
}

impl SynchronizerHandle {
    /// Spawn a synchronizer for `repository` on `runtime`
    pub fn spawn(
        node_id: impl Into<String>,
        period: Duration,
        repository: Arc<AttributeRepository>,
        store: Arc<dyn ClusterStore>,
        clock: Arc<dyn Clock>,
        runtime: &Handle,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let node_id = node_id.into();

        let actor =
            SynchronizationActor::new(node_id.clone(), period, repository, store, clock, cmd_rx);
        runtime.spawn(actor.run());

        Self {
            sender: cmd_tx,
            node_id,
        }
    }

    /// Run a synchronization round now and wait for its report
    pub async fn sync_now(&self) -> Result<SyncReport> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SyncCommand::SyncNow { respond_to: tx })
            .await
            .context("failed to send SyncNow command")?;

        rx.await.context("failed to receive sync report")
    }

    /// Update the period between rounds
    pub async fn update_period(&self, period: Duration) -> Result<()> {
        self.sender
            .send(SyncCommand::UpdatePeriod { period })
            .await
            .context("failed to send UpdatePeriod command")?;
        Ok(())
    }

    /// Stop the synchronizer and wait until its loop has ended
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SyncCommand::Shutdown { respond_to: tx })
            .await
            .context("failed to send Shutdown command")?;

        rx.await.context("synchronizer stopped without acknowledging")
    }
}
