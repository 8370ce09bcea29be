//! Cluster-wide replication of attribute state
//!
//! ## Architecture
//!
//! Every node runs a [`SynchronizerHandle`] per connector. On each round the
//! synchronizer walks the replicable attributes of the repository:
//!
//! - **Locally modified** since the last round: the snapshot is published to the
//!   [`ClusterStore`], which assigns it a new version
//! - **Unchanged**: the latest snapshot is fetched and loaded if it came from
//!   another node and carries a version not seen before
//!
//! The last published snapshot wins. There is no merging of concurrent updates.

pub mod error;
pub mod memory;
pub mod messages;
pub mod synchronizer;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryClusterStore;
pub use messages::{SyncCommand, SyncReport};
pub use synchronizer::{SynchronizationActor, SynchronizerHandle};

/// Captured attribute state as exchanged between nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Node that took the snapshot
    pub origin: String,
    pub taken_at: DateTime<Utc>,
    pub state: serde_json::Value,
}

/// A snapshot together with the version the store assigned to it
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedSnapshot {
    pub version: u64,
    pub snapshot: Snapshot,
}

/// Shared key-value substrate holding the latest snapshot per attribute
///
/// Versions are assigned by the store and strictly increase per
/// `(resource, attribute)` key.
#[async_trait]
pub trait ClusterStore: Send + Sync {
    /// Store `snapshot` as the latest state and return its version
    async fn publish(&self, resource: &str, attribute: &str, snapshot: Snapshot)
    -> StoreResult<u64>;

    async fn fetch_latest(
        &self,
        resource: &str,
        attribute: &str,
    ) -> StoreResult<Option<VersionedSnapshot>>;
}
