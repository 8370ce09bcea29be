//! In-process cluster store
//!
//! Keeps the latest snapshot per key in a map. Connectors of one process that
//! share an `Arc<InMemoryClusterStore>` behave like nodes of one cluster, which
//! is what the tests and single-node deployments rely on.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::trace;

use super::error::StoreResult;
use super::{ClusterStore, Snapshot, VersionedSnapshot};

#[derive(Default)]
pub struct InMemoryClusterStore {
    entries: RwLock<HashMap<(String, String), VersionedSnapshot>>,
}

impl InMemoryClusterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys holding a snapshot
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl ClusterStore for InMemoryClusterStore {
    async fn publish(
        &self,
        resource: &str,
        attribute: &str,
        snapshot: Snapshot,
    ) -> StoreResult<u64> {
        let mut entries = self.entries.write();
        let key = (resource.to_string(), attribute.to_string());
        let version = entries.get(&key).map_or(1, |current| current.version + 1);
        trace!("storing snapshot of {resource}/{attribute} from {} as v{version}", snapshot.origin);
        entries.insert(key, VersionedSnapshot { version, snapshot });
        Ok(version)
    }

    async fn fetch_latest(
        &self,
        resource: &str,
        attribute: &str,
    ) -> StoreResult<Option<VersionedSnapshot>> {
        let key = (resource.to_string(), attribute.to_string());
        Ok(self.entries.read().get(&key).cloned())
    }
}
