//! Cluster replication integration tests
//!
//! Two connectors for the same resource share one in-memory store and are
//! synchronized on demand.

use std::sync::Arc;
use std::time::Duration;

use super::helpers::*;
use guardia_connector::cluster::SyncReport;
use guardia_connector::{ClusterStore, Connector, InMemoryClusterStore};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::runtime::Handle;

/// Long enough that only explicit rounds run during a test
const PERIOD: Duration = Duration::from_secs(3600);

fn clustered(node: &str, store: &Arc<InMemoryClusterStore>) -> Connector {
    let store: Arc<dyn ClusterStore> = store.clone();
    let connector = Connector::builder("web", Handle::current())
        .cluster(node, store)
        .synchronization_period(PERIOD)
        .build();
    connector
        .connect_attribute("latency", &descriptor(&[("gauge", "gauge64")]))
        .unwrap();
    connector
        .connect_attribute("requests", &descriptor(&[("gauge", "timer")]))
        .unwrap();
    connector
}

async fn sync(connector: &Connector) -> SyncReport {
    connector
        .synchronizer()
        .expect("connector is clustered")
        .sync_now()
        .await
        .unwrap()
}

fn report(published: usize, applied: usize) -> SyncReport {
    SyncReport {
        published,
        applied,
        failed: 0,
    }
}

#[tokio::test]
async fn test_state_replicates_to_peer() {
    let store = Arc::new(InMemoryClusterStore::new());
    let a = clustered("node-a", &store);
    let b = clustered("node-b", &store);

    push(&a, integer("latency", 40)).await;
    push(&a, integer("latency", 42)).await;
    push(&a, duration_ms("requests", 500.0)).await;

    assert_eq!(sync(&a).await, report(2, 0));
    assert_eq!(store.len(), 2);
    assert_eq!(sync(&b).await, report(0, 2));

    let latency = b.get_attribute("latency").unwrap();
    assert_eq!(latency["last"], json!(42));
    assert_eq!(latency["min"], json!(40));
    assert_eq!(latency["rate"]["totalRate"], json!(2));
    assert_eq!(
        b.get_attribute("requests").unwrap()["lastDuration"],
        json!(500.0)
    );
}

#[tokio::test]
async fn test_applied_snapshot_is_not_published_back() {
    let store = Arc::new(InMemoryClusterStore::new());
    let a = clustered("node-a", &store);
    let b = clustered("node-b", &store);

    push(&a, integer("latency", 7)).await;
    sync(&a).await;
    sync(&b).await;

    assert_eq!(sync(&b).await, SyncReport::default());
    assert_eq!(sync(&a).await, SyncReport::default());
}

#[tokio::test]
async fn test_latest_writer_wins() {
    let store = Arc::new(InMemoryClusterStore::new());
    let a = clustered("node-a", &store);
    let b = clustered("node-b", &store);

    push(&a, integer("latency", 1)).await;
    sync(&a).await;
    sync(&b).await;

    push(&b, integer("latency", 99)).await;
    assert_eq!(sync(&b).await, report(1, 0));
    assert_eq!(sync(&a).await, report(0, 1));

    let latency = a.get_attribute("latency").unwrap();
    assert_eq!(latency["last"], json!(99));
    assert_eq!(latency["max"], json!(99));
}

#[tokio::test]
async fn test_untouched_attributes_are_not_published() {
    let store = Arc::new(InMemoryClusterStore::new());
    let a = clustered("node-a", &store);

    assert_eq!(sync(&a).await, SyncReport::default());
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_close_stops_synchronizer() {
    let store = Arc::new(InMemoryClusterStore::new());
    let a = clustered("node-a", &store);
    let synchronizer = a.synchronizer().unwrap().clone();

    a.close().await;
    assert!(synchronizer.sync_now().await.is_err());
}

#[tokio::test]
async fn test_periodic_round_publishes() {
    let store = Arc::new(InMemoryClusterStore::new());
    let store_dyn: Arc<dyn ClusterStore> = store.clone();
    let a = Connector::builder("web", Handle::current())
        .cluster("node-a", store_dyn)
        .synchronization_period(Duration::from_millis(50))
        .build();
    a.connect_attribute("latency", &descriptor(&[("gauge", "gauge64")]))
        .unwrap();

    push(&a, integer("latency", 3)).await;
    assert!(store.is_empty());

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(store.len(), 1);
}
