//! Concurrency integration tests
//!
//! Many producers dispatching into one connector at the same time.

use std::collections::HashMap;
use std::sync::Arc;

use super::helpers::*;
use guardia_connector::Connector;
use guardia_connector::event::types;
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::runtime::Handle;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_dispatch_loses_no_update() {
    let connector = Arc::new(
        Connector::builder("web", Handle::current())
            .parallel_listeners(true)
            .build(),
    );
    connector
        .connect_attribute("latency", &descriptor(&[("gauge", "gauge64")]))
        .unwrap();
    connector
        .connect_event(types::VALUE_MEASUREMENT, &descriptor(&[]))
        .unwrap();
    let listener = RecordingListener::new();
    connector.add_listener(listener.clone());

    let producers: Vec<_> = (0..8)
        .map(|producer| {
            let connector = connector.clone();
            tokio::spawn(async move {
                let mut tickets = Vec::new();
                for i in 0..50 {
                    let body = integer("latency", producer * 100 + i).to_string();
                    tickets.extend(connector.dispatch(&HashMap::new(), body.as_bytes()));
                }
                tickets
            })
        })
        .collect();

    let mut sequence_numbers = Vec::new();
    for producer in producers {
        for ticket in producer.await.unwrap() {
            sequence_numbers.push(complete(ticket).await.sequence_number);
        }
    }

    sequence_numbers.sort_unstable();
    sequence_numbers.dedup();
    assert_eq!(sequence_numbers.len(), 400);

    let value = connector.get_attribute("latency").unwrap();
    assert_eq!(value["rate"]["totalRate"], json!(400));
    assert_eq!(value["min"], json!(0));
    assert_eq!(value["max"], json!(749));
    assert_eq!(listener.events().len(), 400);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_close_waits_for_running_dispatches() {
    let connector = Connector::builder("web", Handle::current()).build();
    connector
        .connect_attribute("latency", &descriptor(&[("gauge", "gauge64")]))
        .unwrap();
    connector
        .connect_event(types::VALUE_MEASUREMENT, &descriptor(&[]))
        .unwrap();
    let listener = RecordingListener::new();
    connector.add_listener(listener.clone());

    let accepted = (0..100)
        .filter_map(|i| {
            connector.dispatch(&HashMap::new(), integer("latency", i).to_string().as_bytes())
        })
        .count();
    connector.close().await;

    assert_eq!(accepted, 100);
    assert_eq!(listener.events().len(), 100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_bulk_reads_during_dispatch() {
    let connector = Arc::new(Connector::builder("web", Handle::current()).build());
    for id in ["a", "b", "c", "d"] {
        connector
            .connect_attribute(id, &descriptor(&[("gauge", "gauge64")]))
            .unwrap();
    }

    let writer = {
        let connector = connector.clone();
        tokio::spawn(async move {
            for i in 0..200 {
                let name = ["a", "b", "c", "d"][i % 4];
                if let Some(ticket) = connector
                    .dispatch(&HashMap::new(), integer(name, i as i64).to_string().as_bytes())
                {
                    complete(ticket).await;
                }
            }
        })
    };

    for _ in 0..20 {
        let values = connector.get_attributes(None).await.unwrap();
        assert_eq!(values.len(), 4);
    }
    writer.await.unwrap();

    let values = connector.get_attributes(None).await.unwrap();
    for value in values.values() {
        assert_eq!(value["rate"]["totalRate"], json!(50));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_dispatch_racing_close_is_drained() {
    let connector = Arc::new(Connector::builder("web", Handle::current()).build());
    connector
        .connect_event(types::VALUE_MEASUREMENT, &descriptor(&[]))
        .unwrap();
    let listener = RecordingListener::new();
    connector.add_listener(listener.clone());

    let producers: Vec<_> = (0..4)
        .map(|_| {
            let connector = connector.clone();
            tokio::spawn(async move {
                let mut accepted = 0usize;
                for i in 0..500 {
                    let body = integer("latency", i).to_string();
                    if connector.dispatch(&HashMap::new(), body.as_bytes()).is_some() {
                        accepted += 1;
                    }
                    tokio::task::yield_now().await;
                }
                accepted
            })
        })
        .collect();

    tokio::task::yield_now().await;
    connector.close().await;
    let delivered = listener.events().len();

    let mut accepted = 0;
    for producer in producers {
        accepted += producer.await.unwrap();
    }
    assert_eq!(delivered, accepted);
}
