//! Connector pipeline integration tests
//!
//! Stamping, fan-out order to listeners, category matching and shutdown.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::helpers::*;
use chrono::{TimeDelta, TimeZone, Utc};
use guardia_connector::connector::SOURCE_HEADER;
use guardia_connector::event::{Payload, types};
use guardia_connector::{
    Connector, ConnectorConfig, ConnectorError, Event, ManualClock, NotificationListener, Scalar,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::runtime::Handle;

#[tokio::test]
async fn test_events_are_stamped() {
    let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let clock = Arc::new(ManualClock::new(start));
    let connector = Connector::builder("web", Handle::current())
        .clock(clock.clone())
        .build();

    let first = push(&connector, integer("latency", 1)).await;
    clock.advance(TimeDelta::seconds(5));
    let second = push(&connector, integer("latency", 2)).await;

    assert_eq!(first.source, "web");
    assert_eq!(first.timestamp, start);
    assert_eq!(second.timestamp, start + TimeDelta::seconds(5));
    assert!(second.sequence_number > first.sequence_number);
}

#[tokio::test]
async fn test_source_header_names_the_emitter() {
    let connector = create_test_connector("web");
    let headers = HashMap::from([(SOURCE_HEADER.to_lowercase(), "web-7".to_string())]);

    let ticket = connector
        .dispatch(&headers, integer("latency", 1).to_string().as_bytes())
        .unwrap();
    assert_eq!(ticket.event().source, "web-7");

    // A source set by the producer is kept
    let ticket = connector
        .submit(Event::value("latency", Scalar::Integer(1)).with_source("batch-job"))
        .unwrap();
    assert_eq!(complete(ticket).await.source, "batch-job");
}

#[tokio::test]
async fn test_change_events_precede_the_measurement() {
    let connector = create_test_connector("web");
    connector
        .connect_attribute("latency", &descriptor(&[("gauge", "gauge64")]))
        .unwrap();
    connector
        .connect_event("changes", &descriptor(&[("name", types::ATTRIBUTE_CHANGE)]))
        .unwrap();
    connector
        .connect_event(types::VALUE_MEASUREMENT, &descriptor(&[]))
        .unwrap();
    let listener = RecordingListener::new();
    connector.add_listener(listener.clone());

    let measurement = push(&connector, integer("latency", 42)).await;

    let received = listener.events();
    assert_eq!(received.len(), 2);
    assert_eq!(received[0].event_type, "changes");
    assert_eq!(received[1].event_type, types::VALUE_MEASUREMENT);
    assert_eq!(received[1].sequence_number, measurement.sequence_number);
    assert_ne!(received[0].sequence_number, measurement.sequence_number);

    match &received[0].payload {
        Some(Payload::AttributeChange(change)) => {
            assert_eq!(change.attribute_name, "latency");
            assert_eq!(change.attribute_type, "gauge64");
            assert_eq!(change.new_value["last"], json!(42));
            assert_eq!(change.old_value, change.new_value);
        }
        other => panic!("unexpected payload {other:?}"),
    }
}

#[tokio::test]
async fn test_category_filter_selects_changes() {
    let connector = create_test_connector("web");
    for id in ["latency", "errors"] {
        connector
            .connect_attribute(id, &descriptor(&[("gauge", "gauge64")]))
            .unwrap();
    }
    connector
        .connect_event(
            "latencyChanges",
            &descriptor(&[
                ("name", types::ATTRIBUTE_CHANGE),
                ("filter", "(attributeName=latency)"),
            ]),
        )
        .unwrap();
    let listener = RecordingListener::new();
    connector.add_listener(listener.clone());

    push(&connector, integer("errors", 1)).await;
    push(&connector, integer("latency", 12)).await;

    let changes = listener.of_type("latencyChanges");
    assert_eq!(changes.len(), 1);
    assert_eq!(listener.events().len(), 1);
}

#[tokio::test]
async fn test_measurement_without_category_reaches_no_listener() {
    let connector = create_test_connector("web");
    let listener = RecordingListener::new();
    connector.add_listener(listener.clone());

    push(&connector, integer("latency", 1)).await;
    assert!(listener.events().is_empty());
}

#[tokio::test]
async fn test_removed_listener_is_not_notified() {
    let connector = create_test_connector("web");
    connector
        .connect_event(types::VALUE_MEASUREMENT, &descriptor(&[]))
        .unwrap();
    let kept = RecordingListener::new();
    let removed = RecordingListener::new();
    connector.add_listener(kept.clone());
    let id = connector.add_listener(removed.clone());

    push(&connector, integer("latency", 1)).await;
    assert!(connector.remove_listener(id));
    assert!(!connector.remove_listener(id));
    push(&connector, integer("latency", 2)).await;

    assert_eq!(kept.events().len(), 2);
    assert_eq!(removed.events().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_parallel_listeners_all_receive() {
    let connector = Connector::builder("web", Handle::current())
        .parallel_listeners(true)
        .build();
    connector
        .connect_event(types::VALUE_MEASUREMENT, &descriptor(&[]))
        .unwrap();
    let listeners: Vec<_> = (0..4).map(|_| RecordingListener::new()).collect();
    for listener in &listeners {
        connector.add_listener(listener.clone());
    }

    push(&connector, integer("latency", 1)).await;

    for listener in &listeners {
        assert_eq!(listener.events().len(), 1);
    }
}

#[tokio::test]
async fn test_closure_listener() {
    let connector = create_test_connector("web");
    connector
        .connect_event(types::VALUE_MEASUREMENT, &descriptor(&[]))
        .unwrap();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let listener: Arc<dyn NotificationListener> = Arc::new(move |event: &Event| -> anyhow::Result<()> {
        tx.send(event.sequence_number)?;
        Ok(())
    });
    connector.add_listener(listener);

    let event = push(&connector, integer("latency", 1)).await;
    assert_eq!(rx.recv().await, Some(event.sequence_number));
}

#[tokio::test]
async fn test_from_config_connects_valid_items() {
    let config = ConnectorConfig {
        resource: "web".into(),
        attributes: BTreeMap::from([
            ("latency".to_string(), descriptor(&[("gauge", "gauge64")])),
            ("broken".to_string(), descriptor(&[("gauge", "rangedGauge64"), ("from", "0")])),
            ("unknown".to_string(), descriptor(&[("gauge", "histogram")])),
        ]),
        events: BTreeMap::from([
            ("values".to_string(), descriptor(&[("name", types::VALUE_MEASUREMENT)])),
            ("bad".to_string(), descriptor(&[("filter", "(unclosed")])),
        ]),
        ..Default::default()
    };

    let connector = Connector::from_config(&config, Handle::current(), None).unwrap();
    assert_eq!(connector.attributes().ids(), vec!["latency".to_string()]);
    assert_eq!(connector.events().ids(), vec!["values".to_string()]);
    assert!(connector.synchronizer().is_none());
}

#[tokio::test]
async fn test_close_stops_the_connector() {
    let connector = create_test_connector("web");
    connector
        .connect_attribute("latency", &descriptor(&[("gauge", "gauge64")]))
        .unwrap();
    connector
        .connect_event(types::VALUE_MEASUREMENT, &descriptor(&[]))
        .unwrap();
    let ticket = connector
        .dispatch(&HashMap::new(), integer("latency", 1).to_string().as_bytes())
        .unwrap();

    connector.close().await;
    ticket.completed().await.unwrap();

    assert!(connector.is_closed());
    assert!(connector.attributes().is_empty());
    assert!(connector.events().is_empty());
    assert!(
        connector
            .dispatch(&HashMap::new(), integer("latency", 2).to_string().as_bytes())
            .is_none()
    );
    assert!(matches!(
        connector.submit(Event::value("latency", Scalar::Integer(3))),
        Err(ConnectorError::Closed(resource)) if resource == "web"
    ));

    // Second close is a no-op
    connector.close().await;
}
