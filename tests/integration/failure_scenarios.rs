//! Failure scenario integration tests
//!
//! Broken configuration, failing or stuck attributes, failing listeners and
//! malformed input must not take the rest of the connector down.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::helpers::*;
use assert_matches::assert_matches;
use guardia_connector::event::types;
use guardia_connector::{Connector, ConnectorError, Event, NotificationListener, Scalar};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::runtime::Handle;

#[tokio::test]
async fn test_oversized_duration_bound_is_a_configuration_error() {
    let connector = create_test_connector("web");
    let result = connector.connect_attribute(
        "slow",
        &descriptor(&[
            ("gauge", "rangedTimer"),
            ("from", "0"),
            ("to", "99999999999999999999999999"),
        ]),
    );
    assert_matches!(
        result,
        Err(ConnectorError::InvalidParameter { parameter, .. }) if parameter == "to"
    );
    assert!(connector.attributes().is_empty());
}

#[tokio::test]
async fn test_ranged_gauge_without_bound_is_rejected() {
    let connector = create_test_connector("web");
    let result = connector.connect_attribute(
        "temperature",
        &descriptor(&[("gauge", "rangedGauge64"), ("from", "0")]),
    );

    assert_matches!(
        result,
        Err(ConnectorError::MissingParameter { parameter, .. }) if parameter == "to"
    );
    assert!(!connector.attributes().contains("temperature"));
}

#[tokio::test]
async fn test_inverted_range_is_rejected() {
    let connector = create_test_connector("web");
    let result = connector.connect_attribute(
        "latency",
        &descriptor(&[("gauge", "rangedTimer"), ("from", "5s"), ("to", "1s")]),
    );
    assert_matches!(result, Err(ConnectorError::InvalidParameter { .. }));
    assert!(connector.attributes().is_empty());
}

#[tokio::test]
async fn test_unknown_gauge_and_bad_filter() {
    let connector = create_test_connector("web");
    assert_matches!(
        connector.connect_attribute("x", &descriptor(&[("gauge", "histogram")])),
        Err(ConnectorError::UnrecognizedAttributeType(_))
    );
    assert_matches!(
        connector.connect_attribute("y", &descriptor(&[("gauge", "gauge64"), ("filter", "(a=")])),
        Err(ConnectorError::InvalidFilter { .. })
    );
    assert_matches!(
        connector.connect_event("z", &descriptor(&[("filter", "((")])),
        Err(ConnectorError::InvalidFilter { .. })
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stuck_attribute_is_left_out_of_bulk_read() {
    let connector = Connector::builder("web", Handle::current())
        .batch_timeout(Duration::from_millis(100))
        .build();
    connector
        .connect_attribute("latency", &descriptor(&[("gauge", "gauge64")]))
        .unwrap();
    let blocked = BlockedAttribute::new("stuck");
    connector
        .attributes()
        .connect_instance("stuck", blocked.clone());

    let started = Instant::now();
    let values = connector.get_attributes(None).await.unwrap();
    blocked.gate.open();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(values.contains_key("latency"));
    assert!(!values.contains_key("stuck"));
}

#[tokio::test]
async fn test_bulk_read_of_named_attributes() {
    let connector = create_test_connector("web");
    for id in ["a", "b", "c"] {
        connector
            .connect_attribute(id, &descriptor(&[("gauge", "gauge64")]))
            .unwrap();
    }

    let ids = vec!["a".to_string(), "c".to_string(), "missing".to_string()];
    let values = connector.get_attributes(Some(ids.as_slice())).await.unwrap();

    let mut keys: Vec<_> = values.keys().cloned().collect();
    keys.sort();
    assert_eq!(keys, vec!["a".to_string(), "c".to_string()]);
}

#[tokio::test]
async fn test_failing_attribute_does_not_stop_others() {
    let connector = create_test_connector("web");
    connector
        .connect_attribute("load", &descriptor(&[("gauge", "gaugeFP")]))
        .unwrap();
    connector
        .connect_attribute(
            "loadLevels",
            &descriptor(&[
                ("gauge", "rangedGaugeFP"),
                ("name", "load"),
                ("from", "0"),
                ("to", "1"),
            ]),
        )
        .unwrap();
    connector
        .connect_event("changes", &descriptor(&[("name", types::ATTRIBUTE_CHANGE)]))
        .unwrap();
    let listener = RecordingListener::new();
    connector.add_listener(listener.clone());

    // Non-finite values are refused by every floating-point gauge
    complete(connector.submit(Event::value("load", Scalar::Float(f64::NAN))).unwrap()).await;
    assert!(listener.events().is_empty());

    complete(connector.submit(Event::value("load", Scalar::Float(0.5))).unwrap()).await;
    assert_eq!(listener.events().len(), 2);
    assert_eq!(connector.get_attribute("load").unwrap()["last"], json!(0.5));
}

#[tokio::test]
async fn test_panicking_attribute_is_isolated() {
    let connector = create_test_connector("web");
    connector
        .attributes()
        .connect_instance("panicking", PanickingAttribute::new());
    connector
        .connect_attribute("panicking-peer", &descriptor(&[("gauge", "gauge64"), ("name", "panicking")]))
        .unwrap();

    let ticket = connector
        .dispatch(&HashMap::new(), integer("panicking", 5).to_string().as_bytes())
        .unwrap();
    ticket.completed().await.unwrap();

    assert_eq!(
        connector.get_attribute("panicking-peer").unwrap()["last"],
        json!(5)
    );
}

struct FailingListener;

impl NotificationListener for FailingListener {
    fn handle_notification(&self, _event: &Event) -> anyhow::Result<()> {
        anyhow::bail!("listener refused the event")
    }
}

#[tokio::test]
async fn test_failing_listener_does_not_block_others() {
    let connector = create_test_connector("web");
    connector
        .connect_event(types::VALUE_MEASUREMENT, &descriptor(&[]))
        .unwrap();
    connector.add_listener(Arc::new(FailingListener));
    let listener = RecordingListener::new();
    connector.add_listener(listener.clone());

    push(&connector, integer("latency", 1)).await;
    assert_eq!(listener.events().len(), 1);
}

struct PanickingListener;

impl NotificationListener for PanickingListener {
    fn handle_notification(&self, _event: &Event) -> anyhow::Result<()> {
        panic!("listener crashed")
    }
}

#[tokio::test]
async fn test_panicking_listener_does_not_stop_the_fan_out() {
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
    connector.add_listener(Arc::new(PanickingListener));
    let listener = RecordingListener::new();
    connector.add_listener(listener.clone());

    let ticket = connector
        .dispatch(&HashMap::new(), integer("latency", 1).to_string().as_bytes())
        .unwrap();
    assert!(ticket.completed().await.is_ok());

    assert_eq!(listener.of_type("changes").len(), 1);
    assert_eq!(listener.of_type(types::VALUE_MEASUREMENT).len(), 1);
}

#[tokio::test]
async fn test_event_driven_attributes_reject_writes() {
    let connector = create_test_connector("web");
    connector
        .connect_attribute("latency", &descriptor(&[("gauge", "gauge64")]))
        .unwrap();
    connector
        .connect_attribute(
            "meanLatency",
            &descriptor(&[("gauge", "extract"), ("source", "latency"), ("field", "mean")]),
        )
        .unwrap();

    assert_matches!(
        connector.set_attribute("latency", json!(1)),
        Err(ConnectorError::CannotBeModified(id)) if id == "latency"
    );
    assert_matches!(
        connector.set_attribute("meanLatency", json!(1)),
        Err(ConnectorError::CannotBeModified(_))
    );
    assert_matches!(
        connector.set_attribute("missing", json!(1)),
        Err(ConnectorError::AttributeNotFound(_))
    );

    let applied = connector
        .set_attributes(HashMap::from([
            ("latency".to_string(), json!(1)),
            ("meanLatency".to_string(), json!(2)),
        ]))
        .await
        .unwrap();
    assert!(applied.is_empty());
}

#[tokio::test]
async fn test_processing_attribute_source_rules() {
    let connector = create_test_connector("web");
    assert!(
        connector
            .connect_attribute("self", &descriptor(&[("gauge", "extract"), ("source", "self")]))
            .is_err()
    );
    assert_matches!(
        connector.connect_attribute("derived", &descriptor(&[("gauge", "extract")])),
        Err(ConnectorError::MissingParameter { parameter, .. }) if parameter == "source"
    );

    // Reading fails while the source is not connected
    connector
        .connect_attribute("orphan", &descriptor(&[("gauge", "extract"), ("source", "latency")]))
        .unwrap();
    assert!(connector.get_attribute("orphan").is_err());

    // Another processing attribute is not a valid source
    connector
        .connect_attribute("latency", &descriptor(&[("gauge", "gauge64")]))
        .unwrap();
    connector
        .connect_attribute("chained", &descriptor(&[("gauge", "extract"), ("source", "orphan")]))
        .unwrap();
    assert_matches!(
        connector.get_attribute("chained"),
        Err(ConnectorError::InvalidSource { .. })
    );
    assert!(connector.get_attribute("orphan").is_ok());
}

#[tokio::test]
async fn test_malformed_notifications_are_dropped() {
    let connector = create_test_connector("web");
    let headers = HashMap::new();

    assert!(connector.dispatch(&headers, b"{ not json").is_none());
    assert!(connector.dispatch(&headers, b"   ").is_none());
    assert!(
        connector
            .dispatch(&headers, br#"{"type": "integer", "name": "x"}"#)
            .is_none()
    );
    assert!(
        connector
            .dispatch(&headers, br#"{"type": "duration", "name": "x", "duration": -5}"#)
            .is_none()
    );

    // The connector keeps working afterwards
    assert!(connector.dispatch(&headers, integer("x", 1).to_string().as_bytes()).is_some());
}

#[tokio::test]
async fn test_disconnected_attribute_is_closed() {
    let connector = create_test_connector("web");
    let attribute = connector
        .connect_attribute("latency", &descriptor(&[("gauge", "gauge64")]))
        .unwrap();

    assert!(connector.disconnect_attribute("latency"));
    assert!(!connector.disconnect_attribute("latency"));
    assert_matches!(
        attribute.read(connector.attributes().as_ref()),
        Err(ConnectorError::AttributeClosed(_))
    );
    assert_matches!(
        connector.get_attribute("latency"),
        Err(ConnectorError::AttributeNotFound(_))
    );
}
