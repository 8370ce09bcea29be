//! Event-driven attribute integration tests
//!
//! Measurements pushed through the connector and the values attributes
//! report afterwards.

use super::helpers::*;
use guardia_connector::ConnectorError;
use guardia_connector::event::{Event, Scalar};
use pretty_assertions::assert_eq;
use serde_json::json;

#[tokio::test]
async fn test_gauge_tracks_matching_measurements() {
    let connector = create_test_connector("web");
    connector
        .connect_attribute("latency", &descriptor(&[("gauge", "gauge64")]))
        .unwrap();

    push(&connector, integer("latency", 42)).await;
    push(&connector, integer("other", 7)).await;

    let value = connector.get_attribute("latency").unwrap();
    assert_eq!(value["last"], json!(42));
    assert_eq!(value["min"], json!(42));
    assert_eq!(value["rate"]["totalRate"], json!(1));
}

#[tokio::test]
async fn test_alternative_name_selects_measurements() {
    let connector = create_test_connector("web");
    connector
        .connect_attribute(
            "responseTime",
            &descriptor(&[("gauge", "gauge64"), ("name", "latency")]),
        )
        .unwrap();

    push(&connector, integer("latency", 10)).await;
    push(&connector, integer("responseTime", 99)).await;
    push(&connector, integer("latency", 30)).await;

    let value = connector.get_attribute("responseTime").unwrap();
    assert_eq!(value["last"], json!(30));
    assert_eq!(value["max"], json!(30));
    assert_eq!(value["mean"], json!(20.0));
}

#[tokio::test]
async fn test_filter_restricts_accepted_events() {
    let connector = create_test_connector("web");
    connector
        .connect_attribute(
            "latency",
            &descriptor(&[("gauge", "gauge64"), ("filter", "(value>=100)")]),
        )
        .unwrap();

    for value in [50, 150, 99, 300] {
        push(&connector, integer("latency", value)).await;
    }

    let value = connector.get_attribute("latency").unwrap();
    assert_eq!(value["min"], json!(150));
    assert_eq!(value["last"], json!(300));
    assert_eq!(value["rate"]["totalRate"], json!(2));
}

#[tokio::test]
async fn test_payload_type_must_match_family() {
    let connector = create_test_connector("web");
    connector
        .connect_attribute("load", &descriptor(&[("gauge", "gaugeFP")]))
        .unwrap();

    // An integer measurement never reaches a floating-point gauge
    push(&connector, integer("load", 3)).await;
    let ticket = connector
        .submit(Event::value("load", Scalar::Float(0.75)))
        .unwrap();
    complete(ticket).await;

    let value = connector.get_attribute("load").unwrap();
    assert_eq!(value["last"], json!(0.75));
    assert_eq!(value["rate"]["totalRate"], json!(1));
}

#[tokio::test]
async fn test_ranged_gauge_reports_ratios() {
    let connector = create_test_connector("web");
    connector
        .connect_attribute(
            "latency",
            &descriptor(&[("gauge", "rangedGauge64"), ("from", "100"), ("to", "200")]),
        )
        .unwrap();

    for value in [50, 120, 180, 250] {
        push(&connector, integer("latency", value)).await;
    }

    let value = connector.get_attribute("latency").unwrap();
    assert_eq!(value["lessThanRange"], json!(0.25));
    assert_eq!(value["isInRange"], json!(0.5));
    assert_eq!(value["greaterThanRange"], json!(0.25));
}

#[tokio::test]
async fn test_timer_reports_durations_in_millis() {
    let connector = create_test_connector("web");
    connector
        .connect_attribute("requests", &descriptor(&[("gauge", "timer")]))
        .unwrap();

    for millis in [250.0, 500.0, 750.0] {
        push(&connector, duration_ms("requests", millis)).await;
    }

    let value = connector.get_attribute("requests").unwrap();
    assert_eq!(value["lastDuration"], json!(750.0));
    assert_eq!(value["minDuration"], json!(250.0));
    assert_eq!(value["meanDuration"], json!(500.0));
}

#[tokio::test]
async fn test_flag_and_string_gauge() {
    let connector = create_test_connector("web");
    connector
        .connect_attribute("healthy", &descriptor(&[("gauge", "flag")]))
        .unwrap();
    connector
        .connect_attribute("version", &descriptor(&[("gauge", "stringGauge")]))
        .unwrap();

    for healthy in [true, true, false, true] {
        push(
            &connector,
            json!({"type": "boolean", "name": "healthy", "value": healthy}),
        )
        .await;
    }
    for version in ["1.2.0", "1.10.0"] {
        push(
            &connector,
            json!({"type": "string", "name": "version", "value": version}),
        )
        .await;
    }

    let healthy = connector.get_attribute("healthy").unwrap();
    assert_eq!(healthy["value"], json!(true));
    assert_eq!(healthy["ratio"], json!(0.75));

    let version = connector.get_attribute("version").unwrap();
    assert_eq!(version["last"], json!("1.10.0"));
    assert_eq!(version["max"], json!("1.2.0"));
}

#[tokio::test]
async fn test_processing_attribute_reads_metric() {
    let connector = create_test_connector("web");
    connector
        .connect_attribute("latency", &descriptor(&[("gauge", "gauge64")]))
        .unwrap();
    connector
        .connect_attribute(
            "latencySeconds",
            &descriptor(&[
                ("gauge", "extract"),
                ("source", "latency"),
                ("field", "mean"),
                ("scale", "0.5"),
            ]),
        )
        .unwrap();

    push(&connector, integer("latency", 2)).await;
    push(&connector, integer("latency", 4)).await;

    assert_eq!(connector.get_attribute("latencySeconds").unwrap(), json!(1.5));
}

#[tokio::test]
async fn test_reconnect_keeps_existing_state() {
    let connector = create_test_connector("web");
    let first = connector
        .connect_attribute("latency", &descriptor(&[("gauge", "gauge64")]))
        .unwrap();
    push(&connector, integer("latency", 5)).await;

    // Different descriptor, same id: the attribute already connected wins
    let second = connector
        .connect_attribute("latency", &descriptor(&[("gauge", "timer")]))
        .unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &second));
    assert_eq!(connector.get_attribute("latency").unwrap()["last"], json!(5));
}

#[tokio::test]
async fn test_reset_clears_statistics() {
    let connector = create_test_connector("web");
    connector
        .connect_attribute("latency", &descriptor(&[("gauge", "gauge64")]))
        .unwrap();
    push(&connector, integer("latency", 5)).await;

    connector.reset_attribute("latency").unwrap();
    let value = connector.get_attribute("latency").unwrap();
    assert_eq!(value["rate"]["totalRate"], json!(0));

    assert!(matches!(
        connector.reset_attribute("missing"),
        Err(ConnectorError::AttributeNotFound(_))
    ));
}
