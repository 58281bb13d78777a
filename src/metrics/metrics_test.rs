use super::*;

fn create_test_registry() -> Registry {
    let registry = Registry::new_custom(Some("shepherd".to_string()), None).unwrap();
    register_custom_metrics(&registry);
    registry
}

#[test]
fn test_custom_registry() {
    let registry = create_test_registry();

    INBOUND_MESSAGES.with_label_values(&["register"]).inc();
    let metrics = &registry.gather();
    assert!(!metrics.is_empty());

    let metric_names: Vec<_> = metrics.iter().map(|m| m.get_name()).collect();
    assert!(
        metric_names.contains(&"shepherd_inbound_messages"),
        "Missing shepherd_inbound_messages"
    );
}

#[test]
fn test_counter_increment() {
    BAD_MESSAGES.with_label_values(&["metrics-test"]).reset();

    BAD_MESSAGES.with_label_values(&["metrics-test"]).inc();
    BAD_MESSAGES.with_label_values(&["metrics-test"]).inc();

    let value = BAD_MESSAGES.with_label_values(&["metrics-test"]).get();
    assert_eq!(value, 2, "Counter should increment correctly");
}

#[test]
fn test_histogram_labels() {
    REQUEST_ROUND_TRIP_MS.with_label_values(&["metrics-test"]).observe(100.0);
    REQUEST_ROUND_TRIP_MS.with_label_values(&["metrics-test"]).observe(200.0);

    let histogram = REQUEST_ROUND_TRIP_MS.with_label_values(&["metrics-test"]);
    assert!(histogram.get_sample_count() >= 2);
}

#[test]
fn test_encode_contains_registered_names() {
    let registry = create_test_registry();
    STALE_RESPONSES.inc();

    let body = encode_metrics(&registry);
    assert!(body.contains("shepherd_stale_responses"));
}
