use super::*;

fn create_test_registry() -> Registry {
    let registry = Registry::new_custom(Some("repo".to_string()), None).unwrap();
    register_custom_metrics(&registry).unwrap();
    registry
}

#[test]
fn test_custom_registry() {
    let registry = create_test_registry();

    WRITE_BACK_TOTAL.with_label_values(&["metrics_test", "ok"]).inc();
    let metrics = registry.gather();

    let metric_names: Vec<_> = metrics.iter().map(|m| m.get_name()).collect();
    assert!(
        metric_names.contains(&"repo_mirror_write_back_total"),
        "Missing repo_mirror_write_back_total"
    );
}

#[test]
fn test_registering_twice_fails() {
    let registry = create_test_registry();

    assert!(register_custom_metrics(&registry).is_err());
}

#[test]
fn test_record_write_back_counts_outcomes() {
    let ok: crate::Result<()> = Ok(());
    let err: crate::Result<()> = Err(crate::Error::Fatal("boom".to_string()));

    record_write_back("record_test", &ok);
    record_write_back("record_test", &err);
    record_write_back("record_test", &err);

    assert_eq!(WRITE_BACK_TOTAL.with_label_values(&["record_test", "ok"]).get(), 1);
    assert_eq!(WRITE_BACK_TOTAL.with_label_values(&["record_test", "error"]).get(), 2);
}
