use rns_config::{
    load_layered_yaml_from_strings, report_unused_keys, ConfigConsumer, UnusedKeyPolicy,
};

/// scenario_unused_keys_warn_or_fail
///
/// Validates:
/// 1) Unused keys are reported in WARN without error.
/// 2) Unused keys fail in FAIL.
/// 3) Keys under consumed prefixes are never flagged.
/// 4) Offline tools do not consume daemon-only sections.

const YAML: &str = r#"
layout:
  racks: ["A"]
topology:
  tiers:
    - tier_id: "L3"
      rack: "A"
      level: 1
      channels: { 1: 14, 2: 12 }
gateway:
  base_url: "http://localhost:3000"
  legacy_flag: true
dashboard:
  theme: "dark"
"#;

#[test]
fn warn_reports_unused_keys_without_error() {
    let loaded = load_layered_yaml_from_strings(&[YAML]).unwrap();
    let report = report_unused_keys(
        ConfigConsumer::Daemon,
        &loaded.config_json,
        UnusedKeyPolicy::Warn,
    )
    .expect("warn must not error");

    assert_eq!(
        report.unused_leaf_pointers,
        vec![
            "/dashboard/theme".to_string(),
            "/gateway/legacy_flag".to_string()
        ]
    );
}

#[test]
fn fail_errors_on_unused_keys() {
    let loaded = load_layered_yaml_from_strings(&[YAML]).unwrap();
    let err = report_unused_keys(
        ConfigConsumer::Daemon,
        &loaded.config_json,
        UnusedKeyPolicy::Fail,
    )
    .unwrap_err()
    .to_string();
    assert!(err.contains("CONFIG_UNUSED_KEYS"));
    assert!(err.contains("/dashboard/theme"));
}

#[test]
fn offline_consumer_flags_daemon_sections() {
    let loaded = load_layered_yaml_from_strings(&[YAML]).unwrap();
    let report = report_unused_keys(
        ConfigConsumer::Offline,
        &loaded.config_json,
        UnusedKeyPolicy::Warn,
    )
    .unwrap();
    assert!(report
        .unused_leaf_pointers
        .contains(&"/gateway/base_url".to_string()));
    assert!(!report
        .unused_leaf_pointers
        .iter()
        .any(|p| p.starts_with("/topology")));
}

#[test]
fn clean_config_passes_fail_policy() {
    let loaded = load_layered_yaml_from_strings(&[r#"
layout:
  tiers: 3
retry:
  max_attempts: 3
"#])
    .unwrap();
    let report = report_unused_keys(
        ConfigConsumer::Daemon,
        &loaded.config_json,
        UnusedKeyPolicy::Fail,
    )
    .unwrap();
    assert!(report.is_clean());
}
