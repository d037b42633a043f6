//! Integration tests for environment-driven configuration.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use sentinel_app::config::{
    ENV_BASE_URL, ENV_CAPTURE_INTERVAL_MS, ENV_MONITORING_ENABLED, ENV_POLICY_FILE,
    ENV_TAB_SWITCH_COOLDOWN_MS,
};
use sentinel_app::{ConfigError, CounterMode, MonitorConfig};

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

fn policy_file(name: &str, body: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "sentinel-policy-{}-{name}.json",
        std::process::id()
    ));
    fs::write(&path, body).expect("policy file should be writable");
    path
}

#[test]
fn config_env_tests_unset_environment_keeps_defaults() {
    let config = MonitorConfig::from_lookup(|_| None).expect("defaults are valid");
    assert_eq!(config, MonitorConfig::default());
    assert_eq!(config.capture_config().expect("valid").interval_ms, 2_000);
}

#[test]
fn config_env_tests_reads_overrides() {
    let config = MonitorConfig::from_lookup(lookup_from(&[
        (ENV_MONITORING_ENABLED, "0"),
        (ENV_BASE_URL, "https://proctor.example.test"),
        (ENV_CAPTURE_INTERVAL_MS, "500"),
        (ENV_TAB_SWITCH_COOLDOWN_MS, "0"),
    ]))
    .expect("overrides are valid");

    assert!(!config.monitoring_enabled);
    assert_eq!(config.capture_interval_ms, 500);
    assert_eq!(config.tab_switch_cooldown_ms, 0);
    assert!(config.endpoints().expect("https").is_some());
}

#[test]
fn config_env_tests_rejects_bad_numbers_and_zero_periods() {
    assert!(matches!(
        MonitorConfig::from_lookup(lookup_from(&[(ENV_CAPTURE_INTERVAL_MS, "soon")])),
        Err(ConfigError::InvalidNumber { key, .. }) if key == ENV_CAPTURE_INTERVAL_MS
    ));
    assert!(matches!(
        MonitorConfig::from_lookup(lookup_from(&[(ENV_CAPTURE_INTERVAL_MS, "0")])),
        Err(ConfigError::ZeroPeriod(key)) if key == ENV_CAPTURE_INTERVAL_MS
    ));
}

#[test]
fn config_env_tests_loads_partial_policy_file() {
    let path = policy_file("partial", r#"{"counter_mode":"shared","tab_switch_limit":5}"#);
    let config = MonitorConfig::from_lookup(lookup_from(&[(
        ENV_POLICY_FILE,
        path.to_str().expect("utf-8 temp path"),
    )]))
    .expect("policy file is valid");
    let _ = fs::remove_file(&path);

    assert_eq!(config.policy.counter_mode, CounterMode::Shared);
    assert_eq!(config.policy.tab_switch_limit, 5);
    assert_eq!(config.policy.phone_limit, 3);
}

#[test]
fn config_env_tests_rejects_zero_limit_policy() {
    let path = policy_file("zero", r#"{"phone_limit":0}"#);
    let result = MonitorConfig::from_lookup(lookup_from(&[(
        ENV_POLICY_FILE,
        path.to_str().expect("utf-8 temp path"),
    )]));
    let _ = fs::remove_file(&path);

    assert!(matches!(
        result,
        Err(ConfigError::Policy { detail, .. }) if detail.contains("phone_limit")
    ));
}

#[test]
fn config_env_tests_missing_policy_file_is_an_error() {
    let result = MonitorConfig::from_lookup(lookup_from(&[(
        ENV_POLICY_FILE,
        "/nonexistent/sentinel-policy.json",
    )]));
    assert!(matches!(result, Err(ConfigError::Policy { .. })));
}
