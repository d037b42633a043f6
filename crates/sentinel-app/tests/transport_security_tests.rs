//! Integration tests for transport security URL checks.

use sentinel_app::MonitorConfig;
use sentinel_transport::validate_base_url;

#[test]
fn transport_security_tests_rejects_non_https_endpoints() {
    let secure = validate_base_url("https://proctor.example.test", false).expect("https accepted");
    assert_eq!(secure.scheme(), "https");
    assert!(validate_base_url("http://proctor.example.test", false).is_err());
    assert!(validate_base_url("ftp://proctor.example.test", true).is_err());
}

#[test]
fn transport_security_tests_insecure_opt_in_is_explicit() {
    let mut config = MonitorConfig {
        base_url: Some("http://localhost:8080".to_string()),
        ..MonitorConfig::default()
    };
    assert!(config.endpoints().is_err());

    config.allow_insecure_http = true;
    let endpoints = config
        .endpoints()
        .expect("opt-in accepts http")
        .expect("base url is configured");
    assert_eq!(endpoints.base().scheme(), "http");
}

#[test]
fn transport_security_tests_missing_base_url_means_no_endpoints() {
    assert!(
        MonitorConfig::default()
            .endpoints()
            .expect("no url is not an error")
            .is_none()
    );
}
