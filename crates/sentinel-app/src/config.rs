//! Environment-driven runtime configuration.
//!
//! Every `SENTINEL_*` variable is optional; unset variables keep the
//! defaults below.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use sentinel_capture::CaptureConfig;
use sentinel_transport::{DEFAULT_SCORE_PATH, Endpoints, RetryPolicy, validate_base_url};
use thiserror::Error;

use crate::policy::ViolationPolicy;

/// Monitoring kill switch.
pub const ENV_MONITORING_ENABLED: &str = "SENTINEL_MONITORING_ENABLED";
/// Server base URL.
pub const ENV_BASE_URL: &str = "SENTINEL_BASE_URL";
/// Permits `http://` base URLs (local development only).
pub const ENV_ALLOW_INSECURE_HTTP: &str = "SENTINEL_ALLOW_INSECURE_HTTP";
/// Score submission path.
pub const ENV_SCORE_PATH: &str = "SENTINEL_SCORE_PATH";
/// Capture tick interval.
pub const ENV_CAPTURE_INTERVAL_MS: &str = "SENTINEL_CAPTURE_INTERVAL_MS";
/// Phone feed polling period.
pub const ENV_PHONE_POLL_MS: &str = "SENTINEL_PHONE_POLL_MS";
/// Progress feed polling period.
pub const ENV_PROGRESS_POLL_MS: &str = "SENTINEL_PROGRESS_POLL_MS";
/// Tab-switch debounce window.
pub const ENV_TAB_SWITCH_COOLDOWN_MS: &str = "SENTINEL_TAB_SWITCH_COOLDOWN_MS";
/// HTTP request timeout.
pub const ENV_REQUEST_TIMEOUT_MS: &str = "SENTINEL_REQUEST_TIMEOUT_MS";
/// Path to a JSON [`ViolationPolicy`].
pub const ENV_POLICY_FILE: &str = "SENTINEL_POLICY_FILE";

/// Effective monitoring configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Kill switch state.
    pub monitoring_enabled: bool,
    /// Raw server base URL, when configured.
    pub base_url: Option<String>,
    /// Whether `http://` base URLs are accepted.
    pub allow_insecure_http: bool,
    /// Score submission path.
    pub score_path: String,
    /// Capture tick interval.
    pub capture_interval_ms: u64,
    /// Phone feed polling period.
    pub phone_poll_ms: u64,
    /// Progress feed polling period.
    pub progress_poll_ms: u64,
    /// Tab-switch debounce window.
    pub tab_switch_cooldown_ms: u64,
    /// HTTP request timeout.
    pub request_timeout_ms: u64,
    /// Violation thresholds.
    pub policy: ViolationPolicy,
    /// Score submission retries.
    pub score_retry: RetryPolicy,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            monitoring_enabled: true,
            base_url: None,
            allow_insecure_http: false,
            score_path: DEFAULT_SCORE_PATH.to_string(),
            capture_interval_ms: 2_000,
            phone_poll_ms: 2_000,
            progress_poll_ms: 5_000,
            tab_switch_cooldown_ms: 1_500,
            request_timeout_ms: 10_000,
            policy: ViolationPolicy::default(),
            score_retry: RetryPolicy::default(),
        }
    }
}

impl MonitorConfig {
    /// Reads configuration from the process environment.
    ///
    /// # Errors
    /// See [`MonitorConfig::from_lookup`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through `lookup`.
    ///
    /// # Errors
    /// Returns [`ConfigError`] for unparsable numbers, zero periods, or an
    /// unreadable/invalid policy file.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let policy = match lookup(ENV_POLICY_FILE) {
            Some(path) => load_policy(PathBuf::from(path))?,
            None => defaults.policy,
        };

        Ok(Self {
            monitoring_enabled: lookup(ENV_MONITORING_ENABLED)
                .map(|value| switch_enabled(&value))
                .unwrap_or(true),
            base_url: lookup(ENV_BASE_URL).filter(|value| !value.trim().is_empty()),
            allow_insecure_http: lookup(ENV_ALLOW_INSECURE_HTTP)
                .map(|value| flag_set(&value))
                .unwrap_or(false),
            score_path: lookup(ENV_SCORE_PATH).unwrap_or(defaults.score_path),
            capture_interval_ms: period(&lookup, ENV_CAPTURE_INTERVAL_MS, defaults.capture_interval_ms)?,
            phone_poll_ms: period(&lookup, ENV_PHONE_POLL_MS, defaults.phone_poll_ms)?,
            progress_poll_ms: period(&lookup, ENV_PROGRESS_POLL_MS, defaults.progress_poll_ms)?,
            tab_switch_cooldown_ms: number(
                &lookup,
                ENV_TAB_SWITCH_COOLDOWN_MS,
                defaults.tab_switch_cooldown_ms,
            )?,
            request_timeout_ms: period(&lookup, ENV_REQUEST_TIMEOUT_MS, defaults.request_timeout_ms)?,
            policy,
            score_retry: defaults.score_retry,
        })
    }

    /// Resolved server endpoints, or `None` when no base URL is configured.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidBaseUrl`] for invalid or non-HTTPS URLs.
    pub fn endpoints(&self) -> Result<Option<Endpoints>, ConfigError> {
        let Some(raw) = self.base_url.as_deref() else {
            return Ok(None);
        };
        let base = validate_base_url(raw, self.allow_insecure_http)
            .map_err(|error| ConfigError::InvalidBaseUrl(error.to_string()))?;
        Ok(Some(Endpoints::new(base, self.score_path.clone())))
    }

    /// Capture agent configuration.
    ///
    /// # Errors
    /// Returns [`ConfigError::Capture`] when the capture interval is invalid.
    pub fn capture_config(&self) -> Result<CaptureConfig, ConfigError> {
        CaptureConfig::new(self.capture_interval_ms)
            .map_err(|error| ConfigError::Capture(error.to_string()))
    }

    /// HTTP request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Kill-switch semantics: `0`, `false`, `off` (case-insensitive) disable;
/// anything else enables.
pub fn switch_enabled(value: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    !(normalized == "0" || normalized == "false" || normalized == "off")
}

fn flag_set(value: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    normalized == "1" || normalized == "true" || normalized == "on"
}

fn number(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: u64,
) -> Result<u64, ConfigError> {
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidNumber {
            key,
            value: raw.clone(),
        }),
        None => Ok(default),
    }
}

fn period(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: u64,
) -> Result<u64, ConfigError> {
    let value = number(lookup, key, default)?;
    if value == 0 {
        return Err(ConfigError::ZeroPeriod(key));
    }
    Ok(value)
}

fn load_policy(path: PathBuf) -> Result<ViolationPolicy, ConfigError> {
    let raw = fs::read_to_string(&path).map_err(|error| ConfigError::Policy {
        path: path.clone(),
        detail: error.to_string(),
    })?;
    let policy: ViolationPolicy =
        serde_json::from_str(&raw).map_err(|error| ConfigError::Policy {
            path: path.clone(),
            detail: error.to_string(),
        })?;
    if let Some(field) = policy.zero_limit() {
        return Err(ConfigError::Policy {
            path,
            detail: format!("{field} must be greater than zero"),
        });
    }
    Ok(policy)
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Variable is not an unsigned integer.
    #[error("{key} must be an unsigned integer, got {value:?}")]
    InvalidNumber {
        /// Variable name.
        key: &'static str,
        /// Raw value.
        value: String,
    },
    /// Period variable is zero.
    #[error("{0} must be greater than zero")]
    ZeroPeriod(&'static str),
    /// Policy file could not be loaded.
    #[error("policy file {path:?}: {detail}")]
    Policy {
        /// Policy file path.
        path: PathBuf,
        /// Failure detail.
        detail: String,
    },
    /// Base URL rejected.
    #[error("invalid base url: {0}")]
    InvalidBaseUrl(String),
    /// Capture configuration rejected.
    #[error("invalid capture config: {0}")]
    Capture(String),
}
