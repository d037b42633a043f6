//! Structured logging setup.
//!
//! `SENTINEL_LOG=<path>` writes JSON lines to a file; otherwise a compact
//! subscriber writes to stderr. `SENTINEL_LOG_LEVEL` picks the level.

use std::env;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::OnceLock;

use tracing::Level;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// JSON log file path from `SENTINEL_LOG`.
pub fn log_path_from_env() -> Option<PathBuf> {
    env::var("SENTINEL_LOG")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
}

/// Parses a level name; unknown names fall back to `INFO`.
pub fn parse_level(raw: Option<&str>) -> Level {
    match raw.map(|value| value.trim().to_ascii_lowercase()).as_deref() {
        Some("trace") => Level::TRACE,
        Some("debug") => Level::DEBUG,
        Some("warn") | Some("warning") => Level::WARN,
        Some("error") => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Installs the global subscriber once. Later calls are no-ops.
pub fn init_tracing() {
    let _ = TRACING_INIT.get_or_init(|| {
        let level = parse_level(env::var("SENTINEL_LOG_LEVEL").ok().as_deref());

        if let Some(path) = log_path_from_env() {
            let file = match OpenOptions::new().create(true).append(true).open(&path) {
                Ok(file) => file,
                Err(_) => return,
            };
            let subscriber = tracing_subscriber::fmt()
                .json()
                .with_max_level(level)
                .with_writer(file)
                .with_current_span(false)
                .with_span_list(false)
                .finish();
            let _ = tracing::subscriber::set_global_default(subscriber);
            return;
        }

        let subscriber = tracing_subscriber::fmt()
            .compact()
            .with_max_level(level)
            .with_writer(std::io::stderr)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}
