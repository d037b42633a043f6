#![warn(missing_docs)]
//! # sentinel-app
//!
//! ## Purpose
//! Runs one exam monitoring session: capture, violation feeds, the warning
//! state machine, pause/resume and exactly-once termination.
//!
//! ## Responsibilities
//! - Wire the capture agent, transport, host page and presenter together.
//! - Merge local, verdict and feed signals on one single-consumer bus.
//! - Gate capture and submission on dialogs, fullscreen and termination.
//! - Terminate at most once and auto-submit the score.
//! - Provide env-driven configuration, the kill switch and logging setup.
//!
//! ## Data flow
//! Capture tick / feed pollers / host events -> [`runtime::Signal`] bus ->
//! [`aggregator::Aggregator::apply`] -> effects -> gate, presenter, host and
//! [`termination::TerminationCoordinator`].
//!
//! ## Ownership and lifetimes
//! The capture thread owns the [`sentinel_capture::CaptureAgent`]; the
//! aggregator thread owns the warning state and the presenter. Everything
//! else is shared through `Arc` handles and dropped on teardown.
//!
//! ## Error model
//! Startup failures are wrapped in [`AppError`]. After startup, network and
//! decode failures become toasts; only termination is fatal.

pub mod aggregator;
pub mod capture_loop;
pub mod config;
pub mod feeds;
pub mod listeners;
pub mod pause;
pub mod policy;
pub mod runtime;
pub mod telemetry;
pub mod termination;

use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

pub use aggregator::{Aggregator, Effect, FinishReason, Input};
pub use config::{ConfigError, MonitorConfig};
pub use listeners::{ClipboardAction, KeyPress, LocalEvent};
pub use pause::{ScheduleGate, StopSwitch, SubmissionPermit};
pub use policy::{CounterMode, ViolationPolicy};
pub use runtime::{HostPage, MonitorSession, SessionDeps, SessionHandle, Signal};
pub use termination::{RecordSlot, TerminationCoordinator, TerminationLatch};

/// Build-time application version loaded from root `VERSION` file.
pub const APP_VERSION: &str = env!("SENTINEL_VERSION");

/// Returns the app version sourced from root `VERSION`.
pub fn app_version() -> &'static str {
    APP_VERSION
}

/// Current Unix time in milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

/// App integration error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    /// Core model error.
    #[error("core error: {0}")]
    Core(#[from] sentinel_core::CoreError),
    /// Capture subsystem error.
    #[error("capture error: {0}")]
    Capture(#[from] sentinel_capture::CaptureError),
    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] sentinel_transport::TransportError),
    /// Worker thread could not be started.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(std::io::Error),
}
