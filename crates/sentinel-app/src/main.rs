#![warn(missing_docs)]
//! # sentinel-agent binary
//!
//! Headless entry point. With `SENTINEL_BASE_URL` and `SENTINEL_DEMO_SECS`
//! set, runs one session against the server using the synthetic media
//! backend; otherwise prints the version and effective configuration.

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sentinel_app::telemetry::init_tracing;
use sentinel_app::{
    AppError, HostPage, MonitorConfig, MonitorSession, SessionDeps, app_version,
};
use sentinel_capture::SyntheticMediaBackend;
use sentinel_core::MonitoringSession;
use sentinel_transport::{Endpoints, HttpTransport};
use sentinel_ui::UiState;
use tracing::{error, info};

/// Host page that only logs what the game would be asked to do.
struct HeadlessHost {
    score: Option<u32>,
    paused: AtomicBool,
}

impl HostPage for HeadlessHost {
    fn current_score(&self) -> Option<u32> {
        self.score
    }

    fn set_game_paused(&self, paused: bool) {
        if self.paused.swap(paused, Ordering::AcqRel) != paused {
            info!(stage = "host", action = "game_paused", paused);
        }
    }

    fn exit_fullscreen(&self) {
        info!(stage = "host", action = "exit_fullscreen");
    }

    fn navigate_to_event_page(&self) {
        info!(stage = "host", action = "navigate");
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn run_demo(config: MonitorConfig, endpoints: Endpoints, seconds: u64) -> Result<(), AppError> {
    let session = MonitoringSession::new(
        env_or("SENTINEL_USER_ID", "demo-user"),
        env_or("SENTINEL_EVENT_ID", "demo-event"),
        env_or("SENTINEL_DISCIPLINE_ID", ""),
    )?;
    let transport = Arc::new(HttpTransport::new(endpoints, config.request_timeout())?);
    let host = Arc::new(HeadlessHost {
        score: std::env::var("SENTINEL_DEMO_SCORE")
            .ok()
            .and_then(|raw| raw.trim().parse().ok()),
        paused: AtomicBool::new(false),
    });
    let ui = Arc::new(Mutex::new(UiState::new(app_version())));

    let monitor = MonitorSession::start(
        session,
        SessionDeps {
            config,
            transport,
            media: Box::new(SyntheticMediaBackend::new()),
            host,
            presenter: Box::new(Arc::clone(&ui)),
        },
    )?;
    info!(
        stage = "demo",
        action = "running",
        seconds,
        monitoring = monitor.monitoring_enabled()
    );

    std::thread::sleep(Duration::from_secs(seconds));
    let handle = monitor.handle();
    if !handle.is_terminated() {
        handle.event_ended();
    }

    match monitor.wait_for_termination(Duration::from_secs(30)) {
        Some(record) => println!("{}", record.to_json()?),
        None => println!("session did not terminate"),
    }
    monitor.shutdown();
    Ok(())
}

/// CLI entry point.
fn main() -> ExitCode {
    init_tracing();
    println!("sentinel-agent {}", app_version());

    let config = match MonitorConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(stage = "startup", action = "config", error = %err);
            eprintln!("invalid configuration: {err}");
            return ExitCode::FAILURE;
        }
    };
    let endpoints = match config.endpoints() {
        Ok(endpoints) => endpoints,
        Err(err) => {
            eprintln!("invalid configuration: {err}");
            return ExitCode::FAILURE;
        }
    };
    let demo_secs = std::env::var("SENTINEL_DEMO_SECS")
        .ok()
        .and_then(|raw| raw.trim().parse::<u64>().ok());

    match (endpoints, demo_secs) {
        (Some(endpoints), Some(seconds)) => match run_demo(config, endpoints, seconds) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("session failed: {err}");
                ExitCode::FAILURE
            }
        },
        _ => {
            println!(
                "monitoring_enabled={} (SENTINEL_MONITORING_ENABLED)",
                config.monitoring_enabled
            );
            println!("{config:#?}");
            ExitCode::SUCCESS
        }
    }
}
