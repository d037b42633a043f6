//! Phone and progress feed pollers.
//!
//! Pollers keep running while a dialog is open; they stop when monitoring
//! is disabled, the gate stops, or the stop switch fires.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, select, tick};
use sentinel_contract::{parse_phone_feed, parse_progress_feed};
use sentinel_transport::{MonitoringTransport, SessionQuery};
use sentinel_ui::Stage;
use tracing::{debug, warn};

use crate::aggregator::Input;
use crate::pause::ScheduleGate;
use crate::runtime::Signal;

/// Which feed a poller reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedKind {
    /// `/phone-warnings`.
    Phone,
    /// `/event-progress`.
    Progress,
}

impl FeedKind {
    /// Label used in logs, thread names and failure signals.
    pub fn label(self) -> &'static str {
        match self {
            Self::Phone => "phone_feed",
            Self::Progress => "progress_feed",
        }
    }
}

/// Polls one feed once and converts the outcome into a signal.
pub fn poll_once(
    kind: FeedKind,
    transport: &dyn MonitoringTransport,
    query: &SessionQuery,
) -> Signal {
    let outcome = match kind {
        FeedKind::Phone => transport
            .fetch_phone_warnings(query)
            .map_err(|error| error.to_string())
            .and_then(|raw| {
                parse_phone_feed(&raw)
                    .map(Input::PhoneFeed)
                    .map_err(|error| error.to_string())
            }),
        FeedKind::Progress => transport
            .fetch_event_progress(query)
            .map_err(|error| error.to_string())
            .and_then(|raw| {
                parse_progress_feed(&raw)
                    .map(Input::Progress)
                    .map_err(|error| error.to_string())
            }),
    };

    match outcome {
        Ok(input) => Signal::Input(input),
        Err(detail) => {
            warn!(stage = kind.label(), action = "poll_failed", %detail);
            Signal::Input(Input::TransientFailure {
                stage: Stage::Feeds,
                step: kind.label(),
                detail,
            })
        }
    }
}

/// Shared handles a poller thread needs.
pub(crate) struct PollerContext {
    pub(crate) transport: Arc<dyn MonitoringTransport>,
    pub(crate) query: SessionQuery,
    pub(crate) gate: Arc<ScheduleGate>,
    pub(crate) bus: Sender<Signal>,
    pub(crate) stop: Receiver<()>,
}

/// Spawns a named poller thread.
pub(crate) fn spawn_poller(
    kind: FeedKind,
    period: Duration,
    context: PollerContext,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("sentinel-{}", kind.label()))
        .spawn(move || run_poller(kind, period, context))
}

fn run_poller(kind: FeedKind, period: Duration, context: PollerContext) {
    let ticker = tick(period);
    debug!(stage = kind.label(), action = "start", period_ms = period.as_millis() as u64);

    loop {
        select! {
            recv(context.stop) -> _ => break,
            recv(ticker) -> _ => {
                if context.gate.is_stopped() {
                    break;
                }
                if !context.gate.polling_allowed() {
                    continue;
                }
                let signal = poll_once(kind, context.transport.as_ref(), &context.query);
                if context.bus.send(signal).is_err() {
                    break;
                }
            }
        }
    }

    debug!(stage = kind.label(), action = "stop");
}
