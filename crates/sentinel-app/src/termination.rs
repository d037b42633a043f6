//! Exactly-once termination and score auto-submission.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use sentinel_contract::ScoreSubmission;
use sentinel_core::{MonitoringSession, TerminationCause, TerminationRecord};
use sentinel_transport::ScoreClient;
use sentinel_ui::{Dialog, Presenter, Stage, StageStatus, Toast, ToastLevel};
use tracing::{info, warn};

use crate::pause::{ScheduleGate, StopSwitch};
use crate::runtime::HostPage;

/// "Already terminating" latch. The first successful [`try_begin`] wins.
///
/// [`try_begin`]: TerminationLatch::try_begin
#[derive(Debug, Default)]
pub struct TerminationLatch {
    set: AtomicBool,
}

impl TerminationLatch {
    /// Creates an unset latch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the latch; returns `true` only for the caller that set it.
    pub fn try_begin(&self) -> bool {
        self.set
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Returns `true` once set.
    pub fn is_set(&self) -> bool {
        self.set.load(Ordering::Acquire)
    }
}

/// Termination record, published once, with a wake-up for waiters.
#[derive(Debug, Default)]
pub struct RecordSlot {
    record: OnceLock<TerminationRecord>,
    published: StopSwitch,
}

impl RecordSlot {
    /// Creates an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes the record and wakes every waiter. Returns `false` when a
    /// record was already published.
    pub fn publish(&self, record: TerminationRecord) -> bool {
        let fresh = self.record.set(record).is_ok();
        self.published.fire();
        fresh
    }

    /// Published record, if any.
    pub fn get(&self) -> Option<&TerminationRecord> {
        self.record.get()
    }

    /// Blocks until a record is published or `timeout` passes.
    pub fn wait(&self, timeout: Duration) -> Option<TerminationRecord> {
        if let Some(record) = self.record.get() {
            return Some(record.clone());
        }
        // Nothing is ever sent; the channel disconnects on publish.
        let _ = self.published.receiver().recv_timeout(timeout);
        self.record.get().cloned()
    }
}

/// What [`TerminationCoordinator::conclude`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conclusion {
    /// Score that was submitted.
    pub score: u32,
    /// Whether the score reached the server.
    pub score_submitted: bool,
    /// Whether a termination notice is waiting for acknowledgement.
    pub notice_shown: bool,
}

/// Runs the termination side effects after the latch was taken.
pub struct TerminationCoordinator {
    session: MonitoringSession,
    started_at_ms: u64,
    gate: Arc<ScheduleGate>,
    stop: Arc<StopSwitch>,
    scores: ScoreClient,
    host: Arc<dyn HostPage>,
    published: Arc<RecordSlot>,
}

impl TerminationCoordinator {
    /// Creates a coordinator for one session.
    pub fn new(
        session: MonitoringSession,
        started_at_ms: u64,
        gate: Arc<ScheduleGate>,
        stop: Arc<StopSwitch>,
        scores: ScoreClient,
        host: Arc<dyn HostPage>,
        published: Arc<RecordSlot>,
    ) -> Self {
        Self {
            session,
            started_at_ms,
            gate,
            stop,
            scores,
            host,
            published,
        }
    }

    /// Stops monitoring, publishes the record, submits the score and shows
    /// the notice (violations) or leaves the test (normal endings).
    ///
    /// Score failures surface as an error toast and never block.
    pub fn conclude(
        &self,
        record: TerminationRecord,
        score_hint: Option<u32>,
        presenter: &mut dyn Presenter,
    ) -> Conclusion {
        self.gate.stop();
        self.stop.fire();

        let cause = record.cause;
        let time_taken_secs = record.terminated_at_ms.saturating_sub(self.started_at_ms) / 1_000;
        match record.to_json() {
            Ok(json) => info!(stage = "termination", action = "record", ?cause, record = %json),
            Err(error) => warn!(stage = "termination", action = "record", %error),
        }
        if !self.published.publish(record) {
            warn!(stage = "termination", action = "publish", "record already published");
        }

        let score = score_hint
            .or_else(|| self.host.current_score())
            .unwrap_or_else(|| {
                warn!(stage = "termination", action = "score", "score unavailable; submitting 0");
                0
            });
        let submission =
            ScoreSubmission::for_session(&self.session, score, cause.is_violation(), time_taken_secs);

        presenter.stage_status(Stage::Score, StageStatus::Running);
        let score_submitted = match self.scores.submit(&self.session, submission) {
            Ok(report) => {
                presenter.stage_status(Stage::Score, StageStatus::Healthy);
                info!(
                    stage = "score",
                    action = "submitted",
                    score,
                    attempts = report.attempts,
                    key = %report.idempotency_key
                );
                true
            }
            Err(error) => {
                warn!(stage = "score", action = "failed", %error);
                presenter.stage_status(Stage::Score, StageStatus::Degraded);
                presenter.toast(Toast::new(
                    ToastLevel::Error,
                    format!("Failed to submit score: {error}"),
                ));
                false
            }
        };

        let notice_shown = cause.is_violation();
        if notice_shown {
            presenter.show_dialog(Dialog::termination(notice_message(cause)));
        } else {
            self.leave();
        }

        Conclusion {
            score,
            score_submitted,
            notice_shown,
        }
    }

    /// Exits fullscreen and returns to the event page.
    pub fn leave(&self) {
        self.host.exit_fullscreen();
        self.host.navigate_to_event_page();
        info!(stage = "termination", action = "navigate");
    }
}

fn notice_message(cause: TerminationCause) -> &'static str {
    match cause {
        TerminationCause::TabSwitchLimit => {
            "Your test was terminated because you left the test window too many times."
        }
        TerminationCause::PhoneConfirmed => {
            "Your test was terminated because a mobile phone was detected."
        }
        TerminationCause::ServerFlagged | TerminationCause::WarningLimit => {
            "Your test was terminated by the proctoring system."
        }
        TerminationCause::EventEnded | TerminationCause::GameCompleted => {
            "Your test has ended."
        }
    }
}
