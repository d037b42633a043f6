//! Session wiring: signal bus, worker threads and effect execution.
//!
//! One aggregator thread is the only consumer of the bus. The capture thread
//! and both feed pollers only send signals; the host sends local events
//! through [`SessionHandle`]. Effects returned by the aggregator run on the
//! aggregator thread, in order.

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, unbounded};
use sentinel_capture::{CaptureAgent, CaptureError, MediaBackend};
use sentinel_contract::Verdict;
use sentinel_core::{MonitoringSession, TerminationRecord, WarningState};
use sentinel_transport::{MonitoringTransport, ScoreClient, SessionQuery};
use sentinel_ui::{Presenter, Stage, StageStatus};
use tracing::{debug, info, warn};

use crate::aggregator::{Aggregator, Effect, FinishReason, Input};
use crate::capture_loop::{CaptureContext, spawn_capture};
use crate::config::MonitorConfig;
use crate::feeds::{FeedKind, PollerContext, spawn_poller};
use crate::listeners::{LocalEvent, translate};
use crate::pause::{ScheduleGate, StopSwitch, lock_or_recover};
use crate::termination::{RecordSlot, TerminationCoordinator, TerminationLatch};
use crate::{AppError, now_ms};

/// The page hosting the game.
pub trait HostPage: Send + Sync {
    /// Best-effort current score of the active game.
    fn current_score(&self) -> Option<u32>;

    /// Pauses or resumes the game.
    fn set_game_paused(&self, paused: bool);

    /// Leaves fullscreen.
    fn exit_fullscreen(&self);

    /// Navigates back to the event page.
    fn navigate_to_event_page(&self);
}

/// Message on the signal bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// Input for the aggregator.
    Input(Input),
    /// Capture verdict tagged with the epoch its submission was issued in.
    Verdict {
        /// Parsed verdict.
        verdict: Verdict,
        /// Gate epoch at submission time.
        epoch: u64,
    },
}

/// Collaborators injected into a session.
pub struct SessionDeps {
    /// Runtime configuration.
    pub config: MonitorConfig,
    /// Server transport.
    pub transport: Arc<dyn MonitoringTransport>,
    /// Camera/microphone backend.
    pub media: Box<dyn MediaBackend>,
    /// Hosting page.
    pub host: Arc<dyn HostPage>,
    /// Dialog/toast renderer.
    pub presenter: Box<dyn Presenter>,
}

/// Cloneable handle for host-side events.
#[derive(Clone)]
pub struct SessionHandle {
    bus: Sender<Signal>,
    latch: Arc<TerminationLatch>,
    monitoring: bool,
}

impl SessionHandle {
    /// Forwards a local event. Returns `false` when it was dropped: the
    /// session is over, monitoring is off, the key is allowed, or the bus
    /// is closed.
    pub fn dispatch_local(&self, event: LocalEvent) -> bool {
        if self.latch.is_set() || !self.monitoring {
            return false;
        }
        match translate(&event, now_ms()) {
            Some(input) => self.send(input),
            None => false,
        }
    }

    /// Acknowledges the open dialog.
    pub fn acknowledge_dialog(&self) -> bool {
        self.send(Input::Acknowledge)
    }

    /// Reports normal game completion (`onGameComplete(score)`).
    pub fn game_completed(&self, score: u32) -> bool {
        self.send(Input::Finish(FinishReason::GameCompleted { score }))
    }

    /// Reports that the event end time passed.
    pub fn event_ended(&self) -> bool {
        self.send(Input::Finish(FinishReason::EventEnded))
    }

    /// Returns `true` once termination or teardown started.
    pub fn is_terminated(&self) -> bool {
        self.latch.is_set()
    }

    fn send(&self, input: Input) -> bool {
        self.bus.send(Signal::Input(input)).is_ok()
    }
}

/// A running monitoring session.
pub struct MonitorSession {
    handle: SessionHandle,
    gate: Arc<ScheduleGate>,
    stop: Arc<StopSwitch>,
    monitoring_enabled: bool,
    record: Arc<RecordSlot>,
    warning: Arc<Mutex<WarningState>>,
    workers: Vec<JoinHandle<()>>,
    aggregator: Option<JoinHandle<()>>,
}

impl MonitorSession {
    /// Acquires media and starts the aggregator, capture and feed threads.
    ///
    /// A refused or failing media acquisition disables monitoring: no
    /// capture or feed thread starts, but finish/score handling still works.
    ///
    /// # Errors
    /// Returns [`AppError::Config`] for invalid capture configuration and
    /// [`AppError::Spawn`] when a thread cannot be started.
    pub fn start(mut session: MonitoringSession, deps: SessionDeps) -> Result<Self, AppError> {
        let SessionDeps {
            config,
            transport,
            media,
            host,
            mut presenter,
        } = deps;
        let started_at_ms = now_ms();

        let mut agent = CaptureAgent::new(media, config.capture_config()?);
        if !config.monitoring_enabled {
            info!(stage = "session", action = "kill_switch", "monitoring disabled by configuration");
            session.disable();
        } else if session.enabled {
            match agent.acquire() {
                Ok(stream) => info!(
                    stage = "session",
                    action = "media_acquired",
                    width = stream.video_width,
                    height = stream.video_height
                ),
                Err(CaptureError::PermissionDenied(reason)) => {
                    warn!(stage = "session", action = "permission_denied", %reason);
                    session.disable();
                }
                Err(error) => {
                    warn!(stage = "session", action = "media_failed", %error);
                    session.disable();
                }
            }
        }
        let monitoring_enabled = session.enabled;
        if monitoring_enabled {
            presenter.stage_status(Stage::Capture, StageStatus::Running);
            presenter.stage_status(Stage::Feeds, StageStatus::Running);
        }

        let gate = Arc::new(ScheduleGate::new(monitoring_enabled));
        let latch = Arc::new(TerminationLatch::new());
        let stop = Arc::new(StopSwitch::new());
        let record = Arc::new(RecordSlot::new());
        let warning = Arc::new(Mutex::new(WarningState::default()));
        let (bus, inbox) = unbounded();

        let coordinator = TerminationCoordinator::new(
            session.clone(),
            started_at_ms,
            Arc::clone(&gate),
            Arc::clone(&stop),
            ScoreClient::new(Arc::clone(&transport), config.score_retry),
            Arc::clone(&host),
            Arc::clone(&record),
        );
        let executor = EffectExecutor {
            gate: Arc::clone(&gate),
            stop: Arc::clone(&stop),
            host,
            presenter,
            coordinator,
        };
        let aggregator = Aggregator::new(
            config.policy,
            config.tab_switch_cooldown_ms,
            Arc::clone(&latch),
        )
        .with_monitoring(monitoring_enabled);

        let aggregator_thread = thread::Builder::new()
            .name("sentinel-aggregator".to_string())
            .spawn({
                let gate = Arc::clone(&gate);
                let warning = Arc::clone(&warning);
                move || run_aggregator(aggregator, executor, inbox, gate, warning)
            })
            .map_err(AppError::Spawn)?;

        let mut this = Self {
            handle: SessionHandle {
                bus: bus.clone(),
                latch,
                monitoring: monitoring_enabled,
            },
            gate: Arc::clone(&gate),
            stop: Arc::clone(&stop),
            monitoring_enabled,
            record,
            warning,
            workers: Vec::new(),
            aggregator: Some(aggregator_thread),
        };

        if !monitoring_enabled {
            drop(agent);
            info!(stage = "session", action = "started", monitoring = false);
            return Ok(this);
        }

        let query = SessionQuery::for_session(&session);
        for (kind, period_ms) in [
            (FeedKind::Phone, config.phone_poll_ms),
            (FeedKind::Progress, config.progress_poll_ms),
        ] {
            let poller = spawn_poller(
                kind,
                Duration::from_millis(period_ms),
                PollerContext {
                    transport: Arc::clone(&transport),
                    query: query.clone(),
                    gate: Arc::clone(&gate),
                    bus: bus.clone(),
                    stop: stop.receiver(),
                },
            )
            .map_err(AppError::Spawn)?;
            this.workers.push(poller);
        }

        let interval = Duration::from_millis(agent.config().interval_ms);
        let capture = spawn_capture(
            interval,
            CaptureContext {
                agent,
                session,
                transport,
                gate,
                bus,
                stop: stop.receiver(),
            },
        )
        .map_err(AppError::Spawn)?;
        this.workers.push(capture);

        info!(stage = "session", action = "started", monitoring = true);
        Ok(this)
    }

    /// Handle for host-side events.
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Returns `false` when monitoring was disabled (kill switch or media refusal).
    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring_enabled
    }

    /// Number of running capture and feed threads.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Termination record, once published.
    pub fn termination_record(&self) -> Option<TerminationRecord> {
        self.record.get().cloned()
    }

    /// Latest warning projection.
    pub fn warning_state(&self) -> WarningState {
        lock_or_recover(&self.warning, "warning snapshot").clone()
    }

    /// Returns `true` while capture and submission are paused.
    pub fn capture_paused(&self) -> bool {
        !self.gate.capture_allowed()
    }

    /// Blocks until the termination record is published or `timeout` passes.
    pub fn wait_for_termination(&self, timeout: Duration) -> Option<TerminationRecord> {
        self.record.wait(timeout)
    }

    /// Stops every thread and releases the media devices.
    pub fn shutdown(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        self.handle.latch.try_begin();
        let _ = self.handle.bus.send(Signal::Input(Input::Shutdown));
        self.gate.stop();
        self.stop.fire();

        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!(stage = "session", action = "join", "worker panicked");
            }
        }
        if let Some(aggregator) = self.aggregator.take() {
            if aggregator.join().is_err() {
                warn!(stage = "session", action = "join", "aggregator panicked");
            }
        }
    }
}

impl Drop for MonitorSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

struct EffectExecutor {
    gate: Arc<ScheduleGate>,
    stop: Arc<StopSwitch>,
    host: Arc<dyn HostPage>,
    presenter: Box<dyn Presenter>,
    coordinator: TerminationCoordinator,
}

impl EffectExecutor {
    /// Runs one effect; returns `false` on teardown.
    fn execute(&mut self, effect: Effect) -> bool {
        match effect {
            Effect::Pause => {
                let epoch = self.gate.pause();
                debug!(stage = "gate", action = "pause", epoch);
            }
            Effect::Resume => {
                if !self.gate.resume() {
                    debug!(stage = "gate", action = "resume_refused");
                }
            }
            Effect::ShowDialog(dialog) => self.presenter.show_dialog(dialog),
            Effect::CloseDialog => self.presenter.close_dialog(),
            Effect::Toast(toast) => self.presenter.toast(toast),
            Effect::FullscreenPrompt(visible) => self.presenter.fullscreen_prompt(visible),
            Effect::StageStatus(stage, status) => self.presenter.stage_status(stage, status),
            Effect::SetFullscreen(active) => self.gate.set_fullscreen(active),
            Effect::SetGamePaused(paused) => self.host.set_game_paused(paused),
            Effect::Terminate { record, score_hint } => {
                let conclusion =
                    self.coordinator
                        .conclude(record, score_hint, self.presenter.as_mut());
                debug!(stage = "termination", action = "concluded", ?conclusion);
            }
            Effect::ExitAndNavigate => self.coordinator.leave(),
            Effect::Teardown => {
                self.gate.stop();
                self.stop.fire();
                return false;
            }
        }
        true
    }
}

fn run_aggregator(
    mut aggregator: Aggregator,
    mut executor: EffectExecutor,
    inbox: Receiver<Signal>,
    gate: Arc<ScheduleGate>,
    warning: Arc<Mutex<WarningState>>,
) {
    for signal in inbox {
        let input = match signal {
            Signal::Input(input) => input,
            Signal::Verdict { verdict, epoch } => {
                if !gate.is_current(epoch) {
                    debug!(stage = "aggregator", action = "stale_verdict", epoch);
                    continue;
                }
                Input::Verdict(verdict)
            }
        };

        let effects = aggregator.apply(input, now_ms());
        *lock_or_recover(&warning, "warning snapshot") = aggregator.warning().clone();

        for effect in effects {
            if !executor.execute(effect) {
                info!(stage = "aggregator", action = "teardown");
                return;
            }
        }
    }
}
