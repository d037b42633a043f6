//! Violation aggregator and warning state machine.
//!
//! [`Aggregator::apply`] is the only transition function. The runtime feeds
//! it from one single-consumer channel, so each transition (count
//! increment, dialog open, pause) is atomic relative to every other input.
//! It returns [`Effect`]s instead of touching the gate, presenter or host.
//!
//! Phases: `Idle -> Warning1 -> Warning2 -> Terminated`, with a direct jump
//! to `Terminated` for fatal inputs.

use std::sync::Arc;

use sentinel_contract::{PhoneFeed, ProgressFeed, Verdict, verdict_events};
use sentinel_core::{
    TerminationCause, TerminationRecord, ViolationCategory, ViolationEvent, ViolationSource,
    WarningState,
};
use sentinel_ui::{
    Dialog, DialogKind, Stage, StageStatus, TITLE_PHONE, TITLE_PROCTORING, TITLE_TAB_SWITCH,
    Toast, ToastLevel,
};
use tracing::{debug, info};

use crate::policy::{CategoryCounters, CounterKey, CounterMode, ViolationPolicy};
use crate::termination::TerminationLatch;

/// Why the session finished without a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// Event end time passed.
    EventEnded,
    /// Game reported completion with its final score.
    GameCompleted {
        /// Final score.
        score: u32,
    },
}

/// Aggregator input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Violation from local listeners or the capture agent.
    Violation(ViolationEvent),
    /// Current-epoch capture verdict.
    Verdict(Verdict),
    /// Phone feed snapshot.
    PhoneFeed(PhoneFeed),
    /// Progress feed snapshot.
    Progress(ProgressFeed),
    /// Learner acknowledged the open dialog.
    Acknowledge,
    /// Fullscreen entered (`true`) or left.
    FullscreenChanged(bool),
    /// Network or decode failure that leaves monitoring running.
    TransientFailure {
        /// Indicator the failure degrades.
        stage: Stage,
        /// Step that failed, for logs.
        step: &'static str,
        /// Failure detail.
        detail: String,
    },
    /// Normal end of the session.
    Finish(FinishReason),
    /// Session teardown.
    Shutdown,
}

/// Side effect requested by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Pause capture and submission.
    Pause,
    /// Resume capture and submission.
    Resume,
    /// Show a blocking dialog.
    ShowDialog(Dialog),
    /// Close the open dialog.
    CloseDialog,
    /// Show a toast.
    Toast(Toast),
    /// Show or hide the fullscreen prompt.
    FullscreenPrompt(bool),
    /// Update a stage indicator.
    StageStatus(Stage, StageStatus),
    /// Forward the fullscreen state to the schedule gate.
    SetFullscreen(bool),
    /// Pause or resume the hosted game.
    SetGamePaused(bool),
    /// Run the termination coordinator.
    Terminate {
        /// Snapshot taken at termination.
        record: TerminationRecord,
        /// Score reported by the game, when known.
        score_hint: Option<u32>,
    },
    /// Exit fullscreen and return to the event page.
    ExitAndNavigate,
    /// Stop every worker.
    Teardown,
}

/// Warning state machine for one session.
#[derive(Debug)]
pub struct Aggregator {
    policy: ViolationPolicy,
    tab_switch_cooldown_ms: u64,
    latch: Arc<TerminationLatch>,
    monitoring: bool,
    warning: WarningState,
    dialog: Option<DialogKind>,
    history: Vec<String>,
    counters: CategoryCounters,
    last_tab_switch_ms: Option<u64>,
    phone_seen: u32,
    door_notice_shown: bool,
    phone_confirmation_shown: bool,
    fullscreen: bool,
    record: Option<TerminationRecord>,
    navigated: bool,
    capture_degraded: bool,
    feeds_degraded: bool,
}

impl Aggregator {
    /// Creates an idle aggregator.
    pub fn new(
        policy: ViolationPolicy,
        tab_switch_cooldown_ms: u64,
        latch: Arc<TerminationLatch>,
    ) -> Self {
        Self {
            policy,
            tab_switch_cooldown_ms,
            latch,
            monitoring: true,
            warning: WarningState::default(),
            dialog: None,
            history: Vec::new(),
            counters: CategoryCounters::default(),
            last_tab_switch_ms: None,
            phone_seen: 0,
            door_notice_shown: false,
            phone_confirmation_shown: false,
            fullscreen: true,
            record: None,
            navigated: false,
            capture_degraded: false,
            feeds_degraded: false,
        }
    }

    /// Turns violation enforcement on or off.
    ///
    /// With monitoring off only acknowledgements, finishes and shutdown are
    /// handled; violations, verdicts, feed snapshots and fullscreen changes
    /// are discarded so the game runs ungated.
    pub fn with_monitoring(mut self, enabled: bool) -> Self {
        self.monitoring = enabled;
        self
    }

    /// Returns `false` when violation enforcement is off.
    pub fn monitoring(&self) -> bool {
        self.monitoring
    }

    /// Warning projection.
    pub fn warning(&self) -> &WarningState {
        &self.warning
    }

    /// Ordered violation history.
    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// Per-key counters.
    pub fn counters(&self) -> CategoryCounters {
        self.counters
    }

    /// Kind of the open dialog.
    pub fn dialog_kind(&self) -> Option<DialogKind> {
        self.dialog
    }

    /// Termination record, once terminated.
    pub fn record(&self) -> Option<&TerminationRecord> {
        self.record.as_ref()
    }

    /// Returns `true` once terminated or shut down.
    pub fn is_over(&self) -> bool {
        self.record.is_some() || self.latch.is_set()
    }

    /// Applies one input and returns the effects to execute, in order.
    pub fn apply(&mut self, input: Input, now_ms: u64) -> Vec<Effect> {
        let mut effects = Vec::new();

        if self.record.is_some() {
            match input {
                Input::Acknowledge => self.acknowledge_termination(&mut effects),
                Input::Shutdown => effects.push(Effect::Teardown),
                other => debug!(stage = "aggregator", action = "discard", input = ?other),
            }
            return effects;
        }
        if self.latch.is_set() {
            match input {
                Input::Shutdown => effects.push(Effect::Teardown),
                other => debug!(stage = "aggregator", action = "discard", input = ?other),
            }
            return effects;
        }
        if !self.monitoring && Self::is_monitoring_input(&input) {
            debug!(stage = "aggregator", action = "monitoring_off", input = ?input);
            return effects;
        }

        match input {
            Input::Violation(event) => self.on_violation(event, &mut effects),
            Input::Verdict(verdict) => {
                self.mark_healthy(Stage::Capture, &mut effects);
                self.on_verdict(&verdict, now_ms, &mut effects);
            }
            Input::PhoneFeed(feed) => {
                self.mark_healthy(Stage::Feeds, &mut effects);
                self.on_phone_feed(&feed, now_ms, &mut effects);
            }
            Input::Progress(feed) => {
                self.mark_healthy(Stage::Feeds, &mut effects);
                self.on_progress(&feed, now_ms, &mut effects);
            }
            Input::Acknowledge => self.on_acknowledge(now_ms, &mut effects),
            Input::FullscreenChanged(active) => self.on_fullscreen(active, now_ms, &mut effects),
            Input::TransientFailure {
                stage,
                step,
                detail,
            } => {
                debug!(stage = step, indicator = ?stage, %detail, "transient failure");
                self.mark_degraded(stage, &mut effects);
                effects.push(Effect::Toast(Toast::new(
                    ToastLevel::Warning,
                    "Connection problem. Monitoring continues.",
                )));
            }
            Input::Finish(FinishReason::EventEnded) => {
                self.terminate(TerminationCause::EventEnded, None, now_ms, &mut effects);
            }
            Input::Finish(FinishReason::GameCompleted { score }) => {
                self.terminate(TerminationCause::GameCompleted, Some(score), now_ms, &mut effects);
            }
            Input::Shutdown => {
                self.latch.try_begin();
                effects.push(Effect::Teardown);
            }
        }

        effects
    }

    fn is_monitoring_input(input: &Input) -> bool {
        matches!(
            input,
            Input::Violation(_)
                | Input::Verdict(_)
                | Input::PhoneFeed(_)
                | Input::Progress(_)
                | Input::FullscreenChanged(_)
                | Input::TransientFailure { .. }
        )
    }

    fn degraded_flag(&mut self, stage: Stage) -> &mut bool {
        match stage {
            Stage::Feeds => &mut self.feeds_degraded,
            Stage::Capture | Stage::Score => &mut self.capture_degraded,
        }
    }

    fn mark_degraded(&mut self, stage: Stage, effects: &mut Vec<Effect>) {
        let degraded = self.degraded_flag(stage);
        if !*degraded {
            *degraded = true;
            effects.push(Effect::StageStatus(stage, StageStatus::Degraded));
        }
    }

    fn mark_healthy(&mut self, stage: Stage, effects: &mut Vec<Effect>) {
        let degraded = self.degraded_flag(stage);
        if *degraded {
            *degraded = false;
            effects.push(Effect::StageStatus(stage, StageStatus::Healthy));
        }
    }

    fn on_violation(&mut self, event: ViolationEvent, effects: &mut Vec<Effect>) {
        if event.category == ViolationCategory::TabSwitch && event.source == ViolationSource::Local
        {
            self.on_tab_switch(event, effects);
        } else if event.is_dialog_worthy() {
            let key = CounterKey::for_event(&event);
            let title = match key {
                CounterKey::TabSwitch => TITLE_TAB_SWITCH,
                CounterKey::Phone => TITLE_PHONE,
                CounterKey::Server => TITLE_PROCTORING,
            };
            self.raise_warning(event, key, title, None, effects);
        } else {
            self.history.push(event.history_line());
            effects.push(Effect::Toast(Toast::new(ToastLevel::Warning, event.message)));
        }
    }

    fn on_tab_switch(&mut self, event: ViolationEvent, effects: &mut Vec<Effect>) {
        let within_cooldown = self
            .last_tab_switch_ms
            .is_some_and(|last| event.detected_at_ms.saturating_sub(last) < self.tab_switch_cooldown_ms);
        if within_cooldown {
            debug!(stage = "aggregator", action = "debounce", at = event.detected_at_ms);
            return;
        }
        if !self.warning.dialog_open {
            self.last_tab_switch_ms = Some(event.detected_at_ms);
        }
        self.raise_warning(event, CounterKey::TabSwitch, TITLE_TAB_SWITCH, None, effects);
    }

    fn on_verdict(&mut self, verdict: &Verdict, now_ms: u64, effects: &mut Vec<Effect>) {
        if verdict.is_terminated {
            self.terminate(TerminationCause::ServerFlagged, None, now_ms, effects);
            return;
        }
        if self.warning.dialog_open {
            debug!(stage = "aggregator", action = "discard_verdict", "dialog open");
            return;
        }

        for event in verdict_events(verdict, now_ms) {
            if self.is_over() {
                return;
            }
            if event.server_flagged {
                let key = CounterKey::Server;
                let title = match event.category {
                    ViolationCategory::PhoneViolation => TITLE_PHONE,
                    _ => TITLE_PROCTORING,
                };
                self.raise_warning(event, key, title, Some(verdict.warning_count), effects);
            } else {
                self.history.push(event.history_line());
                effects.push(Effect::Toast(Toast::new(ToastLevel::Warning, event.message)));
            }
        }
    }

    fn on_phone_feed(&mut self, feed: &PhoneFeed, now_ms: u64, effects: &mut Vec<Effect>) {
        if feed.door_popup && !self.door_notice_shown {
            self.door_notice_shown = true;
            let message = feed
                .door_message
                .clone()
                .unwrap_or_else(|| "Please follow the proctor's instructions.".to_string());
            let notice = ViolationEvent::new(
                ViolationCategory::PhoneNotice,
                message.clone(),
                now_ms,
                ViolationSource::PhoneFeed,
            );
            self.history.push(notice.history_line());
            effects.push(Effect::Toast(Toast::new(ToastLevel::Info, message)));
        }

        if !feed.is_violating() {
            return;
        }

        let message = feed
            .warning
            .clone()
            .unwrap_or_else(|| "A mobile phone was detected near you.".to_string());

        if feed.warning_count >= self.policy.phone_limit {
            if self.phone_confirmation_shown {
                return;
            }
            self.phone_confirmation_shown = true;
            let event = ViolationEvent::new(
                ViolationCategory::PhoneViolation,
                message.clone(),
                now_ms,
                ViolationSource::PhoneFeed,
            );
            self.history.push(event.history_line());
            self.counters.adopt(CounterKey::Phone, feed.warning_count);
            self.warning.last_category = Some(ViolationCategory::PhoneViolation);
            self.open_dialog(Dialog::phone_confirmation(message), effects);
            return;
        }

        if feed.warning_count > self.phone_seen && !self.warning.dialog_open {
            self.phone_seen = feed.warning_count;
            let event = ViolationEvent::new(
                ViolationCategory::PhoneViolation,
                message,
                now_ms,
                ViolationSource::PhoneFeed,
            );
            self.raise_warning(
                event,
                CounterKey::Phone,
                TITLE_PHONE,
                Some(feed.warning_count),
                effects,
            );
        }
    }

    fn on_progress(&mut self, feed: &ProgressFeed, now_ms: u64, effects: &mut Vec<Effect>) {
        if feed.is_terminated() {
            self.terminate(TerminationCause::ServerFlagged, None, now_ms, effects);
            return;
        }
        // The feed reports the server's own count, so compare it with the
        // server counter only; local tab switches live on another scale.
        if feed.warning_count <= self.counters.get(CounterKey::Server) {
            return;
        }

        let event = ViolationEvent::new(
            ViolationCategory::FocusLoss,
            "The proctor issued a warning for this session.",
            now_ms,
            ViolationSource::ProgressFeed,
        )
        .server_flagged();
        if feed.warning_count >= self.policy.server_warning_limit {
            self.history.push(event.history_line());
            self.counters.adopt(CounterKey::Server, feed.warning_count);
            self.terminate(TerminationCause::WarningLimit, None, now_ms, effects);
            return;
        }
        if self.warning.dialog_open {
            return;
        }
        self.raise_warning(
            event,
            CounterKey::Server,
            TITLE_PROCTORING,
            Some(feed.warning_count),
            effects,
        );
    }

    fn on_acknowledge(&mut self, now_ms: u64, effects: &mut Vec<Effect>) {
        match self.dialog {
            Some(DialogKind::Warning) => {
                self.dialog = None;
                self.warning.dialog_open = false;
                effects.push(Effect::CloseDialog);
                effects.push(Effect::Resume);
                effects.push(Effect::SetGamePaused(!self.fullscreen));
            }
            Some(DialogKind::PhoneConfirmation) => {
                self.terminate(TerminationCause::PhoneConfirmed, None, now_ms, effects);
            }
            Some(DialogKind::Termination) | None => {
                debug!(stage = "aggregator", action = "ack_ignored");
            }
        }
    }

    fn on_fullscreen(&mut self, active: bool, now_ms: u64, effects: &mut Vec<Effect>) {
        if active == self.fullscreen {
            return;
        }
        self.fullscreen = active;
        if !active {
            let event = ViolationEvent::new(
                ViolationCategory::FullscreenExit,
                "Fullscreen mode was exited.",
                now_ms,
                ViolationSource::Local,
            );
            self.history.push(event.history_line());
        }
        effects.push(Effect::SetFullscreen(active));
        effects.push(Effect::FullscreenPrompt(!active));
        effects.push(Effect::SetGamePaused(self.warning.dialog_open || !active));
    }

    /// Counts a dialog-worthy event and either opens a warning or terminates.
    fn raise_warning(
        &mut self,
        event: ViolationEvent,
        key: CounterKey,
        title: &str,
        server_count: Option<u32>,
        effects: &mut Vec<Effect>,
    ) {
        self.history.push(event.history_line());
        if self.warning.dialog_open {
            debug!(stage = "aggregator", action = "record_only", category = %event.category);
            return;
        }

        let previous = self.counters.get(key);
        let target = server_count.map_or(previous.saturating_add(1), |reported| {
            reported.max(previous.saturating_add(1))
        });
        self.counters.adopt(key, target);
        self.warning.count = self.warning.count.saturating_add(target - previous);
        self.warning.last_category = Some(event.category);

        let counted = match self.policy.counter_mode {
            CounterMode::PerCategory => self.counters.get(key),
            CounterMode::Shared => self.warning.count,
        };
        if counted >= self.policy.limit_for(key) {
            self.terminate(key.limit_cause(), None, event.detected_at_ms, effects);
            return;
        }

        let dialog = Dialog::warning(title, event.message, counted);
        self.open_dialog(dialog, effects);
    }

    fn open_dialog(&mut self, dialog: Dialog, effects: &mut Vec<Effect>) {
        self.warning.dialog_open = true;
        self.warning.title = dialog.title.clone();
        self.warning.message = dialog.message.clone();
        self.dialog = Some(dialog.kind);
        effects.push(Effect::Pause);
        effects.push(Effect::ShowDialog(dialog));
        effects.push(Effect::SetGamePaused(true));
    }

    fn terminate(
        &mut self,
        cause: TerminationCause,
        score_hint: Option<u32>,
        now_ms: u64,
        effects: &mut Vec<Effect>,
    ) {
        if !self.latch.try_begin() {
            debug!(stage = "aggregator", action = "terminate_lost", ?cause);
            return;
        }

        info!(stage = "aggregator", action = "terminate", ?cause, count = self.warning.count);
        let record = TerminationRecord {
            violation_history: self.history.clone(),
            terminated_at_ms: now_ms,
            cause,
        };
        self.record = Some(record.clone());

        if cause.is_violation() {
            self.dialog = Some(DialogKind::Termination);
            self.warning.dialog_open = true;
            effects.push(Effect::Pause);
        } else {
            if self.dialog.take().is_some() {
                effects.push(Effect::CloseDialog);
            }
            self.warning.dialog_open = false;
            self.navigated = true;
        }
        effects.push(Effect::SetGamePaused(true));
        effects.push(Effect::Terminate { record, score_hint });
    }

    fn acknowledge_termination(&mut self, effects: &mut Vec<Effect>) {
        if self.dialog != Some(DialogKind::Termination) || self.navigated {
            return;
        }
        self.navigated = true;
        self.dialog = None;
        self.warning.dialog_open = false;
        effects.push(Effect::CloseDialog);
        effects.push(Effect::ExitAndNavigate);
    }
}
