#![warn(missing_docs)]
//! # sentinel-ui
//!
//! ## Purpose
//! Defines the UI-facing projection of a monitoring session: the blocking
//! dialog, transient toasts, the fullscreen prompt and stage statuses.
//!
//! ## Responsibilities
//! - Describe dialogs by kind so the host can render the right actions.
//! - Expose the [`Presenter`] seam the runtime drives.
//! - Keep the UI latch (`dialog`) separate from scheduling state.
//!
//! ## Data flow
//! Aggregator effects -> runtime -> [`Presenter`] -> [`UiState`] (or a host
//! implementation) -> rendered shell.
//!
//! ## Ownership and lifetimes
//! `UiState` owns every string so presenters can be shared behind a mutex
//! without borrowing from aggregator state.
//!
//! ## Error model
//! Presentation is infallible; invalid combinations are prevented by the
//! aggregator.

use std::sync::{Arc, Mutex};

/// Title of the tab-switch warning dialog.
pub const TITLE_TAB_SWITCH: &str = "Tab Switch Detected";
/// Title of the phone warning and confirmation dialogs.
pub const TITLE_PHONE: &str = "Mobile Phone Detected";
/// Title of server-issued warning dialogs.
pub const TITLE_PROCTORING: &str = "Proctoring Warning";
/// Title of the termination notice.
pub const TITLE_TERMINATED: &str = "Test Terminated";

/// Kind of blocking dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogKind {
    /// Warning; acknowledging resumes the session.
    Warning,
    /// Phone-violation confirmation; acknowledging terminates the session.
    PhoneConfirmation,
    /// Termination notice; acknowledging leaves the test.
    Termination,
}

/// Blocking modal dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialog {
    /// Dialog kind.
    pub kind: DialogKind,
    /// Title line.
    pub title: String,
    /// Body text.
    pub message: String,
    /// Warning number shown to the learner, when relevant.
    pub warning_count: Option<u32>,
}

impl Dialog {
    /// Creates a warning dialog.
    pub fn warning(title: impl Into<String>, message: impl Into<String>, count: u32) -> Self {
        Self {
            kind: DialogKind::Warning,
            title: title.into(),
            message: message.into(),
            warning_count: Some(count),
        }
    }

    /// Creates the phone confirmation dialog.
    pub fn phone_confirmation(message: impl Into<String>) -> Self {
        Self {
            kind: DialogKind::PhoneConfirmation,
            title: TITLE_PHONE.to_string(),
            message: message.into(),
            warning_count: None,
        }
    }

    /// Creates the termination notice.
    pub fn termination(message: impl Into<String>) -> Self {
        Self {
            kind: DialogKind::Termination,
            title: TITLE_TERMINATED.to_string(),
            message: message.into(),
            warning_count: None,
        }
    }

    /// Label of the single action button.
    pub fn action_label(&self) -> &'static str {
        match self.kind {
            DialogKind::Warning => "I Understand",
            DialogKind::PhoneConfirmation => "OK",
            DialogKind::Termination => "Back to Events",
        }
    }
}

/// Toast severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    /// Informational notice.
    Info,
    /// Rule notice or transient failure.
    Warning,
    /// Failure the learner should know about.
    Error,
}

/// Non-blocking notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    /// Severity.
    pub level: ToastLevel,
    /// Text.
    pub message: String,
}

impl Toast {
    /// Creates a toast.
    pub fn new(level: ToastLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

/// Stage status used for the capture/feeds/score indicators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    /// Stage has not started.
    Idle,
    /// Stage is currently running.
    Running,
    /// Stage completed successfully.
    Healthy,
    /// Stage encountered non-fatal error.
    Degraded,
}

/// Indicator a [`StageStatus`] applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Capture and verdict submission.
    Capture,
    /// Phone and progress feeds.
    Feeds,
    /// Final score submission.
    Score,
}

/// Rendering seam driven by the runtime.
pub trait Presenter: Send {
    /// Shows a blocking dialog, replacing any open one.
    fn show_dialog(&mut self, dialog: Dialog);

    /// Closes the open dialog.
    fn close_dialog(&mut self);

    /// Shows a toast.
    fn toast(&mut self, toast: Toast);

    /// Shows or hides the "return to fullscreen" prompt.
    fn fullscreen_prompt(&mut self, visible: bool);

    /// Updates a stage indicator.
    fn stage_status(&mut self, stage: Stage, status: StageStatus);
}

/// In-memory UI projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiState {
    /// App version string sourced from root `VERSION`.
    pub version: String,
    /// Open dialog.
    pub dialog: Option<Dialog>,
    /// Toasts in display order.
    pub toasts: Vec<Toast>,
    /// Whether the fullscreen prompt is visible.
    pub fullscreen_prompt: bool,
    /// Capture stage status.
    pub capture: StageStatus,
    /// Feed polling status.
    pub feeds: StageStatus,
    /// Score submission status.
    pub score: StageStatus,
}

impl UiState {
    /// Creates default UI state.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            dialog: None,
            toasts: Vec::new(),
            fullscreen_prompt: false,
            capture: StageStatus::Idle,
            feeds: StageStatus::Idle,
            score: StageStatus::Idle,
        }
    }

    /// Returns `true` while a blocking dialog is visible.
    pub fn is_blocked(&self) -> bool {
        self.dialog.is_some()
    }

    /// Kind of the open dialog.
    pub fn dialog_kind(&self) -> Option<DialogKind> {
        self.dialog.as_ref().map(|dialog| dialog.kind)
    }

    /// Most recent toast.
    pub fn last_toast(&self) -> Option<&Toast> {
        self.toasts.last()
    }
}

impl Presenter for UiState {
    fn show_dialog(&mut self, dialog: Dialog) {
        self.dialog = Some(dialog);
    }

    fn close_dialog(&mut self) {
        self.dialog = None;
    }

    fn toast(&mut self, toast: Toast) {
        self.toasts.push(toast);
    }

    fn fullscreen_prompt(&mut self, visible: bool) {
        self.fullscreen_prompt = visible;
    }

    fn stage_status(&mut self, stage: Stage, status: StageStatus) {
        match stage {
            Stage::Capture => self.capture = status,
            Stage::Feeds => self.feeds = status,
            Stage::Score => self.score = status,
        }
    }
}

impl<P: Presenter> Presenter for Arc<Mutex<P>> {
    fn show_dialog(&mut self, dialog: Dialog) {
        with_presenter(self, |presenter| presenter.show_dialog(dialog));
    }

    fn close_dialog(&mut self) {
        with_presenter(self, |presenter| presenter.close_dialog());
    }

    fn toast(&mut self, toast: Toast) {
        with_presenter(self, |presenter| presenter.toast(toast));
    }

    fn fullscreen_prompt(&mut self, visible: bool) {
        with_presenter(self, |presenter| presenter.fullscreen_prompt(visible));
    }

    fn stage_status(&mut self, stage: Stage, status: StageStatus) {
        with_presenter(self, |presenter| presenter.stage_status(stage, status));
    }
}

fn with_presenter<P: Presenter>(shared: &Arc<Mutex<P>>, apply: impl FnOnce(&mut P)) {
    match shared.lock() {
        Ok(mut presenter) => apply(&mut presenter),
        Err(poisoned) => apply(&mut poisoned.into_inner()),
    }
}
