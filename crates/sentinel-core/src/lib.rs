#![warn(missing_docs)]
//! # sentinel-core
//!
//! ## Purpose
//! Defines the pure data model shared across the `exam-sentinel` workspace.
//!
//! ## Responsibilities
//! - Describe one monitored exam session and its identifiers.
//! - Represent violation events, their categories and their sources.
//! - Hold the warning counter/dialog projection and the termination record.
//! - Validate captured evidence frames before they leave the capture layer.
//!
//! ## Data flow
//! Capture emits [`CaptureFrame`] values; verdicts, feeds and local listeners
//! are turned into [`ViolationEvent`]s; the aggregator folds them into one
//! [`WarningState`] and, at most once, a [`TerminationRecord`].
//!
//! ## Ownership and lifetimes
//! Every type owns its buffers and strings so values can cross thread
//! boundaries through channels without borrowing from transient responses.
//!
//! ## Error model
//! Validation failures (blank identifiers, malformed frames) return
//! [`CoreError`] variants.
//!
//! ## Example
//! ```rust
//! use sentinel_core::{ViolationCategory, ViolationEvent, ViolationSource};
//!
//! let event = ViolationEvent::new(
//!     ViolationCategory::TabSwitch,
//!     "window lost focus",
//!     1_000,
//!     ViolationSource::Local,
//! );
//! assert!(event.is_dialog_worthy());
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// JPEG start-of-image marker.
pub const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];

/// One monitored exam session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoringSession {
    /// Learner identifier.
    pub user_id: String,
    /// Event (exam) identifier.
    pub event_id: String,
    /// Discipline identifier; blank when the game is scored per event.
    pub discipline_id: String,
    /// Whether monitoring is active for this session.
    pub enabled: bool,
}

impl MonitoringSession {
    /// Creates a validated, enabled session.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidIdentifier`] when `user_id` or `event_id`
    /// is blank.
    pub fn new(
        user_id: impl Into<String>,
        event_id: impl Into<String>,
        discipline_id: impl Into<String>,
    ) -> Result<Self, CoreError> {
        let user_id = user_id.into();
        let event_id = event_id.into();
        if user_id.trim().is_empty() {
            return Err(CoreError::InvalidIdentifier("user_id"));
        }
        if event_id.trim().is_empty() {
            return Err(CoreError::InvalidIdentifier("event_id"));
        }

        Ok(Self {
            user_id,
            event_id,
            discipline_id: discipline_id.into(),
            enabled: true,
        })
    }

    /// Returns the discipline id when one was assigned.
    pub fn discipline(&self) -> Option<&str> {
        let trimmed = self.discipline_id.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }

    /// Disables monitoring for the rest of the session.
    pub fn disable(&mut self) {
        self.enabled = false;
    }
}

/// Violation category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationCategory {
    /// Learner left the test window.
    TabSwitch,
    /// Companion device reported a phone in view.
    PhoneViolation,
    /// One-shot companion-device notice.
    PhoneNotice,
    /// Clipboard or context-menu usage.
    Clipboard,
    /// Forbidden key combination.
    ForbiddenKey,
    /// Face/attention lost in front of the camera.
    FocusLoss,
    /// Fullscreen mode was left.
    FullscreenExit,
    /// Microphone loudness crossed the disturbance threshold.
    VoiceDisturbance,
}

impl ViolationCategory {
    /// Stable snake_case label used in logs and history lines.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TabSwitch => "tab_switch",
            Self::PhoneViolation => "phone_violation",
            Self::PhoneNotice => "phone_notice",
            Self::Clipboard => "clipboard",
            Self::ForbiddenKey => "forbidden_key",
            Self::FocusLoss => "focus_loss",
            Self::FullscreenExit => "fullscreen_exit",
            Self::VoiceDisturbance => "voice_disturbance",
        }
    }
}

impl fmt::Display for ViolationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a violation signal originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSource {
    /// Local window/keyboard/clipboard listeners or the capture agent.
    Local,
    /// Capture submission verdict.
    SubmissionVerdict,
    /// Companion-device feed.
    PhoneFeed,
    /// Server progress feed.
    ProgressFeed,
}

/// One violation signal entering the aggregator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationEvent {
    /// Violation category.
    pub category: ViolationCategory,
    /// Human-readable message surfaced to the learner.
    pub message: String,
    /// Detection time in Unix epoch milliseconds.
    pub detected_at_ms: u64,
    /// Origin of the signal.
    pub source: ViolationSource,
    /// `true` when the server explicitly asked for a warning dialog.
    pub server_flagged: bool,
}

impl ViolationEvent {
    /// Creates an event that is not server-flagged.
    pub fn new(
        category: ViolationCategory,
        message: impl Into<String>,
        detected_at_ms: u64,
        source: ViolationSource,
    ) -> Self {
        Self {
            category,
            message: message.into(),
            detected_at_ms,
            source,
            server_flagged: false,
        }
    }

    /// Marks the event as an explicit server warning.
    pub fn server_flagged(mut self) -> Self {
        self.server_flagged = true;
        self
    }

    /// Returns `true` when the event requires a blocking warning dialog.
    ///
    /// Tab switches and phone violations always do; any other category only
    /// when the server flagged it.
    pub fn is_dialog_worthy(&self) -> bool {
        matches!(
            self.category,
            ViolationCategory::TabSwitch | ViolationCategory::PhoneViolation
        ) || self.server_flagged
    }

    /// Renders the entry appended to the ordered violation history.
    pub fn history_line(&self) -> String {
        format!(
            "{} {} [{:?}] {}",
            self.detected_at_ms, self.category, self.source, self.message
        )
    }
}

/// Warning counter and dialog projection owned by the aggregator.
///
/// Invariant: `dialog_open == true` implies capture and submission are paused.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarningState {
    /// Number of dialog-worthy warnings issued in this session.
    pub count: u32,
    /// Whether a blocking dialog is currently open.
    pub dialog_open: bool,
    /// Category of the most recent dialog-worthy violation.
    pub last_category: Option<ViolationCategory>,
    /// Title of the current/last dialog.
    pub title: String,
    /// Message of the current/last dialog.
    pub message: String,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationCause {
    /// Tab-switch limit reached.
    TabSwitchLimit,
    /// Learner acknowledged the phone-violation confirmation.
    PhoneConfirmed,
    /// Server flagged the session as terminated.
    ServerFlagged,
    /// Shared or server-side warning limit reached.
    WarningLimit,
    /// Event end time passed.
    EventEnded,
    /// Game finished normally.
    GameCompleted,
}

impl TerminationCause {
    /// Returns `true` when the session ended because of a violation.
    pub fn is_violation(self) -> bool {
        !matches!(self, Self::EventEnded | Self::GameCompleted)
    }
}

/// Snapshot taken when a session ends. Exists at most once per session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminationRecord {
    /// Ordered violation history at the time of termination.
    pub violation_history: Vec<String>,
    /// Termination time in Unix epoch milliseconds.
    pub terminated_at_ms: u64,
    /// What ended the session.
    pub cause: TerminationCause,
}

/// One validated capture: a JPEG image and a loudness score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureFrame {
    /// JPEG-encoded camera frame.
    pub jpeg: Vec<u8>,
    /// Decibel-like microphone loudness score.
    pub mic_db: i32,
    /// Capture time in Unix epoch milliseconds.
    pub captured_at_ms: u64,
}

impl CaptureFrame {
    /// Constructs a validated capture frame.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidFrame`] when the buffer is empty or does
    /// not start with a JPEG start-of-image marker.
    pub fn new(jpeg: Vec<u8>, mic_db: i32, captured_at_ms: u64) -> Result<Self, CoreError> {
        if jpeg.is_empty() {
            return Err(CoreError::InvalidFrame("jpeg buffer is empty".to_string()));
        }
        if !jpeg.starts_with(&JPEG_SOI) {
            return Err(CoreError::InvalidFrame(
                "buffer is missing the jpeg start-of-image marker".to_string(),
            ));
        }

        Ok(Self {
            jpeg,
            mic_db,
            captured_at_ms,
        })
    }
}

/// Required RGBA byte length for a frame of the given geometry.
///
/// # Errors
/// Returns [`CoreError::InvalidFrame`] on arithmetic overflow.
pub fn required_rgba_len(width: u32, height: u32) -> Result<usize, CoreError> {
    let pixels = (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| CoreError::InvalidFrame("frame dimensions overflow".to_string()))?;

    pixels
        .checked_mul(4)
        .ok_or_else(|| CoreError::InvalidFrame("rgba length overflow".to_string()))
}

/// Error type for core domain validation failures.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A required identifier was blank.
    #[error("{0} must be non-empty")]
    InvalidIdentifier(&'static str),
    /// Frame buffer failed validation.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
    /// JSON encoding/decoding error.
    #[error("codec failure: {0}")]
    Codec(#[from] serde_json::Error),
}

impl TerminationRecord {
    /// Serializes the record to compact JSON for logs and host persistence.
    ///
    /// # Errors
    /// Returns [`CoreError::Codec`] when JSON serialization fails.
    pub fn to_json(&self) -> Result<String, CoreError> {
        serde_json::to_string(self).map_err(CoreError::Codec)
    }
}
