#![warn(missing_docs)]
//! # sentinel-contract
//!
//! ## Purpose
//! Defines the proctoring server's response schemas, the score submission
//! request, and client-side mapping from responses to violation events.
//!
//! ## Responsibilities
//! - Parse capture verdicts, phone-feed and progress-feed payloads.
//! - Map verdict violation types to [`ViolationCategory`] values, falling back
//!   to focus loss for unknown types so new server labels do not break the
//!   client.
//! - Build the score submission body for the session's event or discipline.
//!
//! ## Data flow
//! Raw JSON response -> `parse_*` -> typed payload -> aggregator input.
//!
//! ## Ownership and lifetimes
//! Parsed values are owned structs to avoid borrowing from transient network
//! buffers.
//!
//! ## Error model
//! Invalid JSON or contract violations return [`ContractError`].

use sentinel_core::{MonitoringSession, ViolationCategory, ViolationEvent, ViolationSource};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Feed `wstatus` value meaning "violating" (phone) or "terminated" (progress).
pub const WSTATUS_ACTIVE: i64 = 1;

/// Verdict returned by the capture submission endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// Server asks for a blocking warning dialog.
    #[serde(default, deserialize_with = "lenient_bool")]
    pub show_warning: bool,
    /// Text for the warning dialog.
    #[serde(default)]
    pub warning_message: Option<String>,
    /// Server-side warning count for the session.
    #[serde(default)]
    pub warning_count: u32,
    /// Server terminated the session.
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_terminated: bool,
    /// Server asks for a non-blocking focus notice.
    #[serde(default, deserialize_with = "lenient_bool")]
    pub show_focus_warning: bool,
    /// Text for the focus notice.
    #[serde(default)]
    pub focus_warning_message: Option<String>,
    /// Classifier label for the detected violation.
    #[serde(default)]
    pub violation_type: Option<String>,
}

/// Companion-device ("phone") feed snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneFeed {
    /// `1` while the companion device reports a violation.
    #[serde(default)]
    pub wstatus: i64,
    /// Phone warnings counted by the server.
    #[serde(default)]
    pub warning_count: u32,
    /// Warning text.
    #[serde(default)]
    pub warning: Option<String>,
    /// Server asks for the one-shot notice.
    #[serde(default, deserialize_with = "lenient_bool")]
    pub door_popup: bool,
    /// Text for the one-shot notice.
    #[serde(default)]
    pub door_message: Option<String>,
}

impl PhoneFeed {
    /// Returns `true` while the device reports a violation.
    pub fn is_violating(&self) -> bool {
        self.wstatus == WSTATUS_ACTIVE
    }
}

/// Authoritative progress snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressFeed {
    /// Server-side warning count for the session.
    #[serde(default)]
    pub warning_count: u32,
    /// `1` once the server terminated the session.
    #[serde(default)]
    pub wstatus: i64,
}

impl ProgressFeed {
    /// Returns `true` when the server reports the session as terminated.
    pub fn is_terminated(&self) -> bool {
        self.wstatus == WSTATUS_ACTIVE
    }
}

/// Score submission body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreSubmission {
    /// Event id, set when the game is scored per event.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub event_id: Option<String>,
    /// Discipline id, set when the game is scored per discipline.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub disc_id: Option<String>,
    /// Final score.
    pub score: u32,
    /// `true` when the session was ended by a violation.
    #[serde(rename = "isTerminated")]
    pub is_terminated: bool,
    /// Seconds spent in the session.
    #[serde(rename = "timeTaken")]
    pub time_taken_secs: u64,
}

impl ScoreSubmission {
    /// Builds a submission targeting the session's discipline, or its event
    /// when no discipline is assigned.
    pub fn for_session(
        session: &MonitoringSession,
        score: u32,
        is_terminated: bool,
        time_taken_secs: u64,
    ) -> Self {
        let (event_id, disc_id) = match session.discipline() {
            Some(discipline) => (None, Some(discipline.to_string())),
            None => (Some(session.event_id.clone()), None),
        };

        Self {
            event_id,
            disc_id,
            score,
            is_terminated,
            time_taken_secs,
        }
    }

    /// Serializes to compact JSON bytes.
    ///
    /// # Errors
    /// Returns [`ContractError::Decode`] when serialization fails.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, ContractError> {
        serde_json::to_vec(self).map_err(ContractError::Decode)
    }
}

/// Parses a capture verdict.
///
/// Blank messages are normalized to `None` so [`verdict_events`] falls back
/// to its default text; a requested warning is never dropped for lack of one.
///
/// # Errors
/// Returns [`ContractError::Decode`] for invalid JSON.
pub fn parse_capture_verdict(raw: &str) -> Result<Verdict, ContractError> {
    let mut parsed: Verdict = serde_json::from_str(raw).map_err(ContractError::Decode)?;
    parsed.warning_message = non_blank(parsed.warning_message.take());
    parsed.focus_warning_message = non_blank(parsed.focus_warning_message.take());
    Ok(parsed)
}

fn non_blank(message: Option<String>) -> Option<String> {
    message.filter(|text| !text.trim().is_empty())
}

/// Parses a phone-feed snapshot.
///
/// # Errors
/// Returns [`ContractError::Decode`] for invalid JSON.
pub fn parse_phone_feed(raw: &str) -> Result<PhoneFeed, ContractError> {
    serde_json::from_str(raw).map_err(ContractError::Decode)
}

/// Parses a progress-feed snapshot.
///
/// # Errors
/// Returns [`ContractError::Decode`] for invalid JSON.
pub fn parse_progress_feed(raw: &str) -> Result<ProgressFeed, ContractError> {
    serde_json::from_str(raw).map_err(ContractError::Decode)
}

/// Maps a classifier label to a violation category.
///
/// Unknown labels map to [`ViolationCategory::FocusLoss`].
pub fn category_for_violation_type(violation_type: Option<&str>) -> ViolationCategory {
    let Some(label) = violation_type else {
        return ViolationCategory::FocusLoss;
    };

    let label = label.trim().to_ascii_lowercase();
    if label.contains("phone") || label.contains("mobile") {
        ViolationCategory::PhoneViolation
    } else if label.contains("voice") || label.contains("noise") || label.contains("audio") {
        ViolationCategory::VoiceDisturbance
    } else if label.contains("tab") {
        ViolationCategory::TabSwitch
    } else {
        ViolationCategory::FocusLoss
    }
}

/// Projects a verdict into violation events.
///
/// Produces at most two events: the server-flagged warning and the
/// non-blocking focus notice. Termination is handled by the caller through
/// [`Verdict::is_terminated`].
pub fn verdict_events(verdict: &Verdict, now_ms: u64) -> Vec<ViolationEvent> {
    let mut events = Vec::new();

    if verdict.show_warning {
        let message = verdict
            .warning_message
            .clone()
            .unwrap_or_else(|| "A proctoring violation was detected.".to_string());
        events.push(
            ViolationEvent::new(
                category_for_violation_type(verdict.violation_type.as_deref()),
                message,
                now_ms,
                ViolationSource::SubmissionVerdict,
            )
            .server_flagged(),
        );
    }

    if verdict.show_focus_warning {
        let message = verdict
            .focus_warning_message
            .clone()
            .unwrap_or_else(|| "Please keep your face in front of the camera.".to_string());
        events.push(ViolationEvent::new(
            ViolationCategory::FocusLoss,
            message,
            now_ms,
            ViolationSource::SubmissionVerdict,
        ));
    }

    events
}

/// Accepts `true`/`false`, `0`/`1` and `"true"`/`"false"`/`"1"`/`"0"`.
fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Int(i64),
        Text(String),
        Null(()),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Bool(value) => Ok(value),
        Raw::Int(value) => Ok(value != 0),
        Raw::Text(value) => {
            let normalized = value.trim().to_ascii_lowercase();
            Ok(normalized == "true" || normalized == "1")
        }
        Raw::Null(()) => Ok(false),
    }
}

/// Contract errors.
#[derive(Debug, Error)]
pub enum ContractError {
    /// JSON decode failure.
    #[error("contract decode failure: {0}")]
    Decode(#[from] serde_json::Error),
}
