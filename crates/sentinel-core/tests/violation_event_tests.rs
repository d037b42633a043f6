//! Tests dialog-worthiness and history rendering of violation events.

use sentinel_core::{TerminationCause, ViolationCategory, ViolationEvent, ViolationSource};

#[test]
fn violation_event_tests_dialog_worthy_categories() {
    let tab = ViolationEvent::new(ViolationCategory::TabSwitch, "blur", 1, ViolationSource::Local);
    let phone = ViolationEvent::new(
        ViolationCategory::PhoneViolation,
        "phone",
        1,
        ViolationSource::PhoneFeed,
    );
    let clipboard =
        ViolationEvent::new(ViolationCategory::Clipboard, "copy", 1, ViolationSource::Local);
    let focus = ViolationEvent::new(
        ViolationCategory::FocusLoss,
        "look at the screen",
        1,
        ViolationSource::SubmissionVerdict,
    );

    assert!(tab.is_dialog_worthy());
    assert!(phone.is_dialog_worthy());
    assert!(!clipboard.is_dialog_worthy());
    assert!(!focus.is_dialog_worthy());
    assert!(focus.server_flagged().is_dialog_worthy());
}

#[test]
fn violation_event_tests_history_line_names_category() {
    let event = ViolationEvent::new(
        ViolationCategory::VoiceDisturbance,
        "loud background",
        42,
        ViolationSource::Local,
    );
    let line = event.history_line();
    assert!(line.starts_with("42 voice_disturbance"));
    assert!(line.ends_with("loud background"));
}

#[test]
fn violation_event_tests_only_violation_causes_flag_termination() {
    assert!(TerminationCause::TabSwitchLimit.is_violation());
    assert!(TerminationCause::ServerFlagged.is_violation());
    assert!(!TerminationCause::EventEnded.is_violation());
    assert!(!TerminationCause::GameCompleted.is_violation());
}
