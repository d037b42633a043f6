//! Integration tests for end-to-end monitoring session scenarios.

mod common;

use std::thread;
use std::time::Duration;

use common::{RecordingHost, ScriptedTransport, fast_config, start_session, wait_until};
use sentinel_app::{LocalEvent, MonitorConfig};
use sentinel_capture::SyntheticMediaBackend;
use sentinel_core::TerminationCause;
use sentinel_ui::{DialogKind, TITLE_TAB_SWITCH};

const WAIT: Duration = Duration::from_secs(5);

fn no_cooldown() -> MonitorConfig {
    MonitorConfig {
        tab_switch_cooldown_ms: 0,
        ..fast_config()
    }
}

#[test]
fn session_scenario_tests_first_tab_switch_warns_and_resumes() {
    let harness = start_session(
        fast_config(),
        ScriptedTransport::new(),
        RecordingHost::with_score(Some(3)),
        SyntheticMediaBackend::new(),
    );
    assert!(wait_until(WAIT, || harness.transport.capture_count() > 0));

    let handle = harness.monitor.handle();
    assert!(handle.dispatch_local(LocalEvent::WindowBlur));
    assert!(wait_until(WAIT, || {
        harness
            .ui
            .lock()
            .expect("ui lock")
            .dialog
            .as_ref()
            .is_some_and(|dialog| dialog.title == TITLE_TAB_SWITCH)
    }));
    assert_eq!(harness.monitor.warning_state().count, 1);
    assert!(harness.monitor.capture_paused());
    assert_eq!(harness.host.last_paused(), Some(true));

    let paused_at = harness.transport.capture_count();
    thread::sleep(Duration::from_millis(80));
    assert!(harness.transport.capture_count() <= paused_at + 1);

    assert!(handle.acknowledge_dialog());
    assert!(wait_until(WAIT, || !harness.monitor.capture_paused()));
    assert!(wait_until(WAIT, || harness.transport.capture_count() > paused_at + 1));
    assert!(harness.monitor.termination_record().is_none());
    assert_eq!(harness.host.last_paused(), Some(false));
}

#[test]
fn session_scenario_tests_third_tab_switch_terminates_and_submits() {
    let harness = start_session(
        no_cooldown(),
        ScriptedTransport::new(),
        RecordingHost::with_score(Some(17)),
        SyntheticMediaBackend::new(),
    );
    let handle = harness.monitor.handle();

    handle.dispatch_local(LocalEvent::WindowBlur);
    handle.acknowledge_dialog();
    handle.dispatch_local(LocalEvent::WindowBlur);
    handle.acknowledge_dialog();
    handle.dispatch_local(LocalEvent::WindowBlur);

    let record = harness
        .monitor
        .wait_for_termination(WAIT)
        .expect("session should terminate");
    assert_eq!(record.cause, TerminationCause::TabSwitchLimit);
    assert_eq!(record.violation_history.len(), 3);

    assert!(wait_until(WAIT, || harness.transport.scores().len() == 1));
    let submission = &harness.transport.scores()[0].submission;
    assert!(submission.is_terminated);
    assert_eq!(submission.score, 17);
    assert_eq!(submission.disc_id.as_deref(), Some("disc-3"));

    assert!(wait_until(WAIT, || {
        harness.ui.lock().expect("ui lock").dialog_kind() == Some(DialogKind::Termination)
    }));
    assert!(!handle.dispatch_local(LocalEvent::WindowBlur));

    handle.acknowledge_dialog();
    handle.acknowledge_dialog();
    assert!(wait_until(WAIT, || harness.host.navigation_count() == 1));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(harness.host.navigation_count(), 1);
}

#[test]
fn session_scenario_tests_phone_confirmation_terminates_on_acknowledge() {
    let transport = ScriptedTransport::new();
    transport.set_phone(r#"{"wstatus":1,"warning_count":3,"warning":"Phone visible"}"#);
    let harness = start_session(
        fast_config(),
        transport,
        RecordingHost::with_score(Some(40)),
        SyntheticMediaBackend::new(),
    );

    assert!(wait_until(WAIT, || {
        harness.ui.lock().expect("ui lock").dialog_kind() == Some(DialogKind::PhoneConfirmation)
    }));
    assert!(harness.monitor.capture_paused());
    thread::sleep(Duration::from_millis(60));
    assert!(harness.monitor.termination_record().is_none());

    harness.monitor.handle().acknowledge_dialog();
    let record = harness
        .monitor
        .wait_for_termination(WAIT)
        .expect("acknowledging the confirmation terminates");
    assert_eq!(record.cause, TerminationCause::PhoneConfirmed);
    assert!(harness.monitor.capture_paused());
    assert!(wait_until(WAIT, || harness.transport.scores().len() == 1));
    assert!(harness.transport.scores()[0].submission.is_terminated);
}

#[test]
fn session_scenario_tests_permission_denied_runs_game_ungated() {
    let media = SyntheticMediaBackend::new().denying_permission();
    let usage = media.usage();
    let harness = start_session(
        no_cooldown(),
        ScriptedTransport::new(),
        RecordingHost::with_score(None),
        media,
    );

    assert!(!harness.monitor.monitoring_enabled());
    assert_eq!(harness.monitor.worker_count(), 0);
    thread::sleep(Duration::from_millis(80));
    assert_eq!(harness.transport.capture_count(), 0);
    assert_eq!(usage.frames(), 0);

    let handle = harness.monitor.handle();
    for _ in 0..3 {
        assert!(!handle.dispatch_local(LocalEvent::WindowBlur));
        handle.acknowledge_dialog();
    }
    assert!(!handle.dispatch_local(LocalEvent::FullscreenChange { active: false }));
    thread::sleep(Duration::from_millis(50));
    assert!(harness.monitor.termination_record().is_none());
    assert_eq!(harness.monitor.warning_state().count, 0);
    assert!(harness.ui.lock().expect("ui lock").dialog_kind().is_none());
    assert_ne!(harness.host.last_paused(), Some(true));
    assert!(harness.transport.scores().is_empty());

    handle.game_completed(5);
    let record = harness
        .monitor
        .wait_for_termination(WAIT)
        .expect("completion still ends the session");
    assert_eq!(record.cause, TerminationCause::GameCompleted);
    assert!(wait_until(WAIT, || harness.transport.scores().len() == 1));
    let submission = &harness.transport.scores()[0].submission;
    assert_eq!(submission.score, 5);
    assert!(!submission.is_terminated);
    assert!(wait_until(WAIT, || harness.host.navigation_count() == 1));
}

#[test]
fn session_scenario_tests_event_end_submits_current_score_and_leaves() {
    let harness = start_session(
        fast_config(),
        ScriptedTransport::new(),
        RecordingHost::with_score(Some(88)),
        SyntheticMediaBackend::new(),
    );

    harness.monitor.handle().event_ended();
    let record = harness
        .monitor
        .wait_for_termination(WAIT)
        .expect("event end terminates");
    assert_eq!(record.cause, TerminationCause::EventEnded);

    assert!(wait_until(WAIT, || harness.host.navigation_count() == 1));
    let scores = harness.transport.scores();
    assert_eq!(scores.len(), 1);
    assert_eq!(scores[0].submission.score, 88);
    assert!(!scores[0].submission.is_terminated);
    assert!(harness.ui.lock().expect("ui lock").dialog.is_none());
}

#[test]
fn session_scenario_tests_shutdown_releases_media_without_scoring() {
    let media = SyntheticMediaBackend::new();
    let usage = media.usage();
    let harness = start_session(
        fast_config(),
        ScriptedTransport::new(),
        RecordingHost::with_score(Some(1)),
        media,
    );
    assert!(wait_until(WAIT, || usage.frames() > 0));

    let transport = harness.transport.clone();
    harness.monitor.shutdown();

    assert!(usage.released());
    assert!(transport.scores().is_empty());
}
