//! Integration tests for exactly-once termination.

mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::{
    RecordingHost, ScriptedTransport, arb_input, fast_config, start_session, wait_until,
};
use proptest::prelude::*;
use sentinel_app::{Aggregator, Effect, FinishReason, Input, TerminationLatch, ViolationPolicy};
use sentinel_capture::SyntheticMediaBackend;
use sentinel_contract::Verdict;
use sentinel_ui::DialogKind;

fn fresh_aggregator() -> Aggregator {
    Aggregator::new(ViolationPolicy::default(), 1_500, Arc::new(TerminationLatch::new()))
}

fn count_terminations(effects: &[Effect]) -> usize {
    effects
        .iter()
        .filter(|effect| matches!(effect, Effect::Terminate { .. }))
        .count()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn exactly_once_termination_tests_never_terminates_twice(
        inputs in prop::collection::vec(arb_input(), 0..40)
    ) {
        let mut aggregator = fresh_aggregator();
        let mut terminations = 0;
        for (step, input) in inputs.into_iter().enumerate() {
            let effects = aggregator.apply(input, step as u64 * 100);
            terminations += count_terminations(&effects);
        }
        prop_assert!(terminations <= 1);
        prop_assert_eq!(terminations == 1, aggregator.record().is_some());
    }

    #[test]
    fn exactly_once_termination_tests_finish_always_concludes_once(
        head in prop::collection::vec(arb_input(), 0..20),
        tail in prop::collection::vec(arb_input(), 0..20),
    ) {
        let mut aggregator = fresh_aggregator();
        let mut terminations = 0;
        let inputs = head
            .into_iter()
            .chain(std::iter::once(Input::Finish(FinishReason::EventEnded)))
            .chain(tail);
        for (step, input) in inputs.enumerate() {
            let effects = aggregator.apply(input, step as u64 * 100);
            terminations += count_terminations(&effects);
        }
        prop_assert_eq!(terminations, 1);
    }

    #[test]
    fn exactly_once_termination_tests_terminal_state_is_inert(
        inputs in prop::collection::vec(arb_input(), 0..30)
    ) {
        let mut aggregator = fresh_aggregator();
        aggregator.apply(
            Input::Verdict(Verdict { is_terminated: true, ..Verdict::default() }),
            0,
        );
        for (step, input) in inputs.into_iter().enumerate() {
            let effects = aggregator.apply(input, 100 + step as u64);
            prop_assert!(effects.iter().all(|effect| matches!(
                effect,
                Effect::CloseDialog | Effect::ExitAndNavigate
            )));
        }
    }
}

#[test]
fn exactly_once_termination_tests_shutdown_blocks_later_termination() {
    let mut aggregator = fresh_aggregator();
    assert_eq!(aggregator.apply(Input::Shutdown, 1), vec![Effect::Teardown]);
    assert!(aggregator.apply(Input::Finish(FinishReason::EventEnded), 2).is_empty());
    assert!(aggregator.record().is_none());
}

#[test]
fn exactly_once_termination_tests_competing_sources_submit_one_score() {
    let transport = ScriptedTransport::new();
    transport.set_progress(r#"{"wstatus":1,"warning_count":0}"#);
    transport.set_phone(r#"{"wstatus":1,"warning_count":3}"#);
    for _ in 0..5 {
        transport.push_verdict(r#"{"is_terminated":true}"#);
    }
    let harness = start_session(
        fast_config(),
        transport,
        RecordingHost::with_score(Some(12)),
        SyntheticMediaBackend::new(),
    );

    let racers: Vec<_> = (0..4)
        .map(|index| {
            let handle = harness.monitor.handle();
            thread::spawn(move || {
                if index % 2 == 0 {
                    handle.event_ended();
                } else {
                    handle.game_completed(index);
                }
            })
        })
        .collect();
    for racer in racers {
        racer.join().expect("racer thread");
    }

    assert!(harness.monitor.wait_for_termination(Duration::from_secs(5)).is_some());
    assert!(wait_until(Duration::from_secs(5), || !harness.transport.scores().is_empty()));
    thread::sleep(Duration::from_millis(100));
    assert_eq!(harness.transport.scores().len(), 1);
}

#[test]
fn exactly_once_termination_tests_failed_score_still_shows_notice() {
    let transport = ScriptedTransport::new();
    transport.fail_next_scores(10);
    transport.set_progress(r#"{"wstatus":1,"warning_count":0}"#);
    let harness = start_session(
        fast_config(),
        transport,
        RecordingHost::with_score(Some(30)),
        SyntheticMediaBackend::new(),
    );

    assert!(harness.monitor.wait_for_termination(Duration::from_secs(5)).is_some());
    assert!(wait_until(Duration::from_secs(5), || {
        harness.ui.lock().expect("ui lock").dialog_kind() == Some(DialogKind::Termination)
    }));
    let ui = harness.ui.lock().expect("ui lock");
    assert!(ui.toasts.iter().any(|toast| toast.message.starts_with("Failed to submit score")));
    assert!(harness.transport.scores().is_empty());
}
