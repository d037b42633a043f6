//! Integration tests for score submission retries and idempotency.

mod common;

use common::{ScriptedTransport, fixture_session};
use sentinel_contract::ScoreSubmission;
use sentinel_transport::{
    FailureClass, RetryPolicy, ScoreClient, TransportError, classify_error,
    idempotency_key_for_score,
};

fn quick_policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        base_delay_ms: 1,
        max_delay_ms: 2,
        jitter_ms: 0,
    }
}

fn submission(score: u32) -> ScoreSubmission {
    ScoreSubmission::for_session(&fixture_session(), score, true, 120)
}

#[test]
fn score_retry_policy_tests_retries_server_errors_then_succeeds() {
    let transport = ScriptedTransport::new();
    transport.fail_next_scores(2);
    let client = ScoreClient::new(transport.clone(), quick_policy(3));

    let report = client
        .submit(&fixture_session(), submission(42))
        .expect("third attempt succeeds");

    assert_eq!(report.attempts, 3);
    let scores = transport.scores();
    assert_eq!(scores.len(), 1);
    assert_eq!(scores[0].idempotency_key, report.idempotency_key);
    assert_eq!(scores[0].submission.score, 42);
}

#[test]
fn score_retry_policy_tests_gives_up_after_budget() {
    let transport = ScriptedTransport::new();
    transport.fail_next_scores(5);
    let client = ScoreClient::new(transport.clone(), quick_policy(1));

    let error = client
        .submit(&fixture_session(), submission(1))
        .expect_err("retries exhausted");

    assert!(matches!(error, TransportError::Server(503)));
    assert!(transport.scores().is_empty());
}

#[test]
fn score_retry_policy_tests_key_is_stable_per_body() {
    let session = fixture_session();
    let client = ScoreClient::new(ScriptedTransport::new(), quick_policy(0));

    let first = client.envelope(&session, submission(7)).expect("encodes");
    let again = client.envelope(&session, submission(7)).expect("encodes");
    let other = client.envelope(&session, submission(8)).expect("encodes");

    assert_eq!(first.idempotency_key, again.idempotency_key);
    assert_ne!(first.idempotency_key, other.idempotency_key);
    assert_eq!(
        first.idempotency_key,
        idempotency_key_for_score(&session.user_id, &first.body)
    );
}

#[test]
fn score_retry_policy_tests_body_targets_discipline() {
    let client = ScoreClient::new(ScriptedTransport::new(), quick_policy(0));
    let envelope = client
        .envelope(&fixture_session(), submission(9))
        .expect("encodes");
    let body: serde_json::Value = serde_json::from_slice(&envelope.body).expect("json body");

    assert_eq!(body["disc_id"], "disc-3");
    assert_eq!(body["isTerminated"], true);
    assert_eq!(body["timeTaken"], 120);
    assert!(body.get("event_id").is_none());
}

#[test]
fn score_retry_policy_tests_classifies_failures() {
    assert_eq!(classify_error(&TransportError::Timeout), FailureClass::Retriable);
    assert_eq!(classify_error(&TransportError::Server(502)), FailureClass::Retriable);
    assert_eq!(classify_error(&TransportError::Client(429)), FailureClass::Retriable);
    assert_eq!(classify_error(&TransportError::Client(400)), FailureClass::Permanent);
    assert_eq!(
        classify_error(&TransportError::Encode("bad".to_string())),
        FailureClass::Permanent
    );
}
