//! Shared fakes for app integration tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use proptest::prelude::*;
use sentinel_app::{FinishReason, HostPage, Input, MonitorConfig, MonitorSession, SessionDeps};
use sentinel_capture::SyntheticMediaBackend;
use sentinel_contract::{PhoneFeed, ProgressFeed, Verdict};
use sentinel_core::{MonitoringSession, ViolationCategory, ViolationEvent, ViolationSource};
use sentinel_transport::{
    AudioUpload, CaptureSubmission, MonitoringTransport, RetryPolicy, ScoreEnvelope, SessionQuery,
    TransportError,
};
use sentinel_ui::{Stage, UiState};

/// Verdict with nothing to report.
#[allow(dead_code)]
pub const QUIET_VERDICT: &str = r#"{"show_warning":false,"is_terminated":false}"#;

/// Transport returning scripted responses and recording every call.
#[derive(Debug)]
pub struct ScriptedTransport {
    verdicts: Mutex<VecDeque<String>>,
    phone: Mutex<String>,
    progress: Mutex<String>,
    captures: AtomicUsize,
    audio_uploads: AtomicUsize,
    scores: Mutex<Vec<ScoreEnvelope>>,
    score_failures_left: AtomicU32,
    fail_captures: AtomicBool,
}

#[allow(dead_code)]
impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            verdicts: Mutex::new(VecDeque::new()),
            phone: Mutex::new(r#"{"wstatus":0,"warning_count":0}"#.to_string()),
            progress: Mutex::new(r#"{"wstatus":0,"warning_count":0}"#.to_string()),
            captures: AtomicUsize::new(0),
            audio_uploads: AtomicUsize::new(0),
            scores: Mutex::new(Vec::new()),
            score_failures_left: AtomicU32::new(0),
            fail_captures: AtomicBool::new(false),
        })
    }

    pub fn push_verdict(&self, raw: &str) {
        self.verdicts
            .lock()
            .expect("verdict lock")
            .push_back(raw.to_string());
    }

    pub fn set_phone(&self, raw: &str) {
        *self.phone.lock().expect("phone lock") = raw.to_string();
    }

    pub fn set_progress(&self, raw: &str) {
        *self.progress.lock().expect("progress lock") = raw.to_string();
    }

    pub fn fail_next_scores(&self, count: u32) {
        self.score_failures_left.store(count, Ordering::SeqCst);
    }

    pub fn set_fail_captures(&self, fail: bool) {
        self.fail_captures.store(fail, Ordering::SeqCst);
    }

    pub fn capture_count(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }

    pub fn audio_upload_count(&self) -> usize {
        self.audio_uploads.load(Ordering::SeqCst)
    }

    pub fn scores(&self) -> Vec<ScoreEnvelope> {
        self.scores.lock().expect("score lock").clone()
    }
}

impl MonitoringTransport for ScriptedTransport {
    fn submit_capture(&self, _submission: &CaptureSubmission) -> Result<String, TransportError> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        if self.fail_captures.load(Ordering::SeqCst) {
            return Err(TransportError::Timeout);
        }
        Ok(self
            .verdicts
            .lock()
            .expect("verdict lock")
            .pop_front()
            .unwrap_or_else(|| QUIET_VERDICT.to_string()))
    }

    fn fetch_phone_warnings(&self, _query: &SessionQuery) -> Result<String, TransportError> {
        Ok(self.phone.lock().expect("phone lock").clone())
    }

    fn fetch_event_progress(&self, _query: &SessionQuery) -> Result<String, TransportError> {
        Ok(self.progress.lock().expect("progress lock").clone())
    }

    fn upload_audio(&self, _upload: &AudioUpload) -> Result<(), TransportError> {
        self.audio_uploads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn submit_score(&self, envelope: &ScoreEnvelope) -> Result<(), TransportError> {
        let left = self.score_failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.score_failures_left.store(left - 1, Ordering::SeqCst);
            return Err(TransportError::Server(503));
        }
        self.scores
            .lock()
            .expect("score lock")
            .push(envelope.clone());
        Ok(())
    }
}

/// Host page recording every call.
#[derive(Debug, Default)]
pub struct RecordingHost {
    pub score: Mutex<Option<u32>>,
    pub paused: Mutex<Vec<bool>>,
    pub exits: AtomicUsize,
    pub navigations: AtomicUsize,
}

#[allow(dead_code)]
impl RecordingHost {
    pub fn with_score(score: Option<u32>) -> Arc<Self> {
        Arc::new(Self {
            score: Mutex::new(score),
            ..Self::default()
        })
    }

    pub fn navigation_count(&self) -> usize {
        self.navigations.load(Ordering::SeqCst)
    }

    pub fn last_paused(&self) -> Option<bool> {
        self.paused.lock().expect("paused lock").last().copied()
    }
}

impl HostPage for RecordingHost {
    fn current_score(&self) -> Option<u32> {
        *self.score.lock().expect("score lock")
    }

    fn set_game_paused(&self, paused: bool) {
        self.paused.lock().expect("paused lock").push(paused);
    }

    fn exit_fullscreen(&self) {
        self.exits.fetch_add(1, Ordering::SeqCst);
    }

    fn navigate_to_event_page(&self) {
        self.navigations.fetch_add(1, Ordering::SeqCst);
    }
}

/// Config with short periods so sessions tick quickly.
#[allow(dead_code)]
pub fn fast_config() -> MonitorConfig {
    MonitorConfig {
        capture_interval_ms: 15,
        phone_poll_ms: 15,
        progress_poll_ms: 15,
        score_retry: RetryPolicy {
            max_retries: 2,
            base_delay_ms: 1,
            max_delay_ms: 5,
            jitter_ms: 0,
        },
        ..MonitorConfig::default()
    }
}

/// Session identifiers used across tests.
#[allow(dead_code)]
pub fn fixture_session() -> MonitoringSession {
    MonitoringSession::new("learner-7", "event-42", "disc-3").expect("fixture session is valid")
}

/// Running session plus its fakes.
#[allow(dead_code)]
pub struct Harness {
    pub monitor: MonitorSession,
    pub transport: Arc<ScriptedTransport>,
    pub host: Arc<RecordingHost>,
    pub ui: Arc<Mutex<UiState>>,
}

/// Starts a session with the given collaborators.
#[allow(dead_code)]
pub fn start_session(
    config: MonitorConfig,
    transport: Arc<ScriptedTransport>,
    host: Arc<RecordingHost>,
    media: SyntheticMediaBackend,
) -> Harness {
    let ui = Arc::new(Mutex::new(UiState::new("test")));
    let monitor = MonitorSession::start(
        fixture_session(),
        SessionDeps {
            config,
            transport: transport.clone(),
            media: Box::new(media),
            host: host.clone(),
            presenter: Box::new(Arc::clone(&ui)),
        },
    )
    .expect("session should start");

    Harness {
        monitor,
        transport,
        host,
        ui,
    }
}

/// Polls `condition` until it holds or `timeout` passes.
#[allow(dead_code)]
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Local tab switch detected at `at`.
#[allow(dead_code)]
pub fn blur(at: u64) -> Input {
    Input::Violation(ViolationEvent::new(
        ViolationCategory::TabSwitch,
        "left the window",
        at,
        ViolationSource::Local,
    ))
}

/// Any aggregator input except teardown.
#[allow(dead_code)]
pub fn arb_input() -> impl Strategy<Value = Input> {
    prop_oneof![
        (0_u64..20_000).prop_map(blur),
        Just(Input::Acknowledge),
        (0_u32..5, any::<bool>()).prop_map(|(warning_count, violating)| {
            Input::PhoneFeed(PhoneFeed {
                wstatus: i64::from(violating),
                warning_count,
                ..PhoneFeed::default()
            })
        }),
        (0_u32..5, any::<bool>()).prop_map(|(warning_count, terminated)| {
            Input::Progress(ProgressFeed {
                warning_count,
                wstatus: i64::from(terminated),
            })
        }),
        (any::<bool>(), 0_u32..4).prop_map(|(is_terminated, warning_count)| {
            Input::Verdict(Verdict {
                show_warning: true,
                warning_message: Some("Face not visible".to_string()),
                warning_count,
                is_terminated,
                ..Verdict::default()
            })
        }),
        Just(Input::Finish(FinishReason::EventEnded)),
        (0_u32..100).prop_map(|score| Input::Finish(FinishReason::GameCompleted { score })),
        any::<bool>().prop_map(Input::FullscreenChanged),
        prop_oneof![Just(Stage::Capture), Just(Stage::Feeds)].prop_map(|stage| {
            Input::TransientFailure {
                stage,
                step: "scripted",
                detail: "timeout".to_string(),
            }
        }),
    ]
}
