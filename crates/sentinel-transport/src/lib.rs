#![warn(missing_docs)]
//! # sentinel-transport
//!
//! ## Purpose
//! Carries captures, feed polls, disturbance audio and final scores between
//! the monitoring client and the proctoring server.
//!
//! ## Responsibilities
//! - Define the injectable [`MonitoringTransport`] seam used by the runtime.
//! - Provide the production [`HttpTransport`] (blocking `reqwest`).
//! - Validate base URLs (HTTPS unless explicitly allowed otherwise).
//! - Classify failures and retry score submission with bounded backoff.
//! - Derive stable idempotency keys for score submissions.
//!
//! ## Data flow
//! Capture tick -> [`CaptureSubmission`] -> `/give_test` -> raw verdict JSON;
//! pollers -> [`SessionQuery`] -> feed JSON; termination ->
//! [`ScoreClient::submit`] -> `/submit_score`.
//!
//! ## Error model
//! Every call returns [`TransportError`]; [`classify_error`] separates
//! retriable from permanent failures. Only score submission retries; capture
//! submissions are one-shot per tick.

use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client, Response};
use reqwest::header::CONTENT_TYPE;
use sentinel_contract::ScoreSubmission;
use sentinel_core::{CaptureFrame, MonitoringSession};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

/// Capture submission path.
pub const CAPTURE_PATH: &str = "/give_test";
/// Companion-device feed path.
pub const PHONE_WARNINGS_PATH: &str = "/phone-warnings";
/// Progress feed path.
pub const EVENT_PROGRESS_PATH: &str = "/event-progress";
/// Disturbance audio upload path.
pub const RECORD_AUDIO_PATH: &str = "/record_audio";
/// Default score submission path.
pub const DEFAULT_SCORE_PATH: &str = "/submit_score";
/// Header carrying the score idempotency key.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Query parameters shared by both feeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionQuery {
    /// Event id.
    pub event_id: String,
    /// Discipline id (may be empty).
    pub disc_id: String,
    /// Learner id.
    pub user_id: String,
}

impl SessionQuery {
    /// Builds the query for a session.
    pub fn for_session(session: &MonitoringSession) -> Self {
        Self {
            event_id: session.event_id.clone(),
            disc_id: session.discipline_id.clone(),
            user_id: session.user_id.clone(),
        }
    }

    fn pairs(&self) -> [(&'static str, &str); 3] {
        [
            ("event_id", self.event_id.as_str()),
            ("disc_id", self.disc_id.as_str()),
            ("user_id", self.user_id.as_str()),
        ]
    }
}

/// Multipart capture submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSubmission {
    /// Learner id.
    pub user_id: String,
    /// Event id.
    pub event_id: String,
    /// Discipline id.
    pub discipline_id: String,
    /// JPEG image (`imgData` part).
    pub jpeg: Vec<u8>,
    /// Loudness score (`voice_db` field).
    pub voice_db: i32,
}

impl CaptureSubmission {
    /// Packages one capture frame for a session.
    pub fn from_frame(session: &MonitoringSession, frame: &CaptureFrame) -> Self {
        Self {
            user_id: session.user_id.clone(),
            event_id: session.event_id.clone(),
            discipline_id: session.discipline_id.clone(),
            jpeg: frame.jpeg.clone(),
            voice_db: frame.mic_db,
        }
    }
}

/// Multipart disturbance audio upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioUpload {
    /// Learner id.
    pub user_id: String,
    /// Event id.
    pub event_id: String,
    /// Discipline id.
    pub discipline_id: String,
    /// Encoded audio (`audio` part).
    pub audio: Vec<u8>,
}

impl AudioUpload {
    /// Packages one recording for a session.
    pub fn new(session: &MonitoringSession, audio: Vec<u8>) -> Self {
        Self {
            user_id: session.user_id.clone(),
            event_id: session.event_id.clone(),
            discipline_id: session.discipline_id.clone(),
            audio,
        }
    }
}

/// Serialized score submission plus its idempotency key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreEnvelope {
    /// Typed submission.
    pub submission: ScoreSubmission,
    /// Stable key; identical for every retry of one submission.
    pub idempotency_key: String,
    /// JSON body.
    pub body: Vec<u8>,
}

/// Transport used by the monitoring runtime.
pub trait MonitoringTransport: Send + Sync {
    /// Posts one capture and returns the raw verdict JSON.
    fn submit_capture(&self, submission: &CaptureSubmission) -> Result<String, TransportError>;

    /// Polls the companion-device feed and returns raw JSON.
    fn fetch_phone_warnings(&self, query: &SessionQuery) -> Result<String, TransportError>;

    /// Polls the progress feed and returns raw JSON.
    fn fetch_event_progress(&self, query: &SessionQuery) -> Result<String, TransportError>;

    /// Uploads one disturbance recording.
    fn upload_audio(&self, upload: &AudioUpload) -> Result<(), TransportError>;

    /// Posts the final score.
    fn submit_score(&self, envelope: &ScoreEnvelope) -> Result<(), TransportError>;
}

/// Resolved server endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    base: Url,
    score_path: String,
}

impl Endpoints {
    /// Creates endpoints from a validated base URL.
    pub fn new(base: Url, score_path: impl Into<String>) -> Self {
        Self {
            base,
            score_path: score_path.into(),
        }
    }

    /// Returns the base URL.
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Resolves a path against the base URL, keeping any base path prefix.
    ///
    /// # Errors
    /// Returns [`TransportError::InvalidEndpoint`] when joining fails.
    pub fn resolve(&self, path: &str) -> Result<Url, TransportError> {
        let mut base = self.base.clone();
        if !base.path().ends_with('/') {
            let with_slash = format!("{}/", base.path());
            base.set_path(&with_slash);
        }
        base.join(path.trim_start_matches('/'))
            .map_err(|error| TransportError::InvalidEndpoint(format!("cannot join {path}: {error}")))
    }

    /// Score submission URL.
    ///
    /// # Errors
    /// See [`Endpoints::resolve`].
    pub fn score(&self) -> Result<Url, TransportError> {
        self.resolve(&self.score_path)
    }
}

/// Validates the server base URL.
///
/// # Errors
/// Returns [`TransportError::InvalidEndpoint`] for unparsable URLs, or for
/// non-HTTPS URLs unless `allow_insecure` is set.
pub fn validate_base_url(raw: &str, allow_insecure: bool) -> Result<Url, TransportError> {
    let parsed = Url::parse(raw)
        .map_err(|error| TransportError::InvalidEndpoint(format!("invalid base url: {error}")))?;

    match parsed.scheme() {
        "https" => Ok(parsed),
        "http" if allow_insecure => Ok(parsed),
        other => Err(TransportError::InvalidEndpoint(format!(
            "base url must use https, got {other}"
        ))),
    }
}

/// Production transport over blocking HTTP.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    endpoints: Endpoints,
}

impl HttpTransport {
    /// Builds the HTTP client.
    ///
    /// # Errors
    /// Returns [`TransportError::Network`] when the client cannot be built.
    pub fn new(endpoints: Endpoints, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(map_reqwest_error)?;
        Ok(Self { client, endpoints })
    }

    fn get_json(&self, path: &str, query: &SessionQuery) -> Result<String, TransportError> {
        let url = self.endpoints.resolve(path)?;
        debug!(stage = "transport", action = "poll", %url);
        let response = self
            .client
            .get(url)
            .query(&query.pairs())
            .send()
            .map_err(map_reqwest_error)?;
        check_status(response)?.text().map_err(map_reqwest_error)
    }
}

impl MonitoringTransport for HttpTransport {
    fn submit_capture(&self, submission: &CaptureSubmission) -> Result<String, TransportError> {
        let url = self.endpoints.resolve(CAPTURE_PATH)?;
        let image = Part::bytes(submission.jpeg.clone())
            .file_name("capture.jpg")
            .mime_str("image/jpeg")
            .map_err(map_reqwest_error)?;
        let form = Form::new()
            .text("user_id", submission.user_id.clone())
            .text("event_id", submission.event_id.clone())
            .text("discipline_id", submission.discipline_id.clone())
            .text("voice_db", submission.voice_db.to_string())
            .part("imgData", image);

        debug!(
            stage = "transport",
            action = "submit_capture",
            bytes = submission.jpeg.len(),
            voice_db = submission.voice_db
        );
        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .map_err(map_reqwest_error)?;
        check_status(response)?.text().map_err(map_reqwest_error)
    }

    fn fetch_phone_warnings(&self, query: &SessionQuery) -> Result<String, TransportError> {
        self.get_json(PHONE_WARNINGS_PATH, query)
    }

    fn fetch_event_progress(&self, query: &SessionQuery) -> Result<String, TransportError> {
        self.get_json(EVENT_PROGRESS_PATH, query)
    }

    fn upload_audio(&self, upload: &AudioUpload) -> Result<(), TransportError> {
        let url = self.endpoints.resolve(RECORD_AUDIO_PATH)?;
        let audio = Part::bytes(upload.audio.clone())
            .file_name("disturbance.webm")
            .mime_str("audio/webm")
            .map_err(map_reqwest_error)?;
        let form = Form::new()
            .part("audio", audio)
            .text("user_id", upload.user_id.clone())
            .text("event_id", upload.event_id.clone())
            .text("discipline_id", upload.discipline_id.clone());

        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .map_err(map_reqwest_error)?;
        check_status(response).map(|_| ())
    }

    fn submit_score(&self, envelope: &ScoreEnvelope) -> Result<(), TransportError> {
        let url = self.endpoints.score()?;
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .header(IDEMPOTENCY_HEADER, envelope.idempotency_key.as_str())
            .body(envelope.body.clone())
            .send()
            .map_err(map_reqwest_error)?;
        check_status(response).map(|_| ())
    }
}

fn check_status(response: Response) -> Result<Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(status_error(status.as_u16()))
    }
}

fn status_error(code: u16) -> TransportError {
    if code >= 500 {
        TransportError::Server(code)
    } else {
        TransportError::Client(code)
    }
}

fn map_reqwest_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else if let Some(status) = error.status() {
        status_error(status.as_u16())
    } else {
        TransportError::Network(error.to_string())
    }
}

/// Retry configuration for score submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay_ms: u64,
    /// Upper bound for any single delay.
    pub max_delay_ms: u64,
    /// Maximum random jitter added to each delay.
    pub jitter_ms: u64,
}

impl RetryPolicy {
    /// Exponential backoff delay before retry number `retry` (1-based).
    pub fn delay_for_retry(&self, retry: u32, rng: &mut impl Rng) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        let backoff = self
            .base_delay_ms
            .saturating_mul(1_u64 << exponent)
            .min(self.max_delay_ms);
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            rng.random_range(0..=self.jitter_ms)
        };
        Duration::from_millis(backoff.saturating_add(jitter).min(self.max_delay_ms))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 4_000,
            jitter_ms: 250,
        }
    }
}

/// Failure class used by retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Worth retrying.
    Retriable,
    /// Retrying cannot help.
    Permanent,
}

/// Classifies a transport failure.
pub fn classify_error(error: &TransportError) -> FailureClass {
    match error {
        TransportError::Timeout | TransportError::Network(_) | TransportError::Server(_) => {
            FailureClass::Retriable
        }
        TransportError::Client(429) => FailureClass::Retriable,
        TransportError::Client(_)
        | TransportError::InvalidEndpoint(_)
        | TransportError::Encode(_) => FailureClass::Permanent,
    }
}

/// Derives the idempotency key of a score submission for a learner.
pub fn idempotency_key_for_score(user_id: &str, body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update([0_u8]);
    hasher.update(body);
    hex::encode(hasher.finalize())
}

/// Outcome of a successful score submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitReport {
    /// Attempts used, including the successful one.
    pub attempts: u32,
    /// Key sent with every attempt.
    pub idempotency_key: String,
}

/// Score submission client with bounded retries.
pub struct ScoreClient {
    transport: Arc<dyn MonitoringTransport>,
    policy: RetryPolicy,
    rng: Mutex<StdRng>,
}

impl ScoreClient {
    /// Creates a score client.
    pub fn new(transport: Arc<dyn MonitoringTransport>, policy: RetryPolicy) -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos() as u64)
            .unwrap_or_default();
        Self {
            transport,
            policy,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Builds the envelope for a submission.
    ///
    /// # Errors
    /// Returns [`TransportError::Encode`] when serialization fails.
    pub fn envelope(
        &self,
        session: &MonitoringSession,
        submission: ScoreSubmission,
    ) -> Result<ScoreEnvelope, TransportError> {
        let body = submission
            .to_json_bytes()
            .map_err(|error| TransportError::Encode(error.to_string()))?;
        Ok(ScoreEnvelope {
            idempotency_key: idempotency_key_for_score(&session.user_id, &body),
            submission,
            body,
        })
    }

    /// Submits a score, retrying retriable failures per policy.
    ///
    /// # Errors
    /// Returns the last error once retries are exhausted, or the first
    /// permanent error.
    pub fn submit(
        &self,
        session: &MonitoringSession,
        submission: ScoreSubmission,
    ) -> Result<SubmitReport, TransportError> {
        let envelope = self.envelope(session, submission)?;
        let mut attempts = 0_u32;

        loop {
            attempts += 1;
            match self.transport.submit_score(&envelope) {
                Ok(()) => {
                    return Ok(SubmitReport {
                        attempts,
                        idempotency_key: envelope.idempotency_key,
                    });
                }
                Err(error) => {
                    let retries_used = attempts - 1;
                    if classify_error(&error) == FailureClass::Permanent
                        || retries_used >= self.policy.max_retries
                    {
                        return Err(error);
                    }

                    let delay = match self.rng.lock() {
                        Ok(mut rng) => self.policy.delay_for_retry(attempts, &mut *rng),
                        Err(poisoned) => self
                            .policy
                            .delay_for_retry(attempts, &mut *poisoned.into_inner()),
                    };
                    warn!(
                        stage = "score",
                        action = "retry",
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        %error
                    );
                    std::thread::sleep(delay);
                }
            }
        }
    }
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Request timed out.
    #[error("request timed out")]
    Timeout,
    /// Connection-level failure.
    #[error("network failure: {0}")]
    Network(String),
    /// Server returned a 5xx status.
    #[error("server error status {0}")]
    Server(u16),
    /// Server returned a 4xx status.
    #[error("client error status {0}")]
    Client(u16),
    /// Endpoint configuration is invalid.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
    /// Request body could not be encoded.
    #[error("encode failure: {0}")]
    Encode(String),
}
