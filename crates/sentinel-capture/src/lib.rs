#![warn(missing_docs)]
//! # sentinel-capture
//!
//! ## Purpose
//! Provides camera/microphone acquisition abstractions and the capture agent
//! that turns raw media into submission-ready [`CaptureFrame`]s.
//!
//! ## Responsibilities
//! - Define a backend-agnostic media trait ([`MediaBackend`]).
//! - Expose a deterministic synthetic backend for CI, tests and demos.
//! - Encode camera frames as JPEG and score microphone loudness.
//! - Track voice disturbances per session and buffer disturbance recordings.
//!
//! ## Data flow
//! Host grants devices -> [`CaptureAgent::acquire`] -> periodic
//! [`CaptureAgent::capture_frame`] -> frame goes to the submission channel;
//! loudness feeds [`CaptureAgent::observe_loudness`], which may start a
//! recording later drained by [`CaptureAgent::poll_recording`].
//!
//! ## Ownership and lifetimes
//! The agent exclusively owns its backend (and therefore the device handles)
//! until [`CaptureAgent::release`] is called or the agent is dropped.
//!
//! ## Error model
//! Permission refusals, missing acquisition, encoding and backend failures are
//! reported as [`CaptureError`] values.

mod loudness;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use image::ExtendedColorType;
use image::codecs::jpeg::JpegEncoder;
use sentinel_core::{CaptureFrame, CoreError, required_rgba_len};
use thiserror::Error;

pub use loudness::{ANALYSER_MAX_DB, ANALYSER_MIN_DB, loudness_score, synthetic_noise};

/// Default capture cadence.
pub const DEFAULT_CAPTURE_INTERVAL_MS: u64 = 2_000;
/// Default length of a disturbance recording.
pub const DEFAULT_RECORDING_DURATION_MS: u64 = 5_000;

/// Properties of an acquired camera+microphone stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    /// Video width in pixels.
    pub video_width: u32,
    /// Video height in pixels.
    pub video_height: u32,
    /// Microphone sample rate in Hz.
    pub audio_sample_rate: u32,
}

/// One raw camera frame in RGBA row-major layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawVideoFrame {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// RGBA bytes (`width * height * 4`).
    pub rgba: Vec<u8>,
}

impl RawVideoFrame {
    /// Constructs a validated raw frame.
    ///
    /// # Errors
    /// Returns [`CaptureError::Core`] when the buffer does not match the
    /// declared geometry.
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self, CaptureError> {
        let expected = required_rgba_len(width, height)?;
        if rgba.len() != expected || expected == 0 {
            return Err(CaptureError::Core(CoreError::InvalidFrame(format!(
                "expected {expected} rgba bytes, got {}",
                rgba.len()
            ))));
        }
        Ok(Self {
            width,
            height,
            rgba,
        })
    }
}

/// Finished disturbance recording awaiting upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    /// Encoded audio bytes.
    pub bytes: Vec<u8>,
    /// Recording start in Unix epoch milliseconds.
    pub started_at_ms: u64,
    /// Recording length in milliseconds.
    pub duration_ms: u64,
}

/// Capture agent configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Interval between capture ticks.
    pub interval_ms: u64,
    /// JPEG quality in `1..=100`.
    pub jpeg_quality: u8,
    /// Loudness score at or above which a tick counts as a disturbance.
    pub disturbance_threshold_db: i32,
    /// Disturbances needed before a recording is started.
    pub disturbance_recording_after: u32,
    /// Length of a disturbance recording.
    pub recording_duration_ms: u64,
}

impl CaptureConfig {
    /// Creates validated capture configuration with default thresholds.
    ///
    /// # Errors
    /// Returns [`CaptureError::InvalidConfig`] when `interval_ms == 0`.
    pub fn new(interval_ms: u64) -> Result<Self, CaptureError> {
        Self {
            interval_ms,
            ..Self::default()
        }
        .validated()
    }

    /// Checks every field.
    ///
    /// # Errors
    /// Returns [`CaptureError::InvalidConfig`] naming the offending field.
    pub fn validated(self) -> Result<Self, CaptureError> {
        if self.interval_ms == 0 {
            return Err(CaptureError::InvalidConfig(
                "interval_ms must be greater than zero".to_string(),
            ));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(CaptureError::InvalidConfig(
                "jpeg_quality must be within 1..=100".to_string(),
            ));
        }
        if self.disturbance_recording_after == 0 {
            return Err(CaptureError::InvalidConfig(
                "disturbance_recording_after must be greater than zero".to_string(),
            ));
        }
        Ok(self)
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_CAPTURE_INTERVAL_MS,
            jpeg_quality: 70,
            disturbance_threshold_db: 40,
            disturbance_recording_after: 3,
            recording_duration_ms: DEFAULT_RECORDING_DURATION_MS,
        }
    }
}

/// Trait implemented by concrete camera/microphone providers.
pub trait MediaBackend: Send {
    /// Requests camera and microphone access.
    ///
    /// # Errors
    /// Returns [`CaptureError::PermissionDenied`] when the user or platform
    /// refuses access.
    fn acquire(&mut self) -> Result<StreamInfo, CaptureError>;

    /// Grabs the current video frame.
    fn grab_video_frame(&mut self) -> Result<RawVideoFrame, CaptureError>;

    /// Returns the latest block of time-domain microphone samples.
    fn sample_audio(&mut self) -> Result<Vec<f32>, CaptureError>;

    /// Starts buffering microphone audio.
    fn start_recording(&mut self) -> Result<(), CaptureError>;

    /// Stops buffering and returns the encoded recording.
    fn finish_recording(&mut self) -> Result<Vec<u8>, CaptureError>;

    /// Releases device handles. Must be idempotent.
    fn release(&mut self);
}

/// Result of feeding one loudness score into the disturbance tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoudnessOutcome {
    /// Below threshold.
    Quiet,
    /// At or above threshold; `count` disturbances so far.
    Disturbance {
        /// Disturbances counted since the last recording.
        count: u32,
    },
    /// Disturbance that also started a recording.
    RecordingStarted {
        /// Disturbances counted since the last recording.
        count: u32,
    },
}

/// Session-scoped capture agent.
pub struct CaptureAgent {
    backend: Box<dyn MediaBackend>,
    config: CaptureConfig,
    stream: Option<StreamInfo>,
    disturbances: u32,
    recording_started_at_ms: Option<u64>,
}

impl CaptureAgent {
    /// Creates an agent that has not acquired devices yet.
    pub fn new(backend: Box<dyn MediaBackend>, config: CaptureConfig) -> Self {
        Self {
            backend,
            config,
            stream: None,
            disturbances: 0,
            recording_started_at_ms: None,
        }
    }

    /// Acquires camera and microphone.
    ///
    /// # Errors
    /// Propagates backend errors, notably [`CaptureError::PermissionDenied`].
    pub fn acquire(&mut self) -> Result<StreamInfo, CaptureError> {
        let stream = self.backend.acquire()?;
        self.stream = Some(stream);
        Ok(stream)
    }

    /// Returns `true` once devices were acquired and not yet released.
    pub fn is_acquired(&self) -> bool {
        self.stream.is_some()
    }

    /// Returns the configuration in use.
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Grabs one frame, encodes it as JPEG and scores the microphone.
    ///
    /// # Errors
    /// Returns [`CaptureError::NotAcquired`] before a successful
    /// [`CaptureAgent::acquire`], otherwise backend/encoding errors.
    pub fn capture_frame(&mut self, now_ms: u64) -> Result<CaptureFrame, CaptureError> {
        if self.stream.is_none() {
            return Err(CaptureError::NotAcquired);
        }

        let raw = self.backend.grab_video_frame()?;
        let jpeg = encode_jpeg(&raw, self.config.jpeg_quality)?;
        let samples = self.backend.sample_audio()?;
        let mic_db = loudness_score(&samples);

        Ok(CaptureFrame::new(jpeg, mic_db, now_ms)?)
    }

    /// Feeds one loudness score into the disturbance tracker.
    ///
    /// # Errors
    /// Propagates backend errors when a recording cannot be started.
    pub fn observe_loudness(
        &mut self,
        mic_db: i32,
        now_ms: u64,
    ) -> Result<LoudnessOutcome, CaptureError> {
        if mic_db < self.config.disturbance_threshold_db {
            return Ok(LoudnessOutcome::Quiet);
        }

        self.disturbances = self.disturbances.saturating_add(1);
        let count = self.disturbances;
        if self.recording_started_at_ms.is_none()
            && count >= self.config.disturbance_recording_after
        {
            self.backend.start_recording()?;
            self.recording_started_at_ms = Some(now_ms);
            return Ok(LoudnessOutcome::RecordingStarted { count });
        }

        Ok(LoudnessOutcome::Disturbance { count })
    }

    /// Returns the finished recording once its window has elapsed.
    ///
    /// The disturbance counter resets when a recording is handed out.
    ///
    /// # Errors
    /// Propagates backend errors from stopping the recording.
    pub fn poll_recording(&mut self, now_ms: u64) -> Result<Option<AudioClip>, CaptureError> {
        let Some(started_at_ms) = self.recording_started_at_ms else {
            return Ok(None);
        };
        if now_ms.saturating_sub(started_at_ms) < self.config.recording_duration_ms {
            return Ok(None);
        }

        self.recording_started_at_ms = None;
        self.disturbances = 0;
        let bytes = self.backend.finish_recording()?;
        Ok(Some(AudioClip {
            bytes,
            started_at_ms,
            duration_ms: now_ms.saturating_sub(started_at_ms),
        }))
    }

    /// Returns `true` while a disturbance recording is buffering.
    pub fn is_recording(&self) -> bool {
        self.recording_started_at_ms.is_some()
    }

    /// Returns disturbances counted since the last recording.
    pub fn disturbance_count(&self) -> u32 {
        self.disturbances
    }

    /// Releases device handles. Safe to call more than once.
    pub fn release(&mut self) {
        if self.recording_started_at_ms.take().is_some() {
            let _ = self.backend.finish_recording();
        }
        self.stream = None;
        self.backend.release();
    }
}

impl Drop for CaptureAgent {
    fn drop(&mut self) {
        self.release();
    }
}

/// Encodes an RGBA frame as baseline JPEG.
///
/// # Errors
/// Returns [`CaptureError::Encode`] when the encoder rejects the input.
pub fn encode_jpeg(frame: &RawVideoFrame, quality: u8) -> Result<Vec<u8>, CaptureError> {
    let rgb: Vec<u8> = frame
        .rgba
        .chunks_exact(4)
        .flat_map(|pixel| [pixel[0], pixel[1], pixel[2]])
        .collect();

    let mut jpeg = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100));
        encoder
            .encode(&rgb, frame.width, frame.height, ExtendedColorType::Rgb8)
            .map_err(|error| CaptureError::Encode(error.to_string()))?;
    }
    Ok(jpeg)
}

/// Counters shared between a [`SyntheticMediaBackend`] and its creator.
#[derive(Debug, Default)]
pub struct SyntheticUsage {
    frames: AtomicU64,
    recordings: AtomicU64,
    released: AtomicBool,
}

impl SyntheticUsage {
    /// Frames grabbed so far.
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::SeqCst)
    }

    /// Recordings finished so far.
    pub fn recordings(&self) -> u64 {
        self.recordings.load(Ordering::SeqCst)
    }

    /// Whether the backend released its devices.
    pub fn released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

/// Deterministic synthetic backend for test and CI usage.
#[derive(Debug)]
pub struct SyntheticMediaBackend {
    width: u32,
    height: u32,
    deny_permission: bool,
    amplitudes: Vec<f32>,
    sequence: u64,
    acquired: bool,
    recording: bool,
    usage: Arc<SyntheticUsage>,
}

impl SyntheticMediaBackend {
    /// Creates a quiet 8x8 backend that grants permission.
    pub fn new() -> Self {
        Self {
            width: 8,
            height: 8,
            deny_permission: false,
            amplitudes: vec![0.0],
            sequence: 0,
            acquired: false,
            recording: false,
            usage: Arc::new(SyntheticUsage::default()),
        }
    }

    /// Makes [`MediaBackend::acquire`] fail with `PermissionDenied`.
    pub fn denying_permission(mut self) -> Self {
        self.deny_permission = true;
        self
    }

    /// Cycles through the given noise amplitudes, one per audio sample call.
    pub fn with_amplitudes(mut self, amplitudes: Vec<f32>) -> Self {
        if !amplitudes.is_empty() {
            self.amplitudes = amplitudes;
        }
        self
    }

    /// Returns the shared counters for this backend.
    pub fn usage(&self) -> Arc<SyntheticUsage> {
        Arc::clone(&self.usage)
    }
}

impl Default for SyntheticMediaBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaBackend for SyntheticMediaBackend {
    fn acquire(&mut self) -> Result<StreamInfo, CaptureError> {
        if self.deny_permission {
            return Err(CaptureError::PermissionDenied(
                "synthetic backend configured to deny camera access".to_string(),
            ));
        }
        self.acquired = true;
        Ok(StreamInfo {
            video_width: self.width,
            video_height: self.height,
            audio_sample_rate: 48_000,
        })
    }

    fn grab_video_frame(&mut self) -> Result<RawVideoFrame, CaptureError> {
        if !self.acquired {
            return Err(CaptureError::NotAcquired);
        }
        self.sequence += 1;
        self.usage.frames.fetch_add(1, Ordering::SeqCst);

        let byte = (self.sequence % 255) as u8;
        let rgba_len = required_rgba_len(self.width, self.height)?;
        RawVideoFrame::new(self.width, self.height, vec![byte; rgba_len])
    }

    fn sample_audio(&mut self) -> Result<Vec<f32>, CaptureError> {
        if !self.acquired {
            return Err(CaptureError::NotAcquired);
        }
        let index = (self.sequence as usize) % self.amplitudes.len();
        Ok(synthetic_noise(
            self.amplitudes[index],
            loudness::MAX_WINDOW,
            self.sequence,
        ))
    }

    fn start_recording(&mut self) -> Result<(), CaptureError> {
        if !self.acquired {
            return Err(CaptureError::NotAcquired);
        }
        self.recording = true;
        Ok(())
    }

    fn finish_recording(&mut self) -> Result<Vec<u8>, CaptureError> {
        if !self.recording {
            return Err(CaptureError::Backend("no recording in progress".to_string()));
        }
        self.recording = false;
        self.usage.recordings.fetch_add(1, Ordering::SeqCst);
        Ok(format!("synthetic-audio-{}", self.sequence).into_bytes())
    }

    fn release(&mut self) {
        self.acquired = false;
        self.recording = false;
        self.usage.released.store(true, Ordering::SeqCst);
    }
}

/// Capture layer error type.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Camera or microphone access was refused.
    #[error("media permission denied: {0}")]
    PermissionDenied(String),
    /// Capture attempted before devices were acquired.
    #[error("media devices have not been acquired")]
    NotAcquired,
    /// Capture configuration is invalid.
    #[error("invalid capture config: {0}")]
    InvalidConfig(String),
    /// JPEG encoding failed.
    #[error("jpeg encoding failed: {0}")]
    Encode(String),
    /// Backend runtime failure.
    #[error("media backend failure: {0}")]
    Backend(String),
    /// Core validation failure.
    #[error(transparent)]
    Core(#[from] CoreError),
}
