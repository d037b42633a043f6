//! Capture tick: frame, loudness, disturbance upload and verdict submission.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, select, tick};
use sentinel_capture::{CaptureAgent, LoudnessOutcome};
use sentinel_contract::parse_capture_verdict;
use sentinel_core::{MonitoringSession, ViolationCategory, ViolationEvent, ViolationSource};
use sentinel_transport::{AudioUpload, CaptureSubmission, MonitoringTransport};
use sentinel_ui::Stage;
use tracing::{debug, info, warn};

use crate::aggregator::Input;
use crate::now_ms;
use crate::pause::ScheduleGate;
use crate::runtime::Signal;

/// Runs one capture tick and returns the signals it produced.
///
/// Nothing runs unless the gate allows capture. The submission itself is
/// issued only under a [`SubmissionPermit`](crate::pause::SubmissionPermit),
/// and the resulting verdict carries the permit's epoch.
pub fn capture_tick(
    agent: &mut CaptureAgent,
    session: &MonitoringSession,
    transport: &dyn MonitoringTransport,
    gate: &Arc<ScheduleGate>,
    now_ms: u64,
) -> Vec<Signal> {
    let mut signals = Vec::new();
    if !gate.capture_allowed() {
        return signals;
    }

    let frame = match agent.capture_frame(now_ms) {
        Ok(frame) => frame,
        Err(error) => {
            warn!(stage = "capture", action = "frame_failed", %error);
            signals.push(failure("capture", error.to_string()));
            return signals;
        }
    };

    match agent.observe_loudness(frame.mic_db, now_ms) {
        Ok(LoudnessOutcome::Quiet) => {}
        Ok(LoudnessOutcome::Disturbance { count } | LoudnessOutcome::RecordingStarted { count }) => {
            debug!(stage = "capture", action = "disturbance", count, mic_db = frame.mic_db);
            signals.push(Signal::Input(Input::Violation(ViolationEvent::new(
                ViolationCategory::VoiceDisturbance,
                "Background noise detected. Please keep quiet.",
                now_ms,
                ViolationSource::Local,
            ))));
        }
        Err(error) => warn!(stage = "capture", action = "recording_failed", %error),
    }

    match agent.poll_recording(now_ms) {
        Ok(Some(clip)) => {
            let upload = AudioUpload::new(session, clip.bytes);
            if let Err(error) = transport.upload_audio(&upload) {
                warn!(stage = "audio_upload", action = "failed", %error);
                signals.push(failure("audio_upload", error.to_string()));
            } else {
                info!(stage = "audio_upload", action = "sent", duration_ms = clip.duration_ms);
            }
        }
        Ok(None) => {}
        Err(error) => warn!(stage = "capture", action = "recording_failed", %error),
    }

    let Some(permit) = gate.begin_submission() else {
        debug!(stage = "capture", action = "submission_skipped");
        return signals;
    };

    let submission = CaptureSubmission::from_frame(session, &frame);
    match transport.submit_capture(&submission) {
        Ok(raw) => match parse_capture_verdict(&raw) {
            Ok(verdict) => signals.push(Signal::Verdict {
                verdict,
                epoch: permit.epoch(),
            }),
            Err(error) => {
                warn!(stage = "verdict", action = "decode_failed", %error);
                signals.push(failure("verdict", error.to_string()));
            }
        },
        Err(error) => {
            warn!(stage = "capture_submit", action = "failed", %error);
            signals.push(failure("capture_submit", error.to_string()));
        }
    }
    drop(permit);

    signals
}

fn failure(step: &'static str, detail: String) -> Signal {
    Signal::Input(Input::TransientFailure {
        stage: Stage::Capture,
        step,
        detail,
    })
}

/// Owned state of the capture thread.
pub(crate) struct CaptureContext {
    pub(crate) agent: CaptureAgent,
    pub(crate) session: MonitoringSession,
    pub(crate) transport: Arc<dyn MonitoringTransport>,
    pub(crate) gate: Arc<ScheduleGate>,
    pub(crate) bus: Sender<Signal>,
    pub(crate) stop: Receiver<()>,
}

/// Spawns the capture thread. The thread releases the media devices on exit.
pub(crate) fn spawn_capture(
    interval: Duration,
    context: CaptureContext,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("sentinel-capture".to_string())
        .spawn(move || run_capture(interval, context))
}

fn run_capture(interval: Duration, mut context: CaptureContext) {
    let ticker = tick(interval);
    info!(stage = "capture", action = "start", interval_ms = interval.as_millis() as u64);

    'ticks: loop {
        select! {
            recv(context.stop) -> _ => break,
            recv(ticker) -> _ => {
                if context.gate.is_stopped() {
                    break;
                }
                let signals = capture_tick(
                    &mut context.agent,
                    &context.session,
                    context.transport.as_ref(),
                    &context.gate,
                    now_ms(),
                );
                for signal in signals {
                    if context.bus.send(signal).is_err() {
                        break 'ticks;
                    }
                }
            }
        }
    }

    context.agent.release();
    info!(stage = "capture", action = "released");
}
