//! Capture scheduling gate and stop switch.
//!
//! [`ScheduleGate`] is the scheduling latch: it decides whether a capture
//! tick may run and whether a new submission may be issued. It is separate
//! from the UI latch (`WarningState::dialog_open`), which the aggregator
//! owns. Both are driven from the same aggregator transition, so they never
//! disagree for longer than one effect batch.

use std::sync::{Arc, Mutex, MutexGuard};

use crossbeam_channel::{Receiver, Sender, bounded};
use tracing::debug;

/// Locks a mutex, recovering the guard if a panicking thread poisoned it.
pub(crate) fn lock_or_recover<'a, T>(lock: &'a Mutex<T>, context: &str) -> MutexGuard<'a, T> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            debug!(context, "mutex poisoned; recovering");
            poisoned.into_inner()
        }
    }
}

#[derive(Debug)]
struct GateState {
    enabled: bool,
    paused: bool,
    fullscreen: bool,
    stopped: bool,
    epoch: u64,
    in_flight: u32,
}

/// Shared scheduling state for the capture loop and feed pollers.
#[derive(Debug)]
pub struct ScheduleGate {
    state: Mutex<GateState>,
}

impl ScheduleGate {
    /// Creates a running gate. A disabled gate never allows capture or polling.
    pub fn new(enabled: bool) -> Self {
        Self {
            state: Mutex::new(GateState {
                enabled,
                paused: false,
                fullscreen: true,
                stopped: false,
                epoch: 0,
                in_flight: 0,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, GateState> {
        lock_or_recover(&self.state, "schedule gate")
    }

    /// Pauses capture and submission; returns the new epoch.
    ///
    /// Submissions issued before this call carry an older epoch.
    pub fn pause(&self) -> u64 {
        let mut state = self.state();
        state.paused = true;
        state.epoch += 1;
        state.epoch
    }

    /// Resumes capture. Returns `false` once the gate is stopped.
    pub fn resume(&self) -> bool {
        let mut state = self.state();
        if state.stopped {
            return false;
        }
        state.paused = false;
        true
    }

    /// Records the fullscreen state; capture only runs in fullscreen.
    pub fn set_fullscreen(&self, active: bool) {
        let mut state = self.state();
        if state.fullscreen && !active {
            state.epoch += 1;
        }
        state.fullscreen = active;
    }

    /// Stops the gate permanently.
    pub fn stop(&self) {
        let mut state = self.state();
        if !state.stopped {
            state.stopped = true;
            state.epoch += 1;
        }
    }

    /// Returns `true` when a capture tick may run.
    pub fn capture_allowed(&self) -> bool {
        let state = self.state();
        state.enabled && !state.paused && state.fullscreen && !state.stopped
    }

    /// Returns `true` when feed pollers may run. Polling continues while paused.
    pub fn polling_allowed(&self) -> bool {
        let state = self.state();
        state.enabled && !state.stopped
    }

    /// Takes a submission permit when capture is allowed.
    ///
    /// Checked under the same lock as [`ScheduleGate::pause`], so no permit
    /// is handed out between a pause and the matching resume.
    pub fn begin_submission(self: &Arc<Self>) -> Option<SubmissionPermit> {
        let mut state = self.state();
        if !(state.enabled && !state.paused && state.fullscreen && !state.stopped) {
            return None;
        }
        state.in_flight += 1;
        Some(SubmissionPermit {
            gate: Arc::clone(self),
            epoch: state.epoch,
        })
    }

    /// Returns `true` when `epoch` is still the current epoch.
    pub fn is_current(&self, epoch: u64) -> bool {
        self.state().epoch == epoch
    }

    /// Current epoch.
    pub fn epoch(&self) -> u64 {
        self.state().epoch
    }

    /// Returns `true` once stopped.
    pub fn is_stopped(&self) -> bool {
        self.state().stopped
    }

    /// Submissions currently holding a permit.
    pub fn in_flight(&self) -> u32 {
        self.state().in_flight
    }
}

/// Proof that one capture submission was issued while capture was allowed.
#[derive(Debug)]
pub struct SubmissionPermit {
    gate: Arc<ScheduleGate>,
    epoch: u64,
}

impl SubmissionPermit {
    /// Epoch at which the submission was issued.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

impl Drop for SubmissionPermit {
    fn drop(&mut self) {
        let mut state = self.gate.state();
        state.in_flight = state.in_flight.saturating_sub(1);
    }
}

/// One-shot broadcast used to stop workers and announce a published record.
///
/// Workers select on [`StopSwitch::receiver`]; firing drops the only sender,
/// which disconnects every receiver at once.
#[derive(Debug)]
pub struct StopSwitch {
    sender: Mutex<Option<Sender<()>>>,
    receiver: Receiver<()>,
}

impl StopSwitch {
    /// Creates an armed switch.
    pub fn new() -> Self {
        let (sender, receiver) = bounded(0);
        Self {
            sender: Mutex::new(Some(sender)),
            receiver,
        }
    }

    /// Receiver that disconnects when the switch fires.
    pub fn receiver(&self) -> Receiver<()> {
        self.receiver.clone()
    }

    /// Fires the switch. Idempotent.
    pub fn fire(&self) {
        lock_or_recover(&self.sender, "stop switch").take();
    }

    /// Returns `true` once fired.
    pub fn is_fired(&self) -> bool {
        lock_or_recover(&self.sender, "stop switch").is_none()
    }
}

impl Default for StopSwitch {
    fn default() -> Self {
        Self::new()
    }
}
