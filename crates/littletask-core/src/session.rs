//! Automation session
//!
//! [`Session`] is the single owner of the current recording and of the
//! Idle / Recording / Playing state machine. It is built once at startup and
//! shared by reference with the front end; all of its state sits behind one
//! lock, so capture hand-off, playback completion and front-end calls are
//! serialized.
//!
//! Transitions that do not apply in the current state are ignored and report
//! `false`, the way a toggle button would behave.

use crate::action::ActionSequence;
use crate::capture::{CaptureBackend, InputRecorder, PermissionStatus, RecorderConfig};
use crate::error::{Error, Result};
use crate::playback::{PlaybackHandle, PlaybackOutcome, Replayer, Synthesizer};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Recording,
    Playing,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Recording => "recording",
            Self::Playing => "playing",
        };
        f.write_str(s)
    }
}

/// Published to subscribers after every transition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusUpdate {
    pub state: SessionState,
    pub status: String,
    pub actions: usize,
}

struct Inner {
    state: SessionState,
    status: String,
    actions: ActionSequence,
    recorder: InputRecorder,
    playback: Option<PlaybackHandle>,
    /// Incremented per playback so a stale completion cannot end a newer run
    run: u64,
    watchers: Vec<Sender<StatusUpdate>>,
}

impl Inner {
    fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
        debug!(state = %self.state, status = %self.status, "session status");
        let update = StatusUpdate {
            state: self.state,
            status: self.status.clone(),
            actions: self.actions.len(),
        };
        self.watchers.retain(|w| w.send(update.clone()).is_ok());
    }
}

pub struct Session {
    inner: Arc<Mutex<Inner>>,
    synth: Arc<dyn Synthesizer>,
}

impl Session {
    pub fn new(backend: impl CaptureBackend + 'static, synth: impl Synthesizer + 'static) -> Self {
        Self::with_config(backend, synth, RecorderConfig::default())
    }

    pub fn with_config(
        backend: impl CaptureBackend + 'static,
        synth: impl Synthesizer + 'static,
        config: RecorderConfig,
    ) -> Self {
        let inner = Inner {
            state: SessionState::Idle,
            status: "Ready".to_string(),
            actions: ActionSequence::new(),
            recorder: InputRecorder::new(Arc::new(backend), config),
            playback: None,
            run: 0,
            watchers: Vec::new(),
        };
        Self {
            inner: Arc::new(Mutex::new(inner)),
            synth: Arc::new(synth),
        }
    }

    /// Session wired to the current platform's hook and synthesizer
    pub fn native(config: RecorderConfig) -> Self {
        use crate::platform::current;
        Self::with_config(current::NativeCapture::default(), current::NativeSynth::default(), config)
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn status(&self) -> String {
        self.inner.lock().status.clone()
    }

    /// Snapshot of the current recording, including anything captured so far
    pub fn actions(&self) -> ActionSequence {
        let mut inner = self.inner.lock();
        pump_locked(&mut inner);
        inner.actions.clone()
    }

    pub fn action_count(&self) -> usize {
        let mut inner = self.inner.lock();
        pump_locked(&mut inner);
        inner.actions.len()
    }

    /// Receive a [`StatusUpdate`] for every transition from now on
    pub fn subscribe(&self) -> Receiver<StatusUpdate> {
        let (tx, rx) = unbounded();
        self.inner.lock().watchers.push(tx);
        rx
    }

    /// Move captured actions into the recording; call periodically while recording
    pub fn pump(&self) -> usize {
        pump_locked(&mut self.inner.lock())
    }

    /// Actions lost to a full capture queue in the current recording
    pub fn dropped(&self) -> u64 {
        self.inner.lock().recorder.dropped()
    }

    pub fn permissions(&self) -> PermissionStatus {
        self.inner.lock().recorder.check_permissions()
    }

    pub fn request_permissions(&self) -> PermissionStatus {
        self.inner.lock().recorder.request_permissions()
    }

    /// Refresh the status line from the permission probe; run at startup
    pub fn check_permissions(&self) -> bool {
        let mut inner = self.inner.lock();
        let granted = inner.recorder.check_permissions().input_monitoring;
        if inner.state == SessionState::Idle {
            if granted {
                inner.set_status("Ready");
            } else {
                inner.set_status(
                    "Input Monitoring permission required - grant access in System Settings > Privacy & Security",
                );
            }
        }
        granted
    }

    pub fn start_recording(&self) -> Result<bool> {
        let mut inner = self.inner.lock();
        if inner.state != SessionState::Idle {
            return Ok(false);
        }

        if !inner.recorder.check_permissions().input_monitoring {
            inner.set_status("Input Monitoring permission required");
            return Err(Error::permission_denied(
                "Input Monitoring access is required to record input",
            ));
        }

        if let Err(e) = inner.recorder.start() {
            match &e {
                Error::PermissionDenied(_) => inner.set_status("Input Monitoring permission required"),
                _ => inner.set_status(format!("Recording unavailable: {}", e)),
            }
            return Err(e);
        }

        inner.actions.clear();
        inner.state = SessionState::Recording;
        inner.set_status("Recording... Press Stop to finish");
        info!("recording started");
        Ok(true)
    }

    pub fn stop_recording(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != SessionState::Recording {
            return false;
        }

        let Inner { recorder, actions, .. } = &mut *inner;
        recorder.stop(actions);
        inner.state = SessionState::Idle;
        let n = inner.actions.len();
        inner.set_status(format!("Recording stopped - {} actions captured", n));
        info!(actions = n, "recording stopped");
        true
    }

    pub fn toggle_recording(&self) -> Result<bool> {
        match self.state() {
            SessionState::Recording => Ok(self.stop_recording()),
            _ => self.start_recording(),
        }
    }

    pub fn start_playback(&self, speed: f64) -> Result<bool> {
        if !(speed.is_finite() && speed > 0.0) {
            return Err(Error::InvalidSpeed(speed));
        }

        let mut inner = self.inner.lock();
        if inner.state != SessionState::Idle || inner.actions.is_empty() {
            return Ok(false);
        }

        inner.run += 1;
        let run = inner.run;
        let weak = Arc::downgrade(&self.inner);
        let handle = Replayer::new(self.synth.clone())
            .speed(speed)
            .play_with(&inner.actions, move |outcome| finish_playback(&weak, run, outcome))?;

        inner.playback = Some(handle);
        inner.state = SessionState::Playing;
        let n = inner.actions.len();
        inner.set_status(format!("Playing back {} actions at {}x...", n, speed));
        info!(actions = n, speed, "playback started");
        Ok(true)
    }

    pub fn stop_playback(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != SessionState::Playing {
            return false;
        }

        if let Some(handle) = inner.playback.take() {
            handle.cancel();
        }
        inner.state = SessionState::Idle;
        inner.set_status("Playback stopped");
        info!("playback stopped");
        true
    }

    pub fn toggle_playback(&self, speed: f64) -> Result<bool> {
        match self.state() {
            SessionState::Playing => Ok(self.stop_playback()),
            _ => self.start_playback(speed),
        }
    }

    pub fn clear_recording(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != SessionState::Idle {
            return false;
        }
        inner.actions.clear();
        inner.set_status("Recording cleared");
        true
    }

    /// Replace the recording with decoded `bytes`; on error nothing changes
    /// except the status line
    pub fn load_recording(&self, bytes: &[u8]) -> Result<bool> {
        let mut inner = self.inner.lock();
        if inner.state != SessionState::Idle {
            return Ok(false);
        }

        match ActionSequence::from_json(bytes) {
            Ok(actions) => {
                inner.actions = actions;
                let n = inner.actions.len();
                inner.set_status(format!("Loaded {} actions from file", n));
                Ok(true)
            }
            Err(e) => {
                warn!(error = %e, "rejected recording");
                inner.set_status(format!("Failed to load recording: {}", e));
                Err(e)
            }
        }
    }

    pub fn export_recording(&self) -> Result<Vec<u8>> {
        self.actions().to_json()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let mut inner = self.inner.lock();
        if let Some(handle) = inner.playback.take() {
            handle.cancel();
        }
        let Inner { recorder, actions, .. } = &mut *inner;
        recorder.stop(actions);
    }
}

fn pump_locked(inner: &mut Inner) -> usize {
    if inner.state != SessionState::Recording {
        return 0;
    }
    let Inner { recorder, actions, .. } = inner;
    recorder.drain(actions)
}

/// Runs on the playback thread when a run ends by itself
fn finish_playback(inner: &Weak<Mutex<Inner>>, run: u64, outcome: PlaybackOutcome) {
    let Some(inner) = inner.upgrade() else {
        return;
    };
    let mut inner = inner.lock();
    if inner.state != SessionState::Playing || inner.run != run {
        return;
    }

    inner.playback = None;
    inner.state = SessionState::Idle;
    let report = outcome.report();
    if report.skipped > 0 {
        inner.set_status(format!(
            "Playback complete - {} actions could not be replayed",
            report.skipped
        ));
    } else {
        inner.set_status("Playback complete");
    }
    info!(synthesized = report.synthesized(), skipped = report.skipped, "playback complete");
}
