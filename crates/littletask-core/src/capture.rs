//! Capture source
//!
//! A [`CaptureBackend`] installs the OS input hook on a thread of its own and
//! feeds translated inputs into an [`ActionSink`]. The sink stamps each input
//! with the time elapsed since recording started and pushes it onto a bounded
//! channel, which the owner of the recording drains in delivery order.

use crate::action::{Action, ActionSequence, Input};
use crate::error::{Error, Result};
pub use crossbeam_channel::{Receiver, Sender};
use crossbeam_channel::{bounded, TrySendError};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Recorder configuration
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Actions buffered between the hook thread and the consumer
    pub channel_capacity: usize,
    /// How long the hook thread runs its event loop between stop checks
    pub poll_interval: Duration,
    /// Pixels the pointer must travel before another move is recorded
    pub mouse_move_threshold: f64,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 10_000,
            poll_interval: Duration::from_millis(50),
            mouse_move_threshold: 0.0,
        }
    }
}

/// Permission status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PermissionStatus {
    pub accessibility: bool,
    pub input_monitoring: bool,
}

impl PermissionStatus {
    pub const GRANTED: Self = Self {
        accessibility: true,
        input_monitoring: true,
    };

    pub fn all_granted(&self) -> bool {
        self.accessibility && self.input_monitoring
    }
}

/// Platform hook that observes input without consuming it
pub trait CaptureBackend: Send + Sync {
    fn permissions(&self) -> PermissionStatus;

    /// Ask the OS to prompt the user for any missing permissions
    fn request_permissions(&self) -> PermissionStatus {
        self.permissions()
    }

    /// Install the hook on a dedicated thread.
    ///
    /// Returns once the hook is live, or with the installation error and no
    /// hook left behind. The thread must deliver into `sink` only until `stop`
    /// is set, and must exit soon after.
    fn spawn_hook(
        &self,
        sink: ActionSink,
        stop: Arc<AtomicBool>,
        config: &RecorderConfig,
    ) -> Result<thread::JoinHandle<()>>;
}

struct SinkState {
    last_move: Option<(f64, f64)>,
}

/// Hand-off point between the hook thread and the recording
#[derive(Clone)]
pub struct ActionSink {
    tx: Sender<Action>,
    start: Instant,
    move_threshold: f64,
    dropped: Arc<AtomicU64>,
    state: Arc<Mutex<SinkState>>,
}

impl ActionSink {
    fn new(tx: Sender<Action>, start: Instant, move_threshold: f64) -> Self {
        Self {
            tx,
            start,
            move_threshold,
            dropped: Arc::new(AtomicU64::new(0)),
            state: Arc::new(Mutex::new(SinkState { last_move: None })),
        }
    }

    /// Seconds since recording started
    pub fn elapsed(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Timestamp `input` and queue it. Never blocks.
    ///
    /// Returns false when the input was filtered out or the queue was full.
    pub fn emit(&self, input: Input) -> bool {
        // Stamping and sending under one lock keeps timestamps and queue order in step
        let mut state = self.state.lock();

        if let Input::MouseMove { x, y } = input {
            if let Some((lx, ly)) = state.last_move {
                let (dx, dy) = (x - lx, y - ly);
                if self.move_threshold > 0.0 && (dx * dx + dy * dy).sqrt() < self.move_threshold {
                    return false;
                }
            }
            state.last_move = Some((x, y));
        }

        let action = Action::new(self.elapsed(), input);
        match self.tx.try_send(action) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let n = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if n == 1 || n % 1000 == 0 {
                    warn!(dropped = n, "capture queue full, dropping actions");
                }
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Live hook: the stop flag, the receiving end of the queue and the hook thread
pub(crate) struct RecordingHandle {
    stop: Arc<AtomicBool>,
    actions_rx: Receiver<Action>,
    dropped: Arc<AtomicU64>,
    thread: Option<thread::JoinHandle<()>>,
}

impl RecordingHandle {
    /// Uninstall the hook and move everything still queued into `sequence`
    pub fn stop(mut self, sequence: &mut ActionSequence) -> usize {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(t) = self.thread.take() {
            if t.join().is_err() {
                warn!("capture thread panicked");
            }
        }
        self.drain(sequence)
    }

    pub fn drain(&self, sequence: &mut ActionSequence) -> usize {
        let mut n = 0;
        while let Ok(action) = self.actions_rx.try_recv() {
            match sequence.push(action) {
                Ok(()) => n += 1,
                Err(e) => warn!(error = %e, "discarding out-of-order action"),
            }
        }
        n
    }

    /// Actions lost because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for RecordingHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

/// Session-scoped capture source; at most one hook at a time
pub struct InputRecorder {
    backend: Arc<dyn CaptureBackend>,
    config: RecorderConfig,
    active: Option<RecordingHandle>,
    /// Drop count of the last finished recording
    last_dropped: u64,
}

impl InputRecorder {
    pub fn new(backend: Arc<dyn CaptureBackend>, config: RecorderConfig) -> Self {
        Self {
            backend,
            config,
            active: None,
            last_dropped: 0,
        }
    }

    pub fn check_permissions(&self) -> PermissionStatus {
        self.backend.permissions()
    }

    pub fn request_permissions(&self) -> PermissionStatus {
        self.backend.request_permissions()
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Install the hook. Returns `Ok(false)` if one is already installed.
    pub fn start(&mut self) -> Result<bool> {
        if self.active.is_some() {
            return Ok(false);
        }

        let perms = self.backend.permissions();
        if !perms.input_monitoring {
            return Err(Error::permission_denied(
                "Input Monitoring access is required to record input",
            ));
        }

        let (tx, rx) = bounded::<Action>(self.config.channel_capacity.max(1));
        let stop = Arc::new(AtomicBool::new(false));
        let sink = ActionSink::new(tx, Instant::now(), self.config.mouse_move_threshold);
        let dropped = sink.dropped.clone();

        let thread = self.backend.spawn_hook(sink, stop.clone(), &self.config)?;
        info!("input hook installed");
        self.last_dropped = 0;

        self.active = Some(RecordingHandle {
            stop,
            actions_rx: rx,
            dropped,
            thread: Some(thread),
        });
        Ok(true)
    }

    /// Move queued actions into `sequence` without stopping
    pub fn drain(&self, sequence: &mut ActionSequence) -> usize {
        self.active.as_ref().map_or(0, |h| h.drain(sequence))
    }

    /// Uninstall the hook. Returns `None` if nothing was recording.
    pub fn stop(&mut self, sequence: &mut ActionSequence) -> Option<usize> {
        let handle = self.active.take()?;
        let counter = handle.dropped.clone();
        let drained = handle.stop(sequence);
        // Read after the hook thread has exited so late drops are counted
        self.last_dropped = counter.load(Ordering::Relaxed);
        if self.last_dropped > 0 {
            warn!(dropped = self.last_dropped, "actions were dropped while recording");
        }
        debug!(drained, "input hook removed");
        Some(drained)
    }

    /// Actions dropped by the current recording, or by the last one once stopped
    pub fn dropped(&self) -> u64 {
        self.active
            .as_ref()
            .map_or(self.last_dropped, RecordingHandle::dropped)
    }
}
