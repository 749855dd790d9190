//! Playback scheduler
//!
//! Replays a recording on a dedicated thread. Every action is due at an
//! absolute deadline (`start + timestamp / speed`), so rounding in one wait
//! never shifts the ones after it.
//!
//! Cancellation goes through a small gate shared with the playback thread.
//! The thread holds the gate while it checks the flag and synthesizes one
//! action, so once [`PlaybackHandle::cancel`] returns nothing else is posted,
//! and an action racing with the cancel is either posted whole or not at all.

use crate::action::{Action, ActionKind, ActionSequence, Input};
use crate::error::{Error, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, error, warn};

/// Turns actions back into OS input events
pub trait Synthesizer: Send + Sync {
    fn post(&self, input: &Input) -> Result<()>;
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackReport {
    pub clicks: usize,
    pub moves: usize,
    pub keys: usize,
    pub scrolls: usize,
    /// Actions the synthesizer failed to post
    pub skipped: usize,
}

impl PlaybackReport {
    fn record(&mut self, kind: ActionKind) {
        match kind {
            ActionKind::MouseClick => self.clicks += 1,
            ActionKind::MouseMove => self.moves += 1,
            ActionKind::KeyPress => self.keys += 1,
            ActionKind::Scroll => self.scrolls += 1,
        }
    }

    pub fn synthesized(&self) -> usize {
        self.clicks + self.moves + self.keys + self.scrolls
    }
}

/// How a playback run ended; produced exactly once per run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Completed(PlaybackReport),
    Cancelled(PlaybackReport),
}

impl PlaybackOutcome {
    pub fn report(&self) -> &PlaybackReport {
        match self {
            Self::Completed(r) | Self::Cancelled(r) => r,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

#[derive(Debug, Default)]
struct Gate {
    cancelled: bool,
    finished: bool,
}

/// Handle to a running playback; dropping it cancels the run
#[derive(Debug)]
pub struct PlaybackHandle {
    gate: Arc<Mutex<Gate>>,
    wake: Sender<()>,
    thread: Option<thread::JoinHandle<PlaybackOutcome>>,
}

impl PlaybackHandle {
    /// Stop the run. Returns false if it had already finished or been cancelled.
    pub fn cancel(&self) -> bool {
        let mut gate = self.gate.lock();
        if gate.finished || gate.cancelled {
            return false;
        }
        gate.cancelled = true;
        drop(gate);
        let _ = self.wake.try_send(());
        true
    }

    pub fn is_finished(&self) -> bool {
        self.gate.lock().finished
    }

    /// Block until the playback thread exits
    pub fn wait(mut self) -> PlaybackOutcome {
        let Some(thread) = self.thread.take() else {
            return PlaybackOutcome::Cancelled(PlaybackReport::default());
        };
        thread.join().unwrap_or_else(|_| {
            error!("playback thread panicked");
            PlaybackOutcome::Cancelled(PlaybackReport::default())
        })
    }
}

impl Drop for PlaybackHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Replays recordings through a [`Synthesizer`]
pub struct Replayer {
    synth: Arc<dyn Synthesizer>,
    speed: f64,
}

impl Replayer {
    pub fn new(synth: Arc<dyn Synthesizer>) -> Self {
        Self { synth, speed: 1.0 }
    }

    /// Set playback speed (1.0 = real-time, 2.0 = 2x speed)
    pub fn speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    pub fn play(&self, sequence: &ActionSequence) -> Result<PlaybackHandle> {
        self.play_with(sequence, |_| {})
    }

    /// Start playback; `on_finish` runs once on the playback thread with the outcome
    pub fn play_with<F>(&self, sequence: &ActionSequence, on_finish: F) -> Result<PlaybackHandle>
    where
        F: FnOnce(PlaybackOutcome) + Send + 'static,
    {
        if !(self.speed.is_finite() && self.speed > 0.0) {
            return Err(Error::InvalidSpeed(self.speed));
        }

        let actions = sequence.rescaled(self.speed);
        let gate = Arc::new(Mutex::new(Gate::default()));
        let (wake_tx, wake_rx) = bounded(1);
        let synth = self.synth.clone();
        let thread_gate = gate.clone();

        debug!(actions = actions.len(), speed = self.speed, "starting playback");
        let thread = thread::Builder::new()
            .name("littletask-playback".into())
            .spawn(move || {
                let outcome = run(&actions, synth.as_ref(), &thread_gate, &wake_rx);
                on_finish(outcome);
                outcome
            })?;

        Ok(PlaybackHandle {
            gate,
            wake: wake_tx,
            thread: Some(thread),
        })
    }
}

fn run(
    actions: &[Action],
    synth: &dyn Synthesizer,
    gate: &Mutex<Gate>,
    wake: &Receiver<()>,
) -> PlaybackOutcome {
    let start = Instant::now();
    let mut report = PlaybackReport::default();

    for (index, action) in actions.iter().enumerate() {
        if gate.lock().cancelled {
            break;
        }

        let deadline = action.offset().and_then(|d| start.checked_add(d));
        wait_until(deadline, wake);

        let guard = gate.lock();
        if guard.cancelled {
            break;
        }
        match synth.post(&action.input) {
            Ok(()) => report.record(action.kind()),
            Err(e) => {
                warn!(index, error = %e, "skipping action");
                report.skipped += 1;
            }
        }
        drop(guard);
    }

    let mut gate = gate.lock();
    gate.finished = true;
    let outcome = if gate.cancelled {
        PlaybackOutcome::Cancelled(report)
    } else {
        PlaybackOutcome::Completed(report)
    };
    debug!(?outcome, "playback finished");
    outcome
}

/// Sleep until `deadline` or until woken by a cancel; `None` waits for the cancel only
fn wait_until(deadline: Option<Instant>, wake: &Receiver<()>) {
    match deadline {
        Some(deadline) => {
            if let Err(RecvTimeoutError::Disconnected) = wake.recv_deadline(deadline) {
                debug!("playback handle dropped while waiting");
            }
        }
        None => {
            let _ = wake.recv();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::MouseButton;
    use assert_matches::assert_matches;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingSynth {
        posted: Mutex<Vec<(Instant, Input)>>,
        fail_keys: bool,
    }

    impl Synthesizer for RecordingSynth {
        fn post(&self, input: &Input) -> Result<()> {
            if self.fail_keys && matches!(input, Input::KeyPress { .. }) {
                return Err(Error::synthesis("keyPress", "no event source"));
            }
            self.posted.lock().push((Instant::now(), *input));
            Ok(())
        }
    }

    impl RecordingSynth {
        fn inputs(&self) -> Vec<Input> {
            self.posted.lock().iter().map(|(_, i)| *i).collect()
        }

        fn offsets(&self, start: Instant) -> Vec<f64> {
            self.posted
                .lock()
                .iter()
                .map(|(t, _)| t.duration_since(start).as_secs_f64())
                .collect()
        }
    }

    fn sequence(steps: &[(f64, Input)]) -> ActionSequence {
        let mut seq = ActionSequence::new();
        for (t, input) in steps {
            seq.push(Action::new(*t, *input)).unwrap();
        }
        seq
    }

    fn mv(x: f64) -> Input {
        Input::MouseMove { x, y: 10.0 }
    }

    #[test]
    fn test_speed_two_halves_offsets() {
        let synth = Arc::new(RecordingSynth::default());
        let click = Input::MouseClick {
            x: 10.0,
            y: 10.0,
            button: MouseButton::Left,
            is_down: true,
        };
        let seq = sequence(&[(0.0, mv(10.0)), (0.5, click)]);

        let start = Instant::now();
        let handle = Replayer::new(synth.clone()).speed(2.0).play(&seq).unwrap();
        let outcome = handle.wait();

        assert_matches!(outcome, PlaybackOutcome::Completed(r) if r.moves == 1 && r.clicks == 1);
        assert_eq!(synth.inputs(), vec![mv(10.0), click]);
        let offsets = synth.offsets(start);
        assert!(offsets[0] < 0.1, "move at {}", offsets[0]);
        assert!(offsets[1] >= 0.24 && offsets[1] < 0.4, "click at {}", offsets[1]);
    }

    #[test]
    fn test_invalid_speed_rejected_without_synthesis() {
        let synth = Arc::new(RecordingSynth::default());
        let seq = sequence(&[(0.0, mv(1.0))]);
        for speed in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let result = Replayer::new(synth.clone()).speed(speed).play(&seq);
            assert_matches!(result, Err(Error::InvalidSpeed(_)));
        }
        thread::sleep(Duration::from_millis(20));
        assert!(synth.inputs().is_empty());
    }

    #[test]
    fn test_empty_sequence_completes_immediately() {
        let synth = Arc::new(RecordingSynth::default());
        let start = Instant::now();
        let outcome = Replayer::new(synth.clone())
            .play(&ActionSequence::new())
            .unwrap()
            .wait();
        assert_eq!(outcome, PlaybackOutcome::Completed(PlaybackReport::default()));
        assert!(start.elapsed() < Duration::from_millis(200));
        assert!(synth.inputs().is_empty());
    }

    #[test]
    fn test_cancel_interrupts_wait_and_stops_synthesis() {
        let synth = Arc::new(RecordingSynth::default());
        let seq = sequence(&[(0.0, mv(1.0)), (0.02, mv(2.0)), (5.0, mv(3.0)), (5.1, mv(4.0))]);
        let handle = Replayer::new(synth.clone()).play(&seq).unwrap();

        thread::sleep(Duration::from_millis(150));
        let cancelled_at = Instant::now();
        assert!(handle.cancel());
        let posted_at_cancel = synth.inputs();
        let outcome = handle.wait();

        assert!(cancelled_at.elapsed() < Duration::from_secs(1));
        assert_matches!(outcome, PlaybackOutcome::Cancelled(r) if r.moves == 2);
        assert_eq!(posted_at_cancel, vec![mv(1.0), mv(2.0)]);
        assert_eq!(synth.inputs(), posted_at_cancel);
    }

    #[test]
    fn test_finish_signalled_once_and_late_cancel_is_noop() {
        let synth = Arc::new(RecordingSynth::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let seq = sequence(&[(0.0, mv(1.0)), (0.01, mv(2.0))]);

        let handle = Replayer::new(synth)
            .play_with(&seq, move |outcome| {
                assert!(!outcome.is_cancelled());
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        while !handle.is_finished() {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!handle.cancel());
        assert_matches!(handle.wait(), PlaybackOutcome::Completed(_));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_posts_are_skipped() {
        let synth = Arc::new(RecordingSynth {
            fail_keys: true,
            ..Default::default()
        });
        let key = Input::KeyPress {
            key_code: 12,
            is_down: true,
        };
        let seq = sequence(&[(0.0, key), (0.0, mv(5.0))]);
        let outcome = Replayer::new(synth.clone()).play(&seq).unwrap().wait();
        assert_eq!(outcome.report().skipped, 1);
        assert_eq!(outcome.report().synthesized(), 1);
        assert_eq!(synth.inputs(), vec![mv(5.0)]);
    }

    #[test]
    fn test_deadlines_do_not_drift() {
        let synth = Arc::new(RecordingSynth::default());
        let steps: Vec<(f64, Input)> = (0..40).map(|i| (i as f64 * 0.01, mv(i as f64))).collect();
        let seq = sequence(&steps);

        let start = Instant::now();
        Replayer::new(synth.clone()).speed(1.0).play(&seq).unwrap().wait();
        let offsets = synth.offsets(start);

        assert_eq!(offsets.len(), 40);
        for (i, offset) in offsets.iter().enumerate() {
            assert!(*offset >= i as f64 * 0.01 - 0.001, "action {} early at {}", i, offset);
        }
        assert!(offsets[39] < 0.39 + 0.15, "last action at {}", offsets[39]);
    }

    #[test]
    fn test_order_is_speed_independent() {
        let steps: Vec<(f64, Input)> = vec![
            (0.0, mv(1.0)),
            (0.04, Input::KeyPress { key_code: 1, is_down: true }),
            (0.04, Input::KeyPress { key_code: 1, is_down: false }),
            (0.08, Input::Scroll { x: 1.0, y: 1.0, delta_y: 2.0 }),
        ];
        let seq = sequence(&steps);

        let slow = Arc::new(RecordingSynth::default());
        Replayer::new(slow.clone()).play(&seq).unwrap().wait();
        let fast = Arc::new(RecordingSynth::default());
        Replayer::new(fast.clone()).speed(4.0).play(&seq).unwrap().wait();

        assert_eq!(slow.inputs(), fast.inputs());
        assert_eq!(fast.inputs().len(), 4);
    }
}
