//! Targets without an input backend
//!
//! Everything still builds and the session state machine still works, but
//! installing the hook reports `CaptureUnavailable` and every synthesized
//! action is skipped.

use crate::action::Input;
use crate::capture::{ActionSink, CaptureBackend, PermissionStatus, RecorderConfig};
use crate::error::{Error, Result};
use crate::playback::Synthesizer;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;

#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedCapture;

impl CaptureBackend for UnsupportedCapture {
    fn permissions(&self) -> PermissionStatus {
        // Nothing to grant; failing later with CaptureUnavailable is more accurate
        PermissionStatus::GRANTED
    }

    fn spawn_hook(
        &self,
        _sink: ActionSink,
        _stop: Arc<AtomicBool>,
        _config: &RecorderConfig,
    ) -> Result<thread::JoinHandle<()>> {
        Err(Error::capture_unavailable(format!(
            "no input hook available on {}",
            std::env::consts::OS
        )))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedSynth;

impl Synthesizer for UnsupportedSynth {
    fn post(&self, input: &Input) -> Result<()> {
        Err(Error::synthesis(
            input.kind().as_str(),
            format!("input synthesis is not available on {}", std::env::consts::OS),
        ))
    }
}

pub type NativeCapture = UnsupportedCapture;
pub type NativeSynth = UnsupportedSynth;
