//! littletask-core - record and replay mouse and keyboard input
//!
//! Captures input through a listen-only system hook as a timestamped
//! [`ActionSequence`], and replays it at scaled, drift-free timing with
//! mid-run cancellation.
//!
//! ## Platform Support
//!
//! - **macOS**: CGEventTap capture, CGEvent synthesis
//! - **Other targets**: the state machine works, capture reports
//!   `CaptureUnavailable`
//!
//! ## Quick Start
//!
//! ```no_run
//! use littletask_core::prelude::*;
//!
//! let session = Session::native(RecorderConfig::default());
//! session.start_recording()?;
//! std::thread::sleep(std::time::Duration::from_secs(5));
//! session.stop_recording();
//!
//! session.start_playback(2.0)?;
//! # Ok::<(), littletask_core::Error>(())
//! ```

pub mod action;
pub mod capture;
pub mod error;
pub mod platform;
pub mod playback;
pub mod session;
pub mod storage;

pub use action::{Action, ActionKind, ActionSequence, Input, MouseButton};
pub use capture::{ActionSink, CaptureBackend, InputRecorder, PermissionStatus, RecorderConfig};
pub use error::{Error, ErrorCode, Result};
pub use playback::{PlaybackHandle, PlaybackOutcome, PlaybackReport, Replayer, Synthesizer};
pub use session::{Session, SessionState, StatusUpdate};
pub use storage::RecordingStorage;

pub mod prelude {
    pub use crate::action::{Action, ActionKind, ActionSequence, Input, MouseButton};
    pub use crate::capture::{PermissionStatus, RecorderConfig};
    pub use crate::error::{Error, Result};
    pub use crate::playback::{PlaybackOutcome, PlaybackReport};
    pub use crate::session::{Session, SessionState, StatusUpdate};
    pub use crate::storage::RecordingStorage;
}
