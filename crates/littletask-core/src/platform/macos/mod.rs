//! macOS implementation
//!
//! Capture through a CGEventTap, replay through CGEventPost, permissions
//! through the Input Monitoring and Accessibility checks.

mod capture;
mod synth;

pub use capture::EventTapCapture;
pub use synth::EventPostSynth;

pub type NativeCapture = EventTapCapture;
pub type NativeSynth = EventPostSynth;
