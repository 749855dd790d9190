//! Platform abstraction layer
//!
//! Each platform module provides `NativeCapture` and `NativeSynth`.

#[cfg(target_os = "macos")]
pub mod macos;

#[cfg(not(target_os = "macos"))]
pub mod fallback;

// Re-export the current platform
#[cfg(target_os = "macos")]
pub use macos as current;

#[cfg(not(target_os = "macos"))]
pub use fallback as current;
