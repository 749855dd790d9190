//! Structured errors
//!
//! Every failure path in the recorder maps to one [`ErrorCode`] so front ends
//! can react (prompt for permissions, retry, show a decode message) without
//! parsing strings.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The OS refused to install the input hook
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The hook could not be installed for any other reason
    #[error("capture unavailable: {0}")]
    CaptureUnavailable(String),

    /// Playback speed must be finite and greater than zero
    #[error("invalid playback speed {0}: must be a finite number greater than zero")]
    InvalidSpeed(f64),

    /// An encoded action is inconsistent with its type
    #[error("malformed action at index {index}: {reason}")]
    MalformedAction { index: usize, reason: String },

    /// The encoded recording is not structurally valid JSON for the format
    #[error("failed to decode recording: {0}")]
    Decode(#[from] serde_json::Error),

    /// A single input event could not be synthesized
    #[error("failed to synthesize {action}: {reason}")]
    Synthesis { action: &'static str, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    PermissionDenied,
    CaptureUnavailable,
    InvalidSpeed,
    MalformedAction,
    DecodeFailed,
    SynthesisFailed,
    Io,
}

impl Error {
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied(message.into())
    }

    pub fn capture_unavailable(message: impl Into<String>) -> Self {
        Self::CaptureUnavailable(message.into())
    }

    pub fn malformed(index: usize, reason: impl Into<String>) -> Self {
        Self::MalformedAction {
            index,
            reason: reason.into(),
        }
    }

    pub fn synthesis(action: &'static str, reason: impl Into<String>) -> Self {
        Self::Synthesis {
            action,
            reason: reason.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::PermissionDenied(_) => ErrorCode::PermissionDenied,
            Self::CaptureUnavailable(_) => ErrorCode::CaptureUnavailable,
            Self::InvalidSpeed(_) => ErrorCode::InvalidSpeed,
            Self::MalformedAction { .. } => ErrorCode::MalformedAction,
            Self::Decode(_) => ErrorCode::DecodeFailed,
            Self::Synthesis { .. } => ErrorCode::SynthesisFailed,
            Self::Io(_) => ErrorCode::Io,
        }
    }

    /// Whether the failure came from reading a recording (bad file contents)
    pub fn is_decode_error(&self) -> bool {
        matches!(self, Self::MalformedAction { .. } | Self::Decode(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_serialize_screaming() {
        let json = serde_json::to_string(&ErrorCode::MalformedAction).unwrap();
        assert_eq!(json, "\"MALFORMED_ACTION\"");
    }

    #[test]
    fn test_malformed_display_names_index() {
        let err = Error::malformed(3, "keyPress must not carry x");
        assert_eq!(
            err.to_string(),
            "malformed action at index 3: keyPress must not carry x"
        );
        assert_eq!(err.code(), ErrorCode::MalformedAction);
        assert!(err.is_decode_error());
    }

    #[test]
    fn test_speed_error_is_not_decode() {
        let err = Error::InvalidSpeed(0.0);
        assert_eq!(err.code(), ErrorCode::InvalidSpeed);
        assert!(!err.is_decode_error());
    }
}
