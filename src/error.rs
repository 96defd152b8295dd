//! Error types for conversation sessions
//!
//! Errors raised by collaborators are folded into `SessionError`. The presentation
//! layer never sees these directly; it reads the projected `ErrorKind` from the
//! view-state instead.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Session errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Microphone or speech permission is missing
    #[error("Permission denied")]
    PermissionDenied,

    /// Capture hardware or recognizer failure
    #[error("Capture error: {0}")]
    Capture(String),

    /// Capture device or recognizer is unavailable altogether
    #[error("Capture unavailable: {0}")]
    CaptureUnavailable(String),

    /// Chat stream failure
    #[error("Network error: {0}")]
    Network(String),

    /// Speech synthesis failure
    #[error("Synthesis error: {0}")]
    Synthesis(String),

    /// Audio playback failure
    #[error("Playback error: {0}")]
    Playback(String),

    /// OS audio-session interruption
    #[error("Audio session interrupted")]
    Interrupted,

    /// Session store failure
    #[error("Store error: {0}")]
    Store(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Channel communication error
    #[error("Channel error: {0}")]
    Channel(String),

    /// File system I/O error
    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for SessionError {
    fn from(e: std::io::Error) -> Self {
        SessionError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(e: serde_json::Error) -> Self {
        SessionError::Store(e.to_string())
    }
}

/// Error categories surfaced on the view-state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    PermissionDenied,
    Capture,
    Network,
    Synthesis,
    Playback,
    Interruption,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::PermissionDenied => write!(f, "PermissionDenied"),
            ErrorKind::Capture => write!(f, "CaptureError"),
            ErrorKind::Network => write!(f, "NetworkError"),
            ErrorKind::Synthesis => write!(f, "SynthesisError"),
            ErrorKind::Playback => write!(f, "PlaybackError"),
            ErrorKind::Interruption => write!(f, "InterruptionError"),
            ErrorKind::Internal => write!(f, "InternalError"),
        }
    }
}

impl SessionError {
    /// Project onto the category shown to the presentation layer
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::PermissionDenied => ErrorKind::PermissionDenied,
            SessionError::Capture(_) | SessionError::CaptureUnavailable(_) => ErrorKind::Capture,
            SessionError::Network(_) => ErrorKind::Network,
            SessionError::Synthesis(_) => ErrorKind::Synthesis,
            SessionError::Playback(_) => ErrorKind::Playback,
            SessionError::Interrupted => ErrorKind::Interruption,
            SessionError::Store(_)
            | SessionError::Config(_)
            | SessionError::Channel(_)
            | SessionError::Io(_) => ErrorKind::Internal,
        }
    }

    /// Check if this error is recoverable
    ///
    /// Recoverable errors leave the session usable with an immediate retry.
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Permission is a state the user resolves in settings
            SessionError::PermissionDenied => false,
            SessionError::Capture(_) => true,
            // No recognizer or no input device
            SessionError::CaptureUnavailable(_) => false,
            SessionError::Network(_) => true,
            SessionError::Synthesis(_) => true,
            SessionError::Playback(_) => true,
            SessionError::Interrupted => true,
            // Store failures never stop the conversation
            SessionError::Store(_) => true,
            SessionError::Config(_) => false,
            SessionError::Channel(_) => false,
            SessionError::Io(_) => false,
        }
    }

    /// Get a user-friendly description of the error
    pub fn user_message(&self) -> String {
        match self {
            SessionError::PermissionDenied => {
                "Microphone access is needed. Please enable it in settings.".to_string()
            }
            SessionError::Capture(_) => "Speech recognition failed. Please try again.".to_string(),
            SessionError::CaptureUnavailable(_) => {
                "Speech recognition is not available on this device.".to_string()
            }
            SessionError::Network(_) => {
                "Network connection unstable. Please tap the microphone to try again.".to_string()
            }
            SessionError::Synthesis(_) | SessionError::Playback(_) => {
                "Could not play the reply aloud. You can still read it.".to_string()
            }
            SessionError::Interrupted => "Audio was interrupted.".to_string(),
            SessionError::Store(_) => "Could not save the conversation.".to_string(),
            SessionError::Config(_) => "Configuration error. Please check settings.".to_string(),
            SessionError::Channel(_) => {
                "Internal communication error. Please restart the application.".to_string()
            }
            SessionError::Io(_) => "File system error occurred.".to_string(),
        }
    }
}

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, SessionError>;
