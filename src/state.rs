//! View-state for the presentation layer
//!
//! `SessionViewState` is a pure projection of the session and the orchestrator
//! phase. The orchestrator publishes a fresh projection into `SharedViewState`
//! after every handled message; the UI only reads it.

use crate::error::ErrorKind;
use crate::orchestrator::PhaseKind;
use crate::session::Message;
use parking_lot::RwLock;
use std::sync::Arc;

/// Everything the presentation layer renders
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionViewState {
    pub phase: PhaseKind,
    pub topic: String,
    pub messages: Vec<Message>,
    pub listening: bool,
    pub speaking: bool,
    pub processing: bool,
    /// Live recognizer text for the current capture
    pub transcript: String,
    pub permission_denied: bool,
    pub error: Option<ErrorKind>,
    /// Display text for `error`
    pub error_message: Option<String>,
    /// An OS interruption is in progress
    pub interrupted: bool,
}

impl SessionViewState {
    /// Check if nothing is running
    pub fn is_idle(&self) -> bool {
        !(self.listening || self.speaking || self.processing)
    }

    /// Text of the reply currently streaming, if any
    pub fn streaming_reply(&self) -> Option<&str> {
        self.messages
            .last()
            .filter(|m| m.status.is_streaming())
            .map(|m| m.text.as_str())
    }
}

/// Thread-safe published view-state
#[derive(Clone, Default)]
pub struct SharedViewState {
    inner: Arc<RwLock<SessionViewState>>,
}

impl SharedViewState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the published state
    pub fn publish(&self, state: SessionViewState) {
        *self.inner.write() = state;
    }

    /// Get a snapshot of current state (no lock held after return)
    pub fn snapshot(&self) -> SessionViewState {
        self.inner.read().clone()
    }

    // === Convenience read methods ===

    pub fn phase(&self) -> PhaseKind {
        self.inner.read().phase
    }

    pub fn is_listening(&self) -> bool {
        self.inner.read().listening
    }

    pub fn is_speaking(&self) -> bool {
        self.inner.read().speaking
    }

    pub fn is_processing(&self) -> bool {
        self.inner.read().processing
    }

    pub fn error(&self) -> Option<ErrorKind> {
        self.inner.read().error
    }

    pub fn message_count(&self) -> usize {
        self.inner.read().messages.len()
    }

    pub fn transcript(&self) -> String {
        self.inner.read().transcript.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_idle() {
        let state = SessionViewState::default();
        assert!(state.is_idle());
        assert_eq!(state.phase, PhaseKind::Idle);
        assert!(state.streaming_reply().is_none());
    }

    #[test]
    fn test_streaming_reply() {
        let mut placeholder = Message::placeholder();
        placeholder.text.push_str("Cla");
        let state = SessionViewState {
            processing: true,
            messages: vec![Message::user("Hola"), placeholder],
            ..Default::default()
        };
        assert!(!state.is_idle());
        assert_eq!(state.streaming_reply(), Some("Cla"));
    }

    #[test]
    fn test_snapshot_is_independent() {
        let shared = SharedViewState::new();
        let before = shared.snapshot();

        shared.publish(SessionViewState {
            phase: PhaseKind::Listening,
            listening: true,
            ..Default::default()
        });

        assert!(!before.listening);
        assert!(shared.is_listening());
        assert_eq!(shared.phase(), PhaseKind::Listening);
    }
}
