//! Messages flowing into and out of the orchestrator
//!
//! Collaborators never touch session state. They report back through an
//! `EventSink`, and every report is handled in order on the orchestrator's own
//! thread.

use crate::error::{ErrorKind, SessionError};
use crossbeam_channel::{Receiver, Sender};
use tracing::debug;

/// Monotonic token tagging every capture, chat stream and playback request
///
/// A report carrying a generation other than the one the current phase holds
/// is stale and gets dropped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "gen#{}", self.0)
    }
}

/// Reports from the transcription source, chat pump and speech playback
#[derive(Clone, Debug)]
pub enum SessionEvent {
    /// Partial or final recognizer output
    Transcript {
        generation: Generation,
        text: String,
        is_final: bool,
    },
    /// Recognizer listening state changed
    ListeningChanged {
        generation: Generation,
        listening: bool,
    },
    /// Recognizer or capture hardware failed
    CaptureFailed {
        generation: Generation,
        error: SessionError,
    },
    /// Chat stream produced a chunk
    ChatChunk { generation: Generation, chunk: String },
    /// Chat stream ended cleanly
    ChatCompleted { generation: Generation },
    /// Chat stream failed or went quiet for too long
    ChatFailed {
        generation: Generation,
        error: SessionError,
    },
    /// Playback ended, successfully or not
    PlaybackFinished {
        generation: Generation,
        result: Result<(), SessionError>,
    },
    /// Microphone permission was granted outside the app flow
    PermissionGranted,
}

impl SessionEvent {
    pub fn generation(&self) -> Option<Generation> {
        match self {
            SessionEvent::Transcript { generation, .. }
            | SessionEvent::ListeningChanged { generation, .. }
            | SessionEvent::CaptureFailed { generation, .. }
            | SessionEvent::ChatChunk { generation, .. }
            | SessionEvent::ChatCompleted { generation }
            | SessionEvent::ChatFailed { generation, .. }
            | SessionEvent::PlaybackFinished { generation, .. } => Some(*generation),
            SessionEvent::PermissionGranted => None,
        }
    }
}

/// OS audio-session interruption notifications
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interruption {
    Began,
    Ended,
}

/// Requests from the presentation layer
#[derive(Clone, Debug)]
pub enum SessionCommand {
    /// Microphone button
    ToggleListening,
    /// Typed message, bypassing the recognizer
    SendText(String),
    /// Speak the most recent reply again
    SpeakLastMessage,
    /// Clear the error banner
    DismissError,
    /// Stop all activity and close the session
    Finalize,
    /// Finalize, then stop the orchestrator thread
    Shutdown,
}

/// Notifications for the presentation layer
///
/// State should be read from `SharedViewState`; these only say when to look.
#[derive(Clone, Debug, PartialEq)]
pub enum ViewEvent {
    StateChanged,
    /// Streamed reply text, for incremental rendering
    ReplyChunk(String),
    Error(ErrorKind),
    Finalized,
    Shutdown,
}

/// Cloneable reporting endpoint handed to collaborators
#[derive(Clone, Debug)]
pub struct EventSink {
    events: Sender<SessionEvent>,
    interruptions: Sender<Interruption>,
}

impl EventSink {
    pub fn new(events: Sender<SessionEvent>, interruptions: Sender<Interruption>) -> Self {
        Self {
            events,
            interruptions,
        }
    }

    /// Create a sink with unbounded channels, returning the receiving ends
    pub fn channel() -> (Self, Receiver<SessionEvent>, Receiver<Interruption>) {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        let (interrupt_tx, interrupt_rx) = crossbeam_channel::unbounded();
        (Self::new(events_tx, interrupt_tx), events_rx, interrupt_rx)
    }

    /// Deliver an event; returns false once the orchestrator is gone
    pub fn send(&self, event: SessionEvent) -> bool {
        match self.events.send(event) {
            Ok(()) => true,
            Err(e) => {
                debug!("Orchestrator gone, dropping {:?}", e.0);
                false
            }
        }
    }

    pub fn transcript(
        &self,
        generation: Generation,
        text: impl Into<String>,
        is_final: bool,
    ) -> bool {
        self.send(SessionEvent::Transcript {
            generation,
            text: text.into(),
            is_final,
        })
    }

    pub fn listening_changed(&self, generation: Generation, listening: bool) -> bool {
        self.send(SessionEvent::ListeningChanged {
            generation,
            listening,
        })
    }

    pub fn capture_failed(&self, generation: Generation, error: SessionError) -> bool {
        self.send(SessionEvent::CaptureFailed { generation, error })
    }

    pub fn chat_chunk(&self, generation: Generation, chunk: impl Into<String>) -> bool {
        self.send(SessionEvent::ChatChunk {
            generation,
            chunk: chunk.into(),
        })
    }

    pub fn chat_completed(&self, generation: Generation) -> bool {
        self.send(SessionEvent::ChatCompleted { generation })
    }

    pub fn chat_failed(&self, generation: Generation, error: SessionError) -> bool {
        self.send(SessionEvent::ChatFailed { generation, error })
    }

    pub fn playback_finished(
        &self,
        generation: Generation,
        result: Result<(), SessionError>,
    ) -> bool {
        self.send(SessionEvent::PlaybackFinished { generation, result })
    }

    pub fn permission_granted(&self) -> bool {
        self.send(SessionEvent::PermissionGranted)
    }

    /// Report an OS interruption; handled ahead of every queued event
    pub fn interruption(&self, interruption: Interruption) -> bool {
        self.interruptions.send(interruption).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_ordering() {
        let first = Generation::default();
        let second = first.next();
        assert!(second > first);
        assert_eq!(second.value(), 1);
        assert_eq!(second.to_string(), "gen#1");
    }

    #[test]
    fn test_sink_delivers_in_order() {
        let (sink, events, _interruptions) = EventSink::channel();
        let generation = Generation::new(3);
        sink.chat_chunk(generation, "Cla");
        sink.chat_chunk(generation, "ro");
        sink.chat_completed(generation);

        let received: Vec<_> = events.try_iter().collect();
        assert_eq!(received.len(), 3);
        assert!(matches!(&received[0], SessionEvent::ChatChunk { chunk, .. } if chunk == "Cla"));
        assert!(matches!(&received[1], SessionEvent::ChatChunk { chunk, .. } if chunk == "ro"));
        assert_eq!(received[2].generation(), Some(generation));
    }

    #[test]
    fn test_sink_reports_disconnect() {
        let (sink, events, interruptions) = EventSink::channel();
        drop(events);
        drop(interruptions);
        assert!(!sink.chat_completed(Generation::default()));
        assert!(!sink.interruption(Interruption::Began));
    }
}
