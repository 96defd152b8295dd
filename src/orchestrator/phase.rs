//! The orchestrator's single authoritative state tag

use super::events::Generation;
use crate::error::SessionError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An active recognizer run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaptureHandle {
    pub generation: Generation,
}

/// An open chat stream and the assistant message it writes into
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamHandle {
    pub generation: Generation,
    pub message_id: Uuid,
}

/// An active playback request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaybackHandle {
    pub generation: Generation,
    pub text: String,
    /// Message being read out; `None` for lines not in the transcript
    pub message_id: Option<Uuid>,
}

/// Listening, AwaitingReply and Speaking are variants of one enum, so at most
/// one of them holds at a time.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Phase {
    #[default]
    Idle,
    Listening(CaptureHandle),
    AwaitingReply(StreamHandle),
    Speaking(PlaybackHandle),
    PermissionBlocked,
    /// Capture cannot work on this device; retry is still allowed
    Faulted(SessionError),
}

impl Phase {
    pub fn kind(&self) -> PhaseKind {
        match self {
            Phase::Idle => PhaseKind::Idle,
            Phase::Listening(_) => PhaseKind::Listening,
            Phase::AwaitingReply(_) => PhaseKind::AwaitingReply,
            Phase::Speaking(_) => PhaseKind::Speaking,
            Phase::PermissionBlocked => PhaseKind::PermissionBlocked,
            Phase::Faulted(_) => PhaseKind::Faulted,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Phase::Idle)
    }

    /// Whether an audio or network activity is running
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Phase::Listening(_) | Phase::AwaitingReply(_) | Phase::Speaking(_)
        )
    }

    /// Phases from which a new activity may start without cancelling anything
    pub fn is_resting(&self) -> bool {
        matches!(self, Phase::Idle | Phase::Faulted(_))
    }

    /// Generation of the running activity, if any
    pub fn generation(&self) -> Option<Generation> {
        match self {
            Phase::Listening(h) => Some(h.generation),
            Phase::AwaitingReply(h) => Some(h.generation),
            Phase::Speaking(h) => Some(h.generation),
            _ => None,
        }
    }
}

/// Handle-free copy of the phase for the presentation layer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhaseKind {
    #[default]
    Idle,
    Listening,
    AwaitingReply,
    Speaking,
    PermissionBlocked,
    Faulted,
}

impl std::fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PhaseKind::Idle => write!(f, "Idle"),
            PhaseKind::Listening => write!(f, "Listening"),
            PhaseKind::AwaitingReply => write!(f, "AwaitingReply"),
            PhaseKind::Speaking => write!(f, "Speaking"),
            PhaseKind::PermissionBlocked => write!(f, "PermissionBlocked"),
            PhaseKind::Faulted => write!(f, "Faulted"),
        }
    }
}

/// Activity running when an OS interruption began
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InterruptedActivity {
    Listening,
    Speaking {
        text: String,
        message_id: Option<Uuid>,
    },
}
