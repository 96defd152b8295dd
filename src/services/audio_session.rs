//! Device audio-session routing
//!
//! Capture and playback share one device audio session. Only the orchestrator
//! changes its route.

use crate::Result;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AudioRoute {
    /// Microphone capture for the recognizer
    Capture,
    /// Speaker output for replies
    Playback,
}

pub trait AudioSession: Send {
    fn activate(&mut self, route: AudioRoute) -> Result<()>;

    fn deactivate(&mut self) -> Result<()>;
}

/// For platforms without a managed audio session
#[derive(Debug, Default)]
pub struct NullAudioSession {
    route: Option<AudioRoute>,
}

impl NullAudioSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&self) -> Option<AudioRoute> {
        self.route
    }
}

impl AudioSession for NullAudioSession {
    fn activate(&mut self, route: AudioRoute) -> Result<()> {
        debug!("Audio session route: {:?}", route);
        self.route = Some(route);
        Ok(())
    }

    fn deactivate(&mut self) -> Result<()> {
        self.route = None;
        Ok(())
    }
}
