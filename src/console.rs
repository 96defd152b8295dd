//! Console stand-in for the speech recognizer
//!
//! While capture is running, each typed line is delivered as the recognizer's
//! final result.

use parking_lot::Mutex;
use std::sync::Arc;
use tertulia::services::TranscriptionSource;
use tertulia::{EventSink, Generation, Result};

#[derive(Clone, Default)]
pub struct ConsoleTranscription {
    active: Arc<Mutex<Option<(Generation, EventSink)>>>,
}

impl ConsoleTranscription {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a typed line; returns false when capture is not running
    pub fn deliver(&self, line: &str) -> bool {
        match self.active.lock().as_ref() {
            Some((generation, sink)) => sink.transcript(*generation, line, true),
            None => false,
        }
    }
}

impl TranscriptionSource for ConsoleTranscription {
    fn check_and_request_permission(&mut self) -> bool {
        true
    }

    fn start(&mut self, generation: Generation, sink: EventSink) -> Result<()> {
        sink.listening_changed(generation, true);
        *self.active.lock() = Some((generation, sink));
        println!("(listening, type what you say)");
        Ok(())
    }

    /// Typed input has no pending final result, so capture ends at once
    fn stop(&mut self) {
        if let Some((generation, sink)) = self.active.lock().take() {
            sink.listening_changed(generation, false);
        }
    }
}
