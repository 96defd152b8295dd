//! Conversation session orchestrator
//!
//! Coordinates the transcription source, the chat stream, and speech playback
//! for one session:
//! - `machine`: phase transitions and session writes
//! - `pump`: chat streams on the orchestrator's tokio runtime
//! - `runner`: the orchestrator thread and its handle

pub mod events;
pub mod machine;
pub mod phase;
pub mod pump;
pub mod runner;

pub use events::{EventSink, Generation, Interruption, SessionCommand, SessionEvent, ViewEvent};
pub use machine::{Orchestrator, OrchestratorBuilder};
pub use phase::{InterruptedActivity, Phase, PhaseKind};
pub use runner::OrchestratorHandle;
