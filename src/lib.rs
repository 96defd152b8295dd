//! Tertulia - voice-driven conversation sessions
//!
//! A user speaks, the transcript goes to a remote chat service, the reply
//! streams back into the conversation and is spoken aloud. The orchestrator
//! keeps listening, waiting for a reply, and speaking mutually exclusive and
//! recovers from permission denial, network failure, and audio interruptions.

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod services;
pub mod session;
pub mod state;

pub use config::{BackendConfig, BackendEnvironment, SessionConfig};
pub use error::{ErrorKind, Result, SessionError};
pub use orchestrator::{
    EventSink, Generation, Interruption, Orchestrator, OrchestratorBuilder, OrchestratorHandle,
    Phase, PhaseKind, SessionCommand, SessionEvent, ViewEvent,
};
pub use session::{Message, MessageStatus, Sender, Session, SessionStore};
pub use state::{SessionViewState, SharedViewState};
