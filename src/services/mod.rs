//! Collaborator contracts and their concrete implementations
//!
//! The orchestrator depends only on the traits defined here. Each collaborator
//! runs its own concurrent work and reports back through an `EventSink`.

pub mod audio_session;
pub mod chat;
pub mod playback;
pub mod speech;

use crate::orchestrator::{EventSink, Generation};
use crate::session::Message;
use crate::Result;
use futures::future::BoxFuture;
use futures::stream::BoxStream;

pub use audio_session::{AudioRoute, AudioSession, NullAudioSession};
pub use chat::HttpChatClient;
#[cfg(feature = "audio-io")]
pub use playback::RodioPlayback;
pub use playback::SilentPlayback;
pub use speech::HttpSpeechSynthesizer;

/// Lazy sequence of reply chunks
pub type ChatStream = BoxStream<'static, Result<String>>;

/// Live speech recognizer
pub trait TranscriptionSource: Send {
    /// Check microphone and recognizer authorization, prompting if undetermined
    fn check_and_request_permission(&mut self) -> bool;

    /// Begin capture
    ///
    /// Transcripts, listening-state changes and failures for this run are
    /// reported through `sink` tagged with `generation`.
    fn start(&mut self, generation: Generation, sink: EventSink) -> Result<()>;

    /// Stop capture; idempotent
    fn stop(&mut self);
}

/// Remote chat service with streamed replies
pub trait ChatStreamClient: Send + Sync {
    /// Stream a reply to the ordered conversation `history`
    ///
    /// The stream does no work until polled and may be dropped mid-way.
    fn stream_reply(&self, history: Vec<Message>) -> ChatStream;
}

/// Text-to-speech backend producing encoded audio
pub trait SpeechSynthesizer: Send + Sync {
    fn synthesize(&self, text: &str) -> BoxFuture<'static, Result<Vec<u8>>>;
}

/// Speaks text aloud
pub trait SpeechPlayback: Send {
    /// Synthesize and start playing `text`
    ///
    /// Completion or failure is reported through `sink` as
    /// `PlaybackFinished` tagged with `generation`.
    fn synthesize_and_play(&mut self, text: &str, generation: Generation, sink: EventSink)
        -> Result<()>;

    /// Stop any playback; idempotent
    fn stop(&mut self);
}
