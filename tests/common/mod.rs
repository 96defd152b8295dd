//! Fake collaborators shared by the integration tests
//!
//! Each fake is a cheap handle over shared state, so a test keeps one clone
//! for inspection and hands the other to the orchestrator.

#![allow(dead_code)]

use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tertulia::services::{
    AudioRoute, AudioSession, ChatStream, ChatStreamClient, SpeechPlayback, TranscriptionSource,
};
use tertulia::session::{MemoryStore, SessionStore};
use tertulia::{
    EventSink, Generation, Message, Orchestrator, Result, Session, SessionConfig, SessionError,
};

// === Transcription ===

#[derive(Default)]
struct TranscriptionLog {
    denied: bool,
    fail_next_start: Option<SessionError>,
    starts: Vec<Generation>,
    stops: usize,
    sink: Option<EventSink>,
}

#[derive(Clone, Default)]
pub struct FakeTranscription {
    log: Arc<Mutex<TranscriptionLog>>,
}

impl FakeTranscription {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn denied() -> Self {
        let source = Self::default();
        source.set_permitted(false);
        source
    }

    pub fn set_permitted(&self, permitted: bool) {
        self.log.lock().denied = !permitted;
    }

    pub fn fail_next_start(&self, error: SessionError) {
        self.log.lock().fail_next_start = Some(error);
    }

    pub fn starts(&self) -> usize {
        self.log.lock().starts.len()
    }

    pub fn stops(&self) -> usize {
        self.log.lock().stops
    }

    pub fn last_generation(&self) -> Generation {
        self.log.lock().starts.last().copied().unwrap_or_default()
    }

    /// Report a partial result for the latest capture
    pub fn partial(&self, text: &str) {
        self.report(|sink, generation| sink.transcript(generation, text, false));
    }

    /// Report a final result for the latest capture
    pub fn final_result(&self, text: &str) {
        self.report(|sink, generation| sink.transcript(generation, text, true));
    }

    /// Report that the latest capture ended
    pub fn end(&self) {
        self.report(|sink, generation| sink.listening_changed(generation, false));
    }

    /// Report a recognizer failure for the latest capture
    pub fn fail(&self, error: SessionError) {
        self.report(|sink, generation| sink.capture_failed(generation, error.clone()));
    }

    fn report(&self, send: impl Fn(&EventSink, Generation) -> bool) {
        let log = self.log.lock();
        let sink = log.sink.as_ref().expect("capture never started");
        let generation = *log.starts.last().expect("capture never started");
        assert!(send(sink, generation));
    }
}

impl TranscriptionSource for FakeTranscription {
    fn check_and_request_permission(&mut self) -> bool {
        !self.log.lock().denied
    }

    fn start(&mut self, generation: Generation, sink: EventSink) -> Result<()> {
        let mut log = self.log.lock();
        if let Some(error) = log.fail_next_start.take() {
            return Err(error);
        }
        log.starts.push(generation);
        log.sink = Some(sink);
        Ok(())
    }

    fn stop(&mut self) {
        self.log.lock().stops += 1;
    }
}

// === Chat ===

#[derive(Clone, Debug)]
pub enum Script {
    /// Yield these chunks, then complete
    Reply(Vec<&'static str>),
    /// Yield these chunks, then fail
    Fail(Vec<&'static str>, SessionError),
    /// Never yield anything
    Hang,
}

#[derive(Clone, Default)]
pub struct ScriptedChat {
    scripts: Arc<Mutex<VecDeque<Script>>>,
    histories: Arc<Mutex<Vec<Vec<Message>>>>,
}

impl ScriptedChat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(self, script: Script) -> Self {
        self.push(script);
        self
    }

    pub fn push(&self, script: Script) {
        self.scripts.lock().push_back(script);
    }

    /// History passed to each `stream_reply` call
    pub fn histories(&self) -> Vec<Vec<Message>> {
        self.histories.lock().clone()
    }

    pub fn requests(&self) -> usize {
        self.histories.lock().len()
    }
}

impl ChatStreamClient for ScriptedChat {
    fn stream_reply(&self, history: Vec<Message>) -> ChatStream {
        self.histories.lock().push(history);
        let script = self.scripts.lock().pop_front().unwrap_or(Script::Hang);
        match script {
            Script::Reply(chunks) => {
                stream::iter(chunks.into_iter().map(|c| Ok(c.to_string()))).boxed()
            }
            Script::Fail(chunks, error) => stream::iter(
                chunks
                    .into_iter()
                    .map(|c| Ok(c.to_string()))
                    .chain(std::iter::once(Err(error))),
            )
            .boxed(),
            Script::Hang => stream::pending().boxed(),
        }
    }
}

// === Playback ===

#[derive(Default)]
struct PlaybackLog {
    spoken: Vec<(String, Generation)>,
    stops: usize,
    sink: Option<EventSink>,
}

/// Records requests and finishes only when told to
#[derive(Clone, Default)]
pub struct RecordingPlayback {
    log: Arc<Mutex<PlaybackLog>>,
}

impl RecordingPlayback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spoken(&self) -> Vec<String> {
        self.log.lock().spoken.iter().map(|(t, _)| t.clone()).collect()
    }

    pub fn stops(&self) -> usize {
        self.log.lock().stops
    }

    /// Report the latest playback as finished
    pub fn finish(&self, result: Result<()>) {
        let log = self.log.lock();
        let sink = log.sink.as_ref().expect("nothing was played");
        let (_, generation) = log.spoken.last().expect("nothing was played");
        assert!(sink.playback_finished(*generation, result));
    }
}

impl SpeechPlayback for RecordingPlayback {
    fn synthesize_and_play(
        &mut self,
        text: &str,
        generation: Generation,
        sink: EventSink,
    ) -> Result<()> {
        let mut log = self.log.lock();
        log.spoken.push((text.to_string(), generation));
        log.sink = Some(sink);
        Ok(())
    }

    fn stop(&mut self) {
        self.log.lock().stops += 1;
    }
}

// === Audio session ===

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AudioCall {
    Activate(AudioRoute),
    Deactivate,
}

#[derive(Clone, Default)]
pub struct RecordingAudio {
    calls: Arc<Mutex<Vec<AudioCall>>>,
}

impl RecordingAudio {
    pub fn calls(&self) -> Vec<AudioCall> {
        self.calls.lock().clone()
    }

    /// Route after replaying every call
    pub fn route(&self) -> Option<AudioRoute> {
        self.calls.lock().iter().fold(None, |_, call| match call {
            AudioCall::Activate(route) => Some(*route),
            AudioCall::Deactivate => None,
        })
    }
}

impl AudioSession for RecordingAudio {
    fn activate(&mut self, route: AudioRoute) -> Result<()> {
        self.calls.lock().push(AudioCall::Activate(route));
        Ok(())
    }

    fn deactivate(&mut self) -> Result<()> {
        self.calls.lock().push(AudioCall::Deactivate);
        Ok(())
    }
}

// === Store ===

/// Rejects every write
#[derive(Clone, Default)]
pub struct FailingStore {
    attempts: Arc<Mutex<usize>>,
}

impl FailingStore {
    pub fn attempts(&self) -> usize {
        *self.attempts.lock()
    }
}

impl SessionStore for FailingStore {
    fn insert(&self, _message: &Message, _session: &Session) -> Result<()> {
        *self.attempts.lock() += 1;
        Err(SessionError::Store("disk full".into()))
    }

    fn save(&self, _session: &Session) -> Result<()> {
        *self.attempts.lock() += 1;
        Err(SessionError::Store("disk full".into()))
    }
}

// === Harness ===

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub source: FakeTranscription,
    pub chat: ScriptedChat,
    pub playback: RecordingPlayback,
    pub audio: RecordingAudio,
    pub store: MemoryStore,
}

pub fn test_config() -> SessionConfig {
    SessionConfig::default()
        .with_topic("Ordering food")
        .without_greeting()
        .with_chat_timeout(Duration::from_secs(5))
        .with_shutdown_timeout_ms(500)
}

impl Harness {
    pub fn new(chat: ScriptedChat) -> Self {
        Self::build(test_config(), FakeTranscription::new(), chat)
    }

    pub fn build(config: SessionConfig, source: FakeTranscription, chat: ScriptedChat) -> Self {
        Self::build_with_session(config, source, chat, None)
    }

    pub fn resumed(session: Session, chat: ScriptedChat) -> Self {
        Self::build_with_session(test_config(), FakeTranscription::new(), chat, Some(session))
    }

    fn build_with_session(
        config: SessionConfig,
        source: FakeTranscription,
        chat: ScriptedChat,
        session: Option<Session>,
    ) -> Self {
        let playback = RecordingPlayback::new();
        let audio = RecordingAudio::default();
        let store = MemoryStore::new();
        let mut builder = Orchestrator::builder()
            .with_config(config)
            .with_transcription(source.clone())
            .with_chat(chat.clone())
            .with_playback(playback.clone())
            .with_audio_session(audio.clone())
            .with_store(store.clone());
        if let Some(session) = session {
            builder = builder.with_session(session);
        }
        let orchestrator = builder.build().unwrap();
        Self {
            orchestrator,
            source,
            chat,
            playback,
            audio,
            store,
        }
    }

    /// Handle reports until `done` holds
    pub fn run_until(&mut self, done: impl Fn(&Orchestrator) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done(&self.orchestrator) {
            assert!(Instant::now() < deadline, "condition not reached in time");
            self.orchestrator.process_next(Duration::from_millis(10));
        }
    }

    /// Speak `text` through a full listening turn
    pub fn say(&mut self, text: &str) {
        self.orchestrator.start_or_toggle_listening();
        self.source.final_result(text);
        self.orchestrator.process_pending();
    }
}
