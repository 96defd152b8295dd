//! Conversation session state machine
//!
//! The `Orchestrator` owns the session, the phase and every collaborator. All
//! of its methods run on one execution context (the runner thread, or the test
//! calling them), so transitions and session writes are sequential.
//!
//! Every capture, chat stream and playback request is started with a fresh
//! `Generation`. The phase holds the generation of the running activity, and a
//! report tagged with any other generation is dropped.

use super::events::{EventSink, Generation, Interruption, SessionCommand, SessionEvent};
use super::phase::{CaptureHandle, InterruptedActivity, Phase, PlaybackHandle, StreamHandle};
use super::pump::ChatPump;
use crate::config::SessionConfig;
use crate::services::{
    AudioRoute, AudioSession, ChatStreamClient, NullAudioSession, SpeechPlayback,
    TranscriptionSource,
};
use crate::session::{MemoryStore, Message, MessageStatus, Session, SessionStore};
use crate::state::SessionViewState;
use crate::{Result, SessionError};
use crossbeam_channel::Receiver;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Main orchestrator for one conversation session
pub struct Orchestrator {
    config: SessionConfig,
    session: Session,
    phase: Phase,
    generation: Generation,
    transcript: String,
    error: Option<SessionError>,

    /// Set while an OS interruption is in progress
    interruption_active: bool,
    /// What to resume when the interruption ends
    resume: Option<InterruptedActivity>,
    /// Stopped capture whose final transcript is still honoured
    pending_capture: Option<Generation>,

    source: Box<dyn TranscriptionSource>,
    chat: Arc<dyn ChatStreamClient>,
    playback: Box<dyn SpeechPlayback>,
    audio: Box<dyn AudioSession>,
    store: Box<dyn SessionStore>,
    pump: ChatPump,

    sink: EventSink,
    events_rx: Receiver<SessionEvent>,
    interrupt_rx: Receiver<Interruption>,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    // === Accessors ===

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Last generation handed out
    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn error(&self) -> Option<&SessionError> {
        self.error.as_ref()
    }

    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    /// Endpoint collaborators and platform hooks report into
    pub fn sink(&self) -> EventSink {
        self.sink.clone()
    }

    pub fn was_speaking_when_interrupted(&self) -> bool {
        matches!(self.resume, Some(InterruptedActivity::Speaking { .. }))
    }

    pub fn was_listening_when_interrupted(&self) -> bool {
        matches!(self.resume, Some(InterruptedActivity::Listening))
    }

    pub(crate) fn receivers(&self) -> (Receiver<SessionEvent>, Receiver<Interruption>) {
        (self.events_rx.clone(), self.interrupt_rx.clone())
    }

    /// Project the current state for the presentation layer
    pub fn view_state(&self) -> SessionViewState {
        SessionViewState {
            phase: self.phase.kind(),
            topic: self.session.topic.clone(),
            messages: self.session.messages.clone(),
            listening: matches!(self.phase, Phase::Listening(_)),
            speaking: matches!(self.phase, Phase::Speaking(_)),
            processing: matches!(self.phase, Phase::AwaitingReply(_)),
            transcript: self.transcript.clone(),
            permission_denied: matches!(self.phase, Phase::PermissionBlocked),
            error: self.error.as_ref().map(SessionError::kind),
            error_message: self.error.as_ref().map(SessionError::user_message),
            interrupted: self.interruption_active,
        }
    }

    // === Dispatch ===

    /// Handle queued reports without blocking, interruptions first
    ///
    /// Returns the number of messages handled.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        loop {
            if let Ok(interruption) = self.interrupt_rx.try_recv() {
                self.handle_interruption(interruption);
            } else if let Ok(event) = self.events_rx.try_recv() {
                self.handle_event(event);
            } else {
                return handled;
            }
            handled += 1;
        }
    }

    /// Wait up to `timeout` for one report and handle it
    pub fn process_next(&mut self, timeout: Duration) -> bool {
        if let Ok(interruption) = self.interrupt_rx.try_recv() {
            self.handle_interruption(interruption);
            return true;
        }
        match self.events_rx.recv_timeout(timeout) {
            Ok(event) => {
                self.handle_event(event);
                true
            }
            Err(_) => false,
        }
    }

    /// Returns false when the orchestrator should stop
    pub fn handle_command(&mut self, command: SessionCommand) -> bool {
        debug!("Command: {:?}", command);
        match command {
            SessionCommand::ToggleListening => self.start_or_toggle_listening(),
            SessionCommand::SendText(text) => self.send_text(&text),
            SessionCommand::SpeakLastMessage => self.speak_last_message(),
            SessionCommand::DismissError => self.dismiss_error(),
            SessionCommand::Finalize => self.finalize_session(),
            SessionCommand::Shutdown => {
                self.finalize_session();
                return false;
            }
        }
        true
    }

    pub fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Transcript {
                generation,
                text,
                is_final,
            } => self.on_transcript(generation, &text, is_final),
            SessionEvent::ListeningChanged {
                generation,
                listening,
            } => self.on_listening_changed(generation, listening),
            SessionEvent::CaptureFailed { generation, error } => {
                self.on_capture_failed(generation, error)
            }
            SessionEvent::ChatChunk { generation, chunk } => self.on_chat_chunk(generation, &chunk),
            SessionEvent::ChatCompleted { generation } => self.on_chat_complete(generation),
            SessionEvent::ChatFailed { generation, error } => {
                self.on_chat_failed(generation, error)
            }
            SessionEvent::PlaybackFinished { generation, result } => {
                self.on_playback_finished(generation, result)
            }
            SessionEvent::PermissionGranted => self.on_permission_granted(),
        }
    }

    pub fn handle_interruption(&mut self, interruption: Interruption) {
        match interruption {
            Interruption::Began => self.on_interruption_began(),
            Interruption::Ended => self.on_interruption_ended(),
        }
    }

    // === Operations ===

    /// Greet a new session or welcome back a resumed one
    pub fn open(&mut self) {
        if self.session.is_new() {
            self.persist_session();
            let Some(greeting) = self.config.greeting_for(&self.session.topic) else {
                return;
            };
            let id = self.append(Message::assistant(greeting.clone()));
            if self.config.speak_greeting {
                self.begin_speaking(greeting, Some(id));
            }
        } else if self.config.speak_greeting {
            let welcome = match self.session.last_completed_reply() {
                Some(last) => format!(
                    "Welcome back to your session on {}. You were saying: {}",
                    self.session.topic, last.text
                ),
                None => format!("Welcome back to your session on {}!", self.session.topic),
            };
            self.begin_speaking(welcome, None);
        }
    }

    /// Microphone button: start capture, or stop it and submit what was heard
    ///
    /// Tapping while a reply is streaming or being spoken cancels it first.
    pub fn start_or_toggle_listening(&mut self) {
        match &self.phase {
            Phase::Listening(handle) => {
                let handle = *handle;
                self.stop_listening(handle);
            }
            Phase::AwaitingReply(_) | Phase::Speaking(_) => {
                info!("Barge-in, cancelling {}", self.phase.kind());
                self.cancel_active();
                self.begin_listening();
            }
            Phase::Idle | Phase::Faulted(_) | Phase::PermissionBlocked => self.begin_listening(),
        }
    }

    /// Submit the recognizer's final transcript for the running capture
    pub fn submit_final_transcript(&mut self, text: &str) {
        let Phase::Listening(_) = self.phase else {
            warn!("Final transcript outside Listening ignored");
            return;
        };
        self.end_capture();
        self.transcript = text.to_string();
        self.complete_capture();
    }

    /// Typed message, bypassing the recognizer
    pub fn send_text(&mut self, text: &str) {
        if !(self.phase.is_resting() || matches!(self.phase, Phase::PermissionBlocked)) {
            warn!("Cannot send text while {}", self.phase.kind());
            return;
        }
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        self.begin_turn(text.to_string());
    }

    /// Speak the most recent completed reply again
    pub fn speak_last_message(&mut self) {
        if !self.phase.is_idle() {
            warn!("Cannot replay while {}", self.phase.kind());
            return;
        }
        let Some(last) = self.session.last_completed_reply() else {
            debug!("No reply to replay");
            return;
        };
        let (text, id) = (last.text.clone(), last.id);
        self.begin_speaking(text, Some(id));
    }

    pub fn dismiss_error(&mut self) {
        self.error = None;
    }

    /// Stop everything, stamp `ended_at` and save
    ///
    /// Valid from any phase; the session stays usable afterwards. A running
    /// activity returns to Idle, PermissionBlocked and Faulted are kept.
    pub fn finalize_session(&mut self) {
        self.cancel_active();
        self.source.stop();
        self.playback.stop();
        self.pump.cancel();
        self.deactivate_audio();
        self.resume = None;
        self.pending_capture = None;
        self.session.end_now();
        self.persist_session();
        info!("Session {} finalized", self.session.id);
    }

    // === Transcription reports ===

    pub fn on_transcript(&mut self, generation: Generation, text: &str, is_final: bool) {
        match &self.phase {
            Phase::Listening(handle) if handle.generation == generation => {
                if is_final {
                    self.submit_final_transcript(text);
                } else {
                    self.transcript = text.to_string();
                }
            }
            // Result for a capture the user already stopped
            Phase::Idle if self.pending_capture == Some(generation) => {
                self.transcript = text.to_string();
                if is_final {
                    self.complete_capture();
                }
            }
            _ => debug!("Dropping stale transcript from {}", generation),
        }
    }

    pub fn on_listening_changed(&mut self, generation: Generation, listening: bool) {
        if listening {
            return;
        }
        match self.phase {
            // Recognizer stopped on its own without a final result
            Phase::Listening(handle) if handle.generation == generation => {
                debug!("Recognizer stopped itself");
                self.end_capture();
                self.complete_capture();
            }
            // Stopped capture ended without a final result; use the partial
            Phase::Idle if self.pending_capture == Some(generation) => {
                debug!("Capture {} ended, using last partial", generation);
                self.complete_capture();
            }
            _ => {}
        }
    }

    pub fn on_capture_failed(&mut self, generation: Generation, error: SessionError) {
        let Phase::Listening(handle) = self.phase else {
            debug!("Dropping capture failure from {}", generation);
            return;
        };
        if handle.generation != generation {
            debug!("Dropping capture failure from {}", generation);
            return;
        }
        error!("Capture failed: {}", error);
        self.end_capture();
        self.transcript.clear();
        self.fail_capture(error);
    }

    // === Chat reports ===

    pub fn on_chat_chunk(&mut self, generation: Generation, chunk: &str) {
        let Some(handle) = self.current_stream(generation) else {
            debug!("Dropping stale chunk from {}", generation);
            return;
        };
        if self.session.append_to_in_flight(handle.message_id, chunk) && self.config.persist_chunks
        {
            self.persist_session();
        }
    }

    pub fn on_chat_complete(&mut self, generation: Generation) {
        let Some(handle) = self.current_stream(generation) else {
            debug!("Dropping stale completion from {}", generation);
            return;
        };
        self.pump.release(generation);
        self.phase = Phase::Idle;
        let text = self
            .session
            .settle_in_flight(handle.message_id, MessageStatus::Complete)
            .map(|m| m.text.clone())
            .unwrap_or_default();
        self.persist_session();
        info!("Reply {} complete ({} chars)", generation, text.len());

        if text.trim().is_empty() {
            debug!("Empty reply, nothing to speak");
            return;
        }
        self.begin_speaking(text, Some(handle.message_id));
    }

    pub fn on_chat_failed(&mut self, generation: Generation, error: SessionError) {
        let Some(handle) = self.current_stream(generation) else {
            debug!("Dropping stale failure from {}", generation);
            return;
        };
        error!("Reply {} failed: {}", generation, error);
        self.pump.cancel();
        self.phase = Phase::Idle;
        self.session
            .settle_in_flight(handle.message_id, MessageStatus::Failed);
        self.persist_session();
        self.error = Some(error);
    }

    // === Playback reports ===

    pub fn on_playback_finished(&mut self, generation: Generation, result: Result<()>) {
        match &self.phase {
            Phase::Speaking(handle) if handle.generation == generation => {}
            _ => {
                debug!("Dropping stale playback report from {}", generation);
                return;
            }
        }
        self.deactivate_audio();
        self.phase = Phase::Idle;
        if let Err(e) = result {
            // The reply text stays in the transcript
            warn!("Playback {} failed: {}", generation, e);
            self.error = Some(e);
        }
    }

    // === Platform reports ===

    pub fn on_permission_granted(&mut self) {
        if matches!(self.phase, Phase::PermissionBlocked) {
            info!("Permission granted");
            self.phase = Phase::Idle;
        }
    }

    pub fn on_interruption_began(&mut self) {
        self.interruption_active = true;
        if !self.phase.is_active() {
            debug!("Interruption while {}", self.phase.kind());
            return;
        }
        self.resume = match &self.phase {
            Phase::Listening(_) => Some(InterruptedActivity::Listening),
            Phase::Speaking(handle) => Some(InterruptedActivity::Speaking {
                text: handle.text.clone(),
                message_id: handle.message_id,
            }),
            _ => None,
        };
        info!(
            "Interrupted while {}, resume: {:?}",
            self.phase.kind(),
            self.resume
        );
        self.cancel_active();
    }

    /// Resume the interrupted activity, at most once per interruption
    pub fn on_interruption_ended(&mut self) {
        if !self.interruption_active {
            debug!("Interruption end without a matching begin");
            return;
        }
        self.interruption_active = false;
        let Some(activity) = self.resume.take() else {
            return;
        };
        if !self.phase.is_idle() {
            debug!("Not resuming, now {}", self.phase.kind());
            return;
        }
        info!("Resuming {:?}", activity);
        match activity {
            InterruptedActivity::Listening => self.begin_listening(),
            InterruptedActivity::Speaking { text, message_id } => {
                self.begin_speaking(text, message_id)
            }
        }
    }

    // === Transitions ===

    fn next_generation(&mut self) -> Generation {
        self.generation = self.generation.next();
        self.generation
    }

    fn current_stream(&self, generation: Generation) -> Option<StreamHandle> {
        match self.phase {
            Phase::AwaitingReply(handle) if handle.generation == generation => Some(handle),
            _ => None,
        }
    }

    fn begin_listening(&mut self) {
        // A deliberate action replaces any pending resume
        self.resume = None;
        self.pending_capture = None;

        if !self.source.check_and_request_permission() {
            info!("Microphone permission missing");
            self.phase = Phase::PermissionBlocked;
            return;
        }

        self.error = None;
        self.transcript.clear();
        let generation = self.next_generation();
        self.activate_audio(AudioRoute::Capture);
        match self.source.start(generation, self.sink.clone()) {
            Ok(()) => {
                info!("Listening ({})", generation);
                self.phase = Phase::Listening(CaptureHandle { generation });
            }
            Err(e) => {
                error!("Failed to start capture: {}", e);
                self.deactivate_audio();
                self.fail_capture(e);
            }
        }
    }

    /// Stop the recognizer and wait for its final result
    ///
    /// The turn starts when the final result arrives, or with the last
    /// partial when the recognizer reports the capture ended.
    fn stop_listening(&mut self, handle: CaptureHandle) {
        self.end_capture();
        self.pending_capture = Some(handle.generation);
        debug!("Capture {} stopped, awaiting final result", handle.generation);
    }

    /// Submit the transcript of the capture that just ended
    fn complete_capture(&mut self) {
        self.pending_capture = None;
        let text = self.transcript.trim().to_string();
        if text.is_empty() {
            debug!("Nothing said");
            return;
        }
        self.begin_turn(text);
    }

    fn end_capture(&mut self) {
        self.source.stop();
        self.deactivate_audio();
        self.phase = Phase::Idle;
    }

    fn fail_capture(&mut self, error: SessionError) {
        if error == SessionError::PermissionDenied {
            self.phase = Phase::PermissionBlocked;
            return;
        }
        self.phase = if error.is_recoverable() {
            Phase::Idle
        } else {
            Phase::Faulted(error.clone())
        };
        self.error = Some(error);
    }

    /// Append the user's message and open a chat stream for the reply
    fn begin_turn(&mut self, text: String) {
        self.error = None;
        self.pending_capture = None;
        self.append(Message::user(text));

        let history: Vec<Message> = self
            .session
            .messages
            .iter()
            .filter(|m| m.status == MessageStatus::Complete)
            .cloned()
            .collect();
        let generation = self.next_generation();
        let message_id = self.append(Message::placeholder());

        let stream = self.chat.stream_reply(history);
        self.pump.start(generation, stream, self.sink.clone());
        self.phase = Phase::AwaitingReply(StreamHandle {
            generation,
            message_id,
        });
        info!("Awaiting reply ({})", generation);
    }

    fn begin_speaking(&mut self, text: String, message_id: Option<Uuid>) {
        let generation = self.next_generation();
        self.activate_audio(AudioRoute::Playback);
        match self
            .playback
            .synthesize_and_play(&text, generation, self.sink.clone())
        {
            Ok(()) => {
                info!("Speaking ({})", generation);
                self.phase = Phase::Speaking(PlaybackHandle {
                    generation,
                    text,
                    message_id,
                });
            }
            Err(e) => {
                warn!("Failed to start playback: {}", e);
                self.deactivate_audio();
                self.phase = Phase::Idle;
                self.error = Some(e);
            }
        }
    }

    /// Stop the running activity and return to Idle
    fn cancel_active(&mut self) {
        match std::mem::take(&mut self.phase) {
            Phase::Listening(_) => {
                self.source.stop();
                self.deactivate_audio();
            }
            Phase::AwaitingReply(handle) => {
                self.pump.cancel();
                self.session
                    .settle_in_flight(handle.message_id, MessageStatus::Cancelled);
                self.persist_session();
            }
            Phase::Speaking(_) => {
                self.playback.stop();
                self.deactivate_audio();
            }
            // Not running anything
            other @ (Phase::PermissionBlocked | Phase::Faulted(_)) => self.phase = other,
            Phase::Idle => {}
        }
    }

    // === Side effects ===

    fn append(&mut self, message: Message) -> Uuid {
        let message = self.session.append(message).clone();
        if let Err(e) = self.store.insert(&message, &self.session) {
            warn!("Failed to store message {}: {}", message.id, e);
        }
        message.id
    }

    fn persist_session(&self) {
        if let Err(e) = self.store.save(&self.session) {
            warn!("Failed to save session {}: {}", self.session.id, e);
        }
    }

    fn activate_audio(&mut self, route: AudioRoute) {
        if let Err(e) = self.audio.activate(route) {
            warn!("Failed to activate audio session for {:?}: {}", route, e);
        }
    }

    fn deactivate_audio(&mut self) {
        if let Err(e) = self.audio.deactivate() {
            warn!("Failed to deactivate audio session: {}", e);
        }
    }

    /// Tear down the chat runtime
    pub fn shutdown(self) {
        let timeout = self.config.shutdown_timeout();
        self.pump.shutdown(timeout);
    }
}

/// Builder for creating an orchestrator
pub struct OrchestratorBuilder {
    config: SessionConfig,
    session: Option<Session>,
    source: Option<Box<dyn TranscriptionSource>>,
    chat: Option<Arc<dyn ChatStreamClient>>,
    playback: Option<Box<dyn SpeechPlayback>>,
    audio: Box<dyn AudioSession>,
    store: Box<dyn SessionStore>,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            config: SessionConfig::default(),
            session: None,
            source: None,
            chat: None,
            playback: None,
            audio: Box::new(NullAudioSession::new()),
            store: Box::new(MemoryStore::new()),
        }
    }

    /// Set the complete configuration
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Continue a prior session instead of starting a new one
    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_transcription(mut self, source: impl TranscriptionSource + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn with_chat(mut self, chat: impl ChatStreamClient + 'static) -> Self {
        self.chat = Some(Arc::new(chat));
        self
    }

    pub fn with_playback(mut self, playback: impl SpeechPlayback + 'static) -> Self {
        self.playback = Some(Box::new(playback));
        self
    }

    pub fn with_audio_session(mut self, audio: impl AudioSession + 'static) -> Self {
        self.audio = Box::new(audio);
        self
    }

    pub fn with_store(mut self, store: impl SessionStore + 'static) -> Self {
        self.store = Box::new(store);
        self
    }

    pub fn build(self) -> Result<Orchestrator> {
        self.config.validate()?;
        let source = self
            .source
            .ok_or_else(|| SessionError::Config("Transcription source is required".into()))?;
        let chat = self
            .chat
            .ok_or_else(|| SessionError::Config("Chat client is required".into()))?;
        let playback = self
            .playback
            .ok_or_else(|| SessionError::Config("Speech playback is required".into()))?;

        let session = match self.session {
            Some(prior) => prior.resume(),
            None => Session::new(self.config.topic.clone()),
        };
        let pump = ChatPump::new(self.config.chat_timeout())?;
        let (sink, events_rx, interrupt_rx) = EventSink::channel();

        Ok(Orchestrator {
            config: self.config,
            session,
            phase: Phase::Idle,
            generation: Generation::default(),
            transcript: String::new(),
            error: None,
            interruption_active: false,
            resume: None,
            pending_capture: None,
            source,
            chat,
            playback,
            audio: self.audio,
            store: self.store,
            pump,
            sink,
            events_rx,
            interrupt_rx,
        })
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
