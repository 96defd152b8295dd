//! Threaded runner for the orchestrator
//!
//! The orchestrator runs on its own thread. A `select!` loop takes commands
//! from the presentation layer and reports from collaborators one at a time.
//! Interruptions are drained before anything else on every iteration.

use super::events::{EventSink, SessionCommand, SessionEvent, ViewEvent};
use super::machine::Orchestrator;
use crate::error::ErrorKind;
use crate::state::SharedViewState;
use crate::{Result, SessionError};
use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Handle for controlling a running orchestrator from the UI or tests
pub struct OrchestratorHandle {
    command_tx: Sender<SessionCommand>,
    view_rx: Receiver<ViewEvent>,
    view: SharedViewState,
    sink: EventSink,
}

impl OrchestratorHandle {
    /// Send a command to the orchestrator
    pub fn send_command(&self, cmd: SessionCommand) -> Result<()> {
        self.command_tx
            .send(cmd)
            .map_err(|e| SessionError::Channel(format!("Failed to send command: {}", e)))
    }

    pub fn toggle_listening(&self) -> Result<()> {
        self.send_command(SessionCommand::ToggleListening)
    }

    pub fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.send_command(SessionCommand::SendText(text.into()))
    }

    pub fn speak_last_message(&self) -> Result<()> {
        self.send_command(SessionCommand::SpeakLastMessage)
    }

    pub fn dismiss_error(&self) -> Result<()> {
        self.send_command(SessionCommand::DismissError)
    }

    pub fn finalize(&self) -> Result<()> {
        self.send_command(SessionCommand::Finalize)
    }

    /// Finalize the session and stop the orchestrator thread
    pub fn shutdown(&self) -> Result<()> {
        self.send_command(SessionCommand::Shutdown)
    }

    /// Try to receive an event (non-blocking)
    pub fn try_recv_event(&self) -> Option<ViewEvent> {
        self.view_rx.try_recv().ok()
    }

    /// Receive an event (blocking)
    pub fn recv_event(&self) -> Result<ViewEvent> {
        self.view_rx
            .recv()
            .map_err(|e| SessionError::Channel(format!("Failed to receive event: {}", e)))
    }

    pub fn recv_event_timeout(&self, timeout: Duration) -> Option<ViewEvent> {
        self.view_rx.recv_timeout(timeout).ok()
    }

    /// Another receiver for view events; each event goes to one receiver
    pub fn events(&self) -> Receiver<ViewEvent> {
        self.view_rx.clone()
    }

    /// Published view-state
    pub fn view(&self) -> &SharedViewState {
        &self.view
    }

    /// Endpoint for platform reports such as interruptions and permission changes
    pub fn sink(&self) -> EventSink {
        self.sink.clone()
    }
}

impl Orchestrator {
    /// Open the session and run the orchestrator on a dedicated thread
    pub fn spawn(self) -> Result<(OrchestratorHandle, JoinHandle<()>)> {
        let buffer_size = self.config().channel_buffer_size;
        let (command_tx, command_rx) = bounded(buffer_size);
        let (view_tx, view_rx) = bounded(buffer_size);
        let view = SharedViewState::new();
        view.publish(self.view_state());

        let handle = OrchestratorHandle {
            command_tx,
            view_rx,
            view: view.clone(),
            sink: self.sink(),
        };

        let join = thread::Builder::new()
            .name("tertulia-orchestrator".into())
            .spawn(move || run_loop(self, command_rx, view_tx, view))
            .map_err(|e| SessionError::Channel(format!("Failed to spawn orchestrator: {}", e)))?;

        Ok((handle, join))
    }
}

fn run_loop(
    mut orchestrator: Orchestrator,
    command_rx: Receiver<SessionCommand>,
    view_tx: Sender<ViewEvent>,
    view: SharedViewState,
) {
    info!("Orchestrator main loop starting");
    let (events_rx, interrupt_rx) = orchestrator.receivers();
    let mut publisher = Publisher::new(view_tx, view);

    orchestrator.open();
    publisher.publish(&orchestrator);

    loop {
        while let Ok(interruption) = interrupt_rx.try_recv() {
            orchestrator.handle_interruption(interruption);
            publisher.publish(&orchestrator);
        }

        select! {
            recv(interrupt_rx) -> interruption => {
                if let Ok(interruption) = interruption {
                    orchestrator.handle_interruption(interruption);
                }
            }

            recv(command_rx) -> cmd => {
                match cmd {
                    Ok(SessionCommand::Finalize) => {
                        orchestrator.finalize_session();
                        publisher.emit(ViewEvent::Finalized);
                    }
                    Ok(cmd) => {
                        if !orchestrator.handle_command(cmd) {
                            info!("Shutdown requested");
                            publisher.publish(&orchestrator);
                            publisher.emit(ViewEvent::Finalized);
                            break;
                        }
                    }
                    Err(_) => {
                        warn!("Command channel disconnected, finalizing");
                        orchestrator.finalize_session();
                        break;
                    }
                }
            }

            recv(events_rx) -> event => {
                if let Ok(event) = event {
                    if let SessionEvent::ChatChunk { generation, chunk } = &event {
                        if orchestrator.phase().generation() == Some(*generation) {
                            publisher.emit(ViewEvent::ReplyChunk(chunk.clone()));
                        }
                    }
                    orchestrator.handle_event(event);
                }
            }
        }

        publisher.publish(&orchestrator);
    }

    orchestrator.shutdown();
    publisher.emit(ViewEvent::Shutdown);
    info!("Orchestrator main loop exiting");
}

/// Publishes view-state and notifies the UI of changes
struct Publisher {
    view_tx: Sender<ViewEvent>,
    view: SharedViewState,
    last_error: Option<ErrorKind>,
}

impl Publisher {
    fn new(view_tx: Sender<ViewEvent>, view: SharedViewState) -> Self {
        Self {
            view_tx,
            view,
            last_error: None,
        }
    }

    fn publish(&mut self, orchestrator: &Orchestrator) {
        let state = orchestrator.view_state();
        let error = state.error;
        self.view.publish(state);
        if let Some(kind) = error.filter(|_| error != self.last_error) {
            self.emit(ViewEvent::Error(kind));
        }
        self.last_error = error;
        self.emit(ViewEvent::StateChanged);
    }

    /// UI notifications are advisory; a full channel drops them
    fn emit(&self, event: ViewEvent) {
        match self.view_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => debug!("View channel full, dropping {:?}", event),
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}
