mod console;

use anyhow::{Context, Result};
use clap::Parser;
use console::ConsoleTranscription;
use std::io::{self, BufRead, Write};
use std::thread;
use tertulia::services::HttpChatClient;
use tertulia::session::{JsonFileStore, MemoryStore, SessionStore};
use tertulia::{
    BackendEnvironment, Interruption, MessageStatus, Orchestrator, OrchestratorHandle,
    SessionConfig, ViewEvent,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

const HELP: &str = "\
Commands:
  <enter>       start or stop listening
  <text>        while listening: what you said; otherwise sent as typed text
  /say          repeat the last reply
  /interrupt    simulate an audio interruption (/resume to end it)
  /dismiss      clear the error banner
  /quit         finalize the session and exit";

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tertulia=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = match &args.config_path {
        Some(path) => SessionConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path))?,
        None => SessionConfig::default().with_backend(BackendEnvironment::from_env()),
    };
    info!(
        "Starting Tertulia on topic {:?} ({:?})",
        config.topic, config.backend.environment
    );

    let store = open_store();
    let source = ConsoleTranscription::new();
    let mut builder = Orchestrator::builder()
        .with_chat(HttpChatClient::new(&config.backend))
        .with_transcription(source.clone());

    if let Some(id) = args.resume {
        let session = store
            .as_ref()
            .context("Cannot resume without session files")?
            .load(id)
            .with_context(|| format!("No stored session {}", id))?;
        builder = builder.with_session(session);
    }
    let store: Box<dyn SessionStore> = match store {
        Some(store) => Box::new(store),
        None => Box::new(MemoryStore::new()),
    };

    let orchestrator = builder
        .with_playback(playback_for(&config))
        .with_store(store)
        .with_config(config)
        .build()?;
    let (handle, join) = orchestrator.spawn()?;

    println!("{}", HELP);
    let printer = spawn_printer(&handle)?;
    read_commands(&handle, &source)?;

    handle.shutdown()?;
    if join.join().is_err() {
        warn!("Orchestrator thread panicked");
    }
    if printer.join().is_err() {
        warn!("Printer thread panicked");
    }
    Ok(())
}

/// Voice conversation practice from the terminal
#[derive(Parser, Debug)]
#[command(name = "tertulia", version, about)]
struct Args {
    /// TOML config file
    config_path: Option<String>,

    /// Continue a stored session
    #[arg(long, value_name = "SESSION_ID")]
    resume: Option<Uuid>,
}

fn open_store() -> Option<JsonFileStore> {
    match JsonFileStore::in_data_dir() {
        Ok(store) => {
            info!("Saving sessions to {:?}", store.dir());
            Some(store)
        }
        Err(e) => {
            warn!("Session files unavailable ({}), keeping sessions in memory", e);
            None
        }
    }
}

#[cfg(feature = "audio-io")]
fn playback_for(config: &SessionConfig) -> tertulia::services::RodioPlayback {
    use std::sync::Arc;
    use tertulia::services::HttpSpeechSynthesizer;

    let synthesizer = HttpSpeechSynthesizer::new(&config.backend);
    tertulia::services::RodioPlayback::new(Arc::new(synthesizer))
}

#[cfg(not(feature = "audio-io"))]
fn playback_for(_config: &SessionConfig) -> tertulia::services::SilentPlayback {
    tertulia::services::SilentPlayback::new()
}

fn spawn_printer(handle: &OrchestratorHandle) -> Result<thread::JoinHandle<()>> {
    let events = handle.events();
    let view = handle.view().clone();
    let join = thread::Builder::new()
        .name("tertulia-printer".into())
        .spawn(move || {
            let mut last_phase = view.phase();
            let mut printed = 0;
            while let Ok(event) = events.recv() {
                match event {
                    ViewEvent::StateChanged => {
                        let state = view.snapshot();
                        // Settled messages only, in order
                        for message in state.messages.iter().skip(printed) {
                            if message.status.is_streaming() {
                                break;
                            }
                            let who = if message.is_user() { "you" } else { "sancho" };
                            let note = match message.status {
                                MessageStatus::Failed => " (failed)",
                                MessageStatus::Cancelled => " (cancelled)",
                                _ => "",
                            };
                            println!("{}> {}{}", who, message.text, note);
                            printed += 1;
                        }
                        if state.phase != last_phase {
                            println!("[{}]", state.phase);
                            last_phase = state.phase;
                        }
                    }
                    ViewEvent::ReplyChunk(_) => {}
                    ViewEvent::Error(_) => {
                        if let Some(message) = view.snapshot().error_message {
                            println!("! {}", message);
                        }
                    }
                    ViewEvent::Finalized => println!("[session saved]"),
                    ViewEvent::Shutdown => break,
                }
            }
        })?;
    Ok(join)
}

fn read_commands(handle: &OrchestratorHandle, source: &ConsoleTranscription) -> Result<()> {
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        match line.trim() {
            "" => handle.toggle_listening()?,
            "/quit" => break,
            "/say" => handle.speak_last_message()?,
            "/dismiss" => handle.dismiss_error()?,
            "/interrupt" => {
                handle.sink().interruption(Interruption::Began);
            }
            "/resume" => {
                handle.sink().interruption(Interruption::Ended);
            }
            text => {
                if !source.deliver(text) {
                    handle.send_text(text)?;
                }
            }
        }
        io::stdout().flush()?;
    }
    Ok(())
}
