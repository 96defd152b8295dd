//! Drives chat streams on a tokio runtime owned by the orchestrator
//!
//! Each pumped chunk is forwarded as a `ChatChunk` event tagged with the
//! stream's generation. A stream that stays silent longer than the inactivity
//! timeout is reported as a network failure.

use super::events::{EventSink, Generation};
use crate::services::ChatStream;
use crate::{Result, SessionError};
use futures::StreamExt;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

struct ActiveStream {
    generation: Generation,
    task: JoinHandle<()>,
}

pub struct ChatPump {
    runtime: Runtime,
    inactivity_timeout: Duration,
    active: Option<ActiveStream>,
}

impl ChatPump {
    pub fn new(inactivity_timeout: Duration) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("tertulia-chat")
            .enable_all()
            .build()
            .map_err(|e| SessionError::Config(format!("Failed to create runtime: {}", e)))?;
        Ok(Self {
            runtime,
            inactivity_timeout,
            active: None,
        })
    }

    /// Start pumping `stream`, cancelling any stream still running
    pub fn start(&mut self, generation: Generation, stream: ChatStream, sink: EventSink) {
        self.cancel();
        let timeout = self.inactivity_timeout;
        let task = self
            .runtime
            .spawn(pump_stream(generation, stream, sink, timeout));
        self.active = Some(ActiveStream { generation, task });
        debug!("Chat stream {} started", generation);
    }

    /// Abort the running stream, if any
    pub fn cancel(&mut self) {
        if let Some(active) = self.active.take() {
            active.task.abort();
            debug!("Chat stream {} cancelled", active.generation);
        }
    }

    /// Forget a stream that has already reported its end
    pub fn release(&mut self, generation: Generation) {
        if self
            .active
            .as_ref()
            .is_some_and(|a| a.generation == generation)
        {
            self.active = None;
        }
    }

    pub fn active_generation(&self) -> Option<Generation> {
        self.active.as_ref().map(|a| a.generation)
    }

    /// Cancel everything and stop the runtime
    pub fn shutdown(mut self, timeout: Duration) {
        self.cancel();
        self.runtime.shutdown_timeout(timeout);
        info!("Chat pump stopped");
    }
}

async fn pump_stream(
    generation: Generation,
    mut stream: ChatStream,
    sink: EventSink,
    inactivity_timeout: Duration,
) {
    loop {
        match tokio::time::timeout(inactivity_timeout, stream.next()).await {
            Ok(Some(Ok(chunk))) => {
                if !sink.chat_chunk(generation, chunk) {
                    return;
                }
            }
            Ok(Some(Err(e))) => {
                warn!("Chat stream {} failed: {}", generation, e);
                sink.chat_failed(generation, e);
                return;
            }
            Ok(None) => {
                sink.chat_completed(generation);
                return;
            }
            Err(_) => {
                warn!(
                    "Chat stream {} silent for {:?}, giving up",
                    generation, inactivity_timeout
                );
                sink.chat_failed(
                    generation,
                    SessionError::Network(format!(
                        "no reply data for {} ms",
                        inactivity_timeout.as_millis()
                    )),
                );
                return;
            }
        }
    }
}
