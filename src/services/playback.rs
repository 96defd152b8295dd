//! Speech playback implementations

use super::SpeechPlayback;
#[cfg(feature = "audio-io")]
use super::SpeechSynthesizer;
use crate::orchestrator::{EventSink, Generation};
use crate::Result;
use tracing::info;

/// Logs text instead of speaking it and finishes immediately
#[derive(Debug, Default)]
pub struct SilentPlayback;

impl SilentPlayback {
    pub fn new() -> Self {
        Self
    }
}

impl SpeechPlayback for SilentPlayback {
    fn synthesize_and_play(
        &mut self,
        text: &str,
        generation: Generation,
        sink: EventSink,
    ) -> Result<()> {
        info!("[speak {}] {}", generation, text);
        sink.playback_finished(generation, Ok(()));
        Ok(())
    }

    fn stop(&mut self) {}
}

#[cfg(feature = "audio-io")]
pub use rodio_backend::RodioPlayback;

#[cfg(feature = "audio-io")]
mod rodio_backend {
    use super::*;
    use crate::SessionError;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;
    use tracing::{debug, warn};

    const POLL_INTERVAL: Duration = Duration::from_millis(20);

    /// Synthesizes remotely and plays on the default output device
    ///
    /// Each request runs on its own worker thread, since the rodio output
    /// stream cannot leave the thread that opened it.
    pub struct RodioPlayback {
        synthesizer: Arc<dyn SpeechSynthesizer>,
        stop_flag: Option<Arc<AtomicBool>>,
    }

    impl RodioPlayback {
        pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>) -> Self {
            Self {
                synthesizer,
                stop_flag: None,
            }
        }
    }

    impl SpeechPlayback for RodioPlayback {
        fn synthesize_and_play(
            &mut self,
            text: &str,
            generation: Generation,
            sink: EventSink,
        ) -> Result<()> {
            self.stop();

            let stop_flag = Arc::new(AtomicBool::new(false));
            self.stop_flag = Some(Arc::clone(&stop_flag));
            let synthesis = self.synthesizer.synthesize(text);

            thread::Builder::new()
                .name(format!("tertulia-playback-{}", generation.value()))
                .spawn(move || {
                    let result = play(synthesis, &stop_flag);
                    if stop_flag.load(Ordering::SeqCst) {
                        debug!("Playback {} stopped", generation);
                        return;
                    }
                    if let Err(e) = &result {
                        warn!("Playback {} failed: {}", generation, e);
                    }
                    sink.playback_finished(generation, result);
                })
                .map_err(|e| SessionError::Playback(format!("Failed to spawn playback: {}", e)))?;
            Ok(())
        }

        fn stop(&mut self) {
            if let Some(flag) = self.stop_flag.take() {
                flag.store(true, Ordering::SeqCst);
            }
        }
    }

    fn play(
        synthesis: futures::future::BoxFuture<'static, Result<Vec<u8>>>,
        stop_flag: &AtomicBool,
    ) -> Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| SessionError::Synthesis(format!("Failed to create runtime: {}", e)))?;
        let audio = runtime.block_on(synthesis)?;
        if audio.is_empty() || stop_flag.load(Ordering::SeqCst) {
            return Ok(());
        }

        let (_stream, handle) = rodio::OutputStream::try_default()
            .map_err(|e| SessionError::Playback(e.to_string()))?;
        let output =
            rodio::Sink::try_new(&handle).map_err(|e| SessionError::Playback(e.to_string()))?;
        let source = rodio::Decoder::new(Cursor::new(audio))
            .map_err(|e| SessionError::Synthesis(format!("Undecodable audio: {}", e)))?;
        output.append(source);

        while !output.empty() {
            if stop_flag.load(Ordering::SeqCst) {
                output.stop();
                return Ok(());
            }
            thread::sleep(POLL_INTERVAL);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::SessionEvent;

    #[test]
    fn test_silent_playback_finishes_immediately() {
        let (sink, events, _interruptions) = EventSink::channel();
        let mut playback = SilentPlayback::new();
        playback
            .synthesize_and_play("Claro", Generation::new(4), sink)
            .unwrap();

        match events.try_recv().unwrap() {
            SessionEvent::PlaybackFinished { generation, result } => {
                assert_eq!(generation, Generation::new(4));
                assert!(result.is_ok());
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
