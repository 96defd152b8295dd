//! HTTP text-to-speech client

use super::SpeechSynthesizer;
use crate::config::BackendConfig;
use crate::{Result, SessionError};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct SynthesisRequest {
    text: String,
    #[serde(rename = "voiceId", skip_serializing_if = "Option::is_none")]
    voice_id: Option<String>,
}

/// Posts text to `{base}/tts` and returns the encoded audio
#[derive(Clone)]
pub struct HttpSpeechSynthesizer {
    client: reqwest::Client,
    url: Option<String>,
    voice_id: Option<String>,
}

impl HttpSpeechSynthesizer {
    pub fn new(backend: &BackendConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: backend.environment.url_for("/tts"),
            voice_id: backend.voice_id.clone(),
        }
    }

    pub fn with_voice(mut self, voice_id: impl Into<String>) -> Self {
        self.voice_id = Some(voice_id.into());
        self
    }
}

impl SpeechSynthesizer for HttpSpeechSynthesizer {
    fn synthesize(&self, text: &str) -> BoxFuture<'static, Result<Vec<u8>>> {
        let Some(url) = self.url.clone() else {
            return futures::future::ready(Ok(Vec::new())).boxed();
        };
        let request = self.client.post(url).json(&SynthesisRequest {
            text: text.to_string(),
            voice_id: self.voice_id.clone(),
        });

        async move {
            let response = request
                .send()
                .await
                .map_err(|e| SessionError::Synthesis(e.to_string()))?;
            if response.status() != reqwest::StatusCode::OK {
                return Err(SessionError::Synthesis(format!(
                    "speech endpoint returned {}",
                    response.status()
                )));
            }
            let bytes = response
                .bytes()
                .await
                .map_err(|e| SessionError::Synthesis(e.to_string()))?;
            Ok(bytes.to_vec())
        }
        .boxed()
    }
}
