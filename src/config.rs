//! Configuration for conversation sessions
//!
//! Provides centralized configuration for the orchestrator and the remote
//! chat/speech backend. Values can come from defaults, a TOML file, or the
//! environment.

use crate::{Result, SessionError};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Environment variable that switches the backend to mock mode
pub const USE_MOCKS_ENV: &str = "TERTULIA_USE_MOCKS";

/// Environment variable holding the backend base URL
pub const BASE_URL_ENV: &str = "TERTULIA_BASE_URL";

const DEFAULT_BASE_URL: &str = "http://localhost:3000";

/// Where chat and speech requests go
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", content = "url", rename_all = "snake_case")]
pub enum BackendEnvironment {
    /// No remote backend; requests produce nothing
    Mock,
    /// Live backend at the given base URL
    Live(String),
}

impl Default for BackendEnvironment {
    fn default() -> Self {
        BackendEnvironment::Live(DEFAULT_BASE_URL.to_string())
    }
}

impl BackendEnvironment {
    /// Resolve from `TERTULIA_USE_MOCKS` / `TERTULIA_BASE_URL`
    pub fn from_env() -> Self {
        Self::resolve(
            std::env::var(USE_MOCKS_ENV).ok().as_deref(),
            std::env::var(BASE_URL_ENV).ok().as_deref(),
        )
    }

    fn resolve(use_mocks: Option<&str>, base_url: Option<&str>) -> Self {
        if use_mocks == Some("true") {
            return BackendEnvironment::Mock;
        }
        match base_url {
            Some(url) if !url.trim().is_empty() => BackendEnvironment::Live(url.trim().to_string()),
            _ => BackendEnvironment::default(),
        }
    }

    pub fn base_url(&self) -> Option<&str> {
        match self {
            BackendEnvironment::Mock => None,
            BackendEnvironment::Live(url) => Some(url),
        }
    }

    /// Join an endpoint path onto the base URL
    pub fn url_for(&self, path: &str) -> Option<String> {
        let base = self.base_url()?;
        let path = path.strip_prefix('/').unwrap_or(path);
        Some(format!("{}/{}", base.trim_end_matches('/'), path))
    }
}

/// Remote chat/speech backend settings
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub environment: BackendEnvironment,
    /// Bearer token sent with chat requests
    pub access_token: Option<String>,
    /// Voice requested from the speech endpoint
    pub voice_id: Option<String>,
}

/// Configuration for a conversation session
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Topic for new sessions
    pub topic: String,

    /// Opening assistant line for new sessions; `{topic}` is substituted
    pub greeting: Option<String>,

    /// Whether `open()` speaks the greeting or welcome-back line
    pub speak_greeting: bool,

    /// Maximum silence between chat chunks before the stream is failed
    pub chat_inactivity_timeout_ms: u64,

    /// Channel buffer size
    pub channel_buffer_size: usize,

    /// Shutdown timeout in milliseconds
    pub shutdown_timeout_ms: u64,

    /// Save the session after every streamed chunk
    pub persist_chunks: bool,

    pub backend: BackendConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            topic: "Default Topic".to_string(),
            greeting: Some(
                "¡Hola! Soy Sancho. Vamos a practicar un poco de español.".to_string(),
            ),
            speak_greeting: true,
            chat_inactivity_timeout_ms: 30_000,
            channel_buffer_size: 100,
            shutdown_timeout_ms: 5000,
            persist_chunks: true,
            backend: BackendConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a TOML file; missing fields take their defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| SessionError::Config(format!("{}: {}", path.display(), e)))?;
        let config: SessionConfig = toml::from_str(&content)
            .map_err(|e| SessionError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the session topic
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    /// Set the greeting for new sessions
    pub fn with_greeting(mut self, greeting: impl Into<String>) -> Self {
        self.greeting = Some(greeting.into());
        self
    }

    /// Start new sessions without a greeting
    pub fn without_greeting(mut self) -> Self {
        self.greeting = None;
        self
    }

    /// Keep the greeting silent
    pub fn without_spoken_greeting(mut self) -> Self {
        self.speak_greeting = false;
        self
    }

    pub fn with_chat_timeout(mut self, timeout: Duration) -> Self {
        self.chat_inactivity_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_channel_buffer_size(mut self, size: usize) -> Self {
        self.channel_buffer_size = size;
        self
    }

    pub fn with_shutdown_timeout_ms(mut self, timeout: u64) -> Self {
        self.shutdown_timeout_ms = timeout;
        self
    }

    pub fn with_backend(mut self, environment: BackendEnvironment) -> Self {
        self.backend.environment = environment;
        self
    }

    pub fn with_chunk_persistence(mut self, enabled: bool) -> Self {
        self.persist_chunks = enabled;
        self
    }

    pub fn chat_timeout(&self) -> Duration {
        Duration::from_millis(self.chat_inactivity_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Greeting text with the topic filled in
    pub fn greeting_for(&self, topic: &str) -> Option<String> {
        self.greeting
            .as_ref()
            .map(|greeting| greeting.replace("{topic}", topic))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.chat_inactivity_timeout_ms == 0 {
            return Err(SessionError::Config(
                "chat_inactivity_timeout_ms must be positive".into(),
            ));
        }
        if self.channel_buffer_size == 0 {
            return Err(SessionError::Config(
                "channel_buffer_size must be positive".into(),
            ));
        }
        Ok(())
    }
}
