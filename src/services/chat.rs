//! HTTP chat client streaming replies line by line

use super::{ChatStream, ChatStreamClient};
use crate::config::BackendConfig;
use crate::session::Message;
use crate::SessionError;
use async_stream::try_stream;
use futures::StreamExt;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
struct ApiChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    messages: Vec<ApiChatMessage>,
}

impl ChatRequest {
    fn from_history(history: &[Message]) -> Self {
        Self {
            messages: history
                .iter()
                .map(|m| ApiChatMessage {
                    role: m.sender.role(),
                    content: m.text.clone(),
                })
                .collect(),
        }
    }
}

/// Posts the conversation to `{base}/chat` and yields each response line
#[derive(Clone)]
pub struct HttpChatClient {
    client: reqwest::Client,
    url: Option<String>,
    access_token: Option<String>,
}

impl HttpChatClient {
    pub fn new(backend: &BackendConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: backend.environment.url_for("/chat"),
            access_token: backend.access_token.clone().filter(|t| !t.is_empty()),
        }
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }
}

impl ChatStreamClient for HttpChatClient {
    fn stream_reply(&self, history: Vec<Message>) -> ChatStream {
        let Some(url) = self.url.clone() else {
            debug!("Mock backend, empty chat reply");
            return futures::stream::empty().boxed();
        };

        let mut request = self
            .client
            .post(url)
            .json(&ChatRequest::from_history(&history));
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        try_stream! {
            let response = request.send().await.map_err(network_error)?;
            let mut body = response
                .error_for_status()
                .map_err(network_error)?
                .bytes_stream();

            let mut lines = LineBuffer::default();
            while let Some(bytes) = body.next().await {
                let bytes = bytes.map_err(network_error)?;
                for line in lines.push(&bytes) {
                    yield line;
                }
            }
            if let Some(rest) = lines.finish() {
                yield rest;
            }
        }
        .boxed()
    }
}

fn network_error(e: reqwest::Error) -> SessionError {
    SessionError::Network(e.to_string())
}

/// Splits a byte stream into lines without breaking multi-byte characters
#[derive(Debug, Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(decode_line(&line[..line.len() - 1]));
        }
        lines
    }

    fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(decode_line(&rest))
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendEnvironment;

    #[test]
    fn test_line_buffer_splits_across_pushes() {
        let mut buffer = LineBuffer::default();
        assert!(buffer.push(b"Cla").is_empty());
        assert_eq!(buffer.push(b"ro\r\n\xc2\xbfqu"), vec!["Claro".to_string()]);
        assert_eq!(buffer.push("\u{e9} tal?\n".as_bytes()), vec!["¿qué tal?".to_string()]);
        assert_eq!(buffer.finish(), None);
    }

    #[test]
    fn test_line_buffer_flushes_tail() {
        let mut buffer = LineBuffer::default();
        buffer.push(b"sin salto");
        assert_eq!(buffer.finish().as_deref(), Some("sin salto"));
    }

    #[test]
    fn test_request_roles() {
        let history = vec![Message::assistant("¡Hola!"), Message::user("Hola Sancho")];
        let request = ChatRequest::from_history(&history);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "assistant");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["messages"][1]["content"], "Hola Sancho");
    }

    #[test]
    fn test_mock_backend_yields_nothing() {
        let backend = BackendConfig {
            environment: BackendEnvironment::Mock,
            ..Default::default()
        };
        let client = HttpChatClient::new(&backend);
        assert!(client.url().is_none());

        let chunks: Vec<_> =
            futures::executor::block_on(client.stream_reply(vec![Message::user("Hola")]).collect());
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_live_url() {
        let backend = BackendConfig {
            environment: BackendEnvironment::Live("http://localhost:4000".into()),
            ..Default::default()
        };
        assert_eq!(
            HttpChatClient::new(&backend).url(),
            Some("http://localhost:4000/chat")
        );
    }
}
