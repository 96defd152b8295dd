use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sender {
    User,
    Assistant,
}

impl Sender {
    /// Role name used by chat backends
    pub fn role(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Assistant => "assistant",
        }
    }
}

/// Delivery status of a message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageStatus {
    /// Assistant reply still receiving chunks
    Streaming,
    #[default]
    Complete,
    /// Stream failed; text holds whatever arrived
    Failed,
    /// Superseded by a newer turn before completion
    Cancelled,
}

impl MessageStatus {
    pub fn is_streaming(&self) -> bool {
        matches!(self, MessageStatus::Streaming)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub text: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub status: MessageStatus,
}

impl Message {
    pub fn new(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            sender,
            timestamp: Utc::now(),
            status: MessageStatus::Complete,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Sender::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Sender::Assistant, text)
    }

    /// Empty assistant message that receives streamed chunks
    pub fn placeholder() -> Self {
        Self {
            status: MessageStatus::Streaming,
            ..Self::assistant(String::new())
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn is_user(&self) -> bool {
        matches!(self.sender, Sender::User)
    }

    pub fn is_completed_reply(&self) -> bool {
        self.sender == Sender::Assistant && self.status == MessageStatus::Complete
    }
}

/// A practice conversation and its transcript
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub topic: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub message_count: usize,
    #[serde(default)]
    pub words_learned: Vec<String>,
}

impl Session {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            ended_at: None,
            topic: topic.into(),
            messages: Vec::new(),
            message_count: 0,
            words_learned: Vec::new(),
        }
    }

    pub fn is_new(&self) -> bool {
        self.messages.is_empty()
    }

    /// Most recent assistant reply that finished streaming
    pub fn last_completed_reply(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.is_completed_reply())
    }

    pub fn completed_assistant_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_completed_reply()).count()
    }

    pub fn user_message_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_user()).count()
    }

    pub fn message(&self, id: Uuid) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }
}
