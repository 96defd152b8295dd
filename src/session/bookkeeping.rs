//! Session bookkeeping
//!
//! Pure data operations on a `Session`. The orchestrator is the only writer.

use super::types::{Message, MessageStatus, Session};
use chrono::{DateTime, Utc};
use uuid::Uuid;

impl Session {
    /// Load a prior session for another round of conversation
    ///
    /// Messages are put back into timestamp order. A reply that was still
    /// streaming when the session was last saved can no longer complete, so it
    /// is marked failed.
    pub fn resume(mut self) -> Self {
        self.messages.sort_by_key(|m| m.timestamp);
        for message in &mut self.messages {
            if message.status.is_streaming() {
                message.status = MessageStatus::Failed;
            }
        }
        self.message_count = self.messages.len();
        self
    }

    /// Append a message, keeping timestamps non-decreasing
    pub fn append(&mut self, mut message: Message) -> &Message {
        if let Some(last) = self.messages.last() {
            if message.timestamp < last.timestamp {
                message.timestamp = last.timestamp;
            }
        }
        self.messages.push(message);
        self.message_count = self.messages.len();
        // Just pushed
        &self.messages[self.messages.len() - 1]
    }

    /// The message still receiving chunks, if any
    pub fn in_flight(&self) -> Option<&Message> {
        self.messages.last().filter(|m| m.status.is_streaming())
    }

    /// Append streamed text to the in-flight message
    ///
    /// Returns false when `id` is not the in-flight message.
    pub fn append_to_in_flight(&mut self, id: Uuid, chunk: &str) -> bool {
        match self.in_flight_mut(id) {
            Some(message) => {
                message.text.push_str(chunk);
                true
            }
            None => false,
        }
    }

    /// Close the in-flight message with a final status
    pub fn settle_in_flight(&mut self, id: Uuid, status: MessageStatus) -> Option<&Message> {
        let message = self.in_flight_mut(id)?;
        message.status = status;
        Some(message)
    }

    /// Set `ended_at`, overwriting any previous value
    pub fn mark_ended(&mut self, at: DateTime<Utc>) {
        self.ended_at = Some(at);
    }

    pub fn end_now(&mut self) {
        self.mark_ended(Utc::now());
    }

    /// Whether timestamps are non-decreasing in conversation order
    pub fn is_ordered(&self) -> bool {
        self.messages
            .windows(2)
            .all(|pair| pair[0].timestamp <= pair[1].timestamp)
    }

    fn in_flight_mut(&mut self, id: Uuid) -> Option<&mut Message> {
        self.messages
            .last_mut()
            .filter(|m| m.id == id && m.status.is_streaming())
    }
}
