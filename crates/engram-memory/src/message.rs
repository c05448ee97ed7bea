//! Conversation messages

use engram_core::EventTime;
use serde::{Deserialize, Serialize};

/// Role of a message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

/// A single message in the conversation stream
///
/// Immutable once created; produced by the host and handed to the
/// orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,

    /// When the message was produced; `None` when the host does not
    /// track message times
    pub timestamp: Option<EventTime>,
}

impl Message {
    /// Create a user message stamped with the current time
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            timestamp: Some(EventTime::now()),
        }
    }

    /// Create an assistant message stamped with the current time
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            timestamp: Some(EventTime::now()),
        }
    }

    /// Create a system message stamped with the current time
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
            timestamp: Some(EventTime::now()),
        }
    }

    /// Builder: replace the timestamp
    pub fn at(mut self, timestamp: EventTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Builder: drop the timestamp
    pub fn untimed(mut self) -> Self {
        self.timestamp = None;
        self
    }
}
