//! Memory record type

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::Message;

/// One durable log entry.
///
/// Serialized as a single JSON object per line:
/// `{timestamp, scope, sender, content, directed_at_agent}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// When the message was received
    pub timestamp: DateTime<Utc>,

    /// Scope key the message belongs to
    pub scope: String,

    /// Sender identity
    pub sender: String,

    /// Message content
    pub content: String,

    /// Whether the message was directed at the agent
    #[serde(default)]
    pub directed_at_agent: bool,
}

impl MemoryRecord {
    /// Build a record from an inbound message
    pub fn from_message(message: &Message) -> Self {
        Self {
            timestamp: message.timestamp,
            scope: message.scope(),
            sender: message.sender.clone(),
            content: message.content.clone(),
            directed_at_agent: message.directed_at_agent,
        }
    }

    /// Rebuild the message this record was written from.
    ///
    /// The scope key is kept whole as the source; it round-trips through
    /// [`Message::scope`] unchanged.
    pub fn to_message(&self) -> Message {
        Message {
            sender: self.sender.clone(),
            content: self.content.clone(),
            source: self.scope.clone(),
            group_id: None,
            directed_at_agent: self.directed_at_agent,
            timestamp: self.timestamp,
        }
    }
}
