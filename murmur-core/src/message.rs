//! Inbound message model and scope keys

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Scope used when neither a source nor a scope id is available
pub const DEFAULT_SCOPE: &str = "default";

/// One inbound utterance.
///
/// Messages are immutable once created; the pipeline only ever clones them
/// into context windows and memory records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Sender identity (display name or platform user id)
    pub sender: String,

    /// Normalized content text
    pub content: String,

    /// Source or channel identifier (e.g. `qq_group`, `console`)
    pub source: String,

    /// Optional group identifier within the source
    pub group_id: Option<String>,

    /// Whether the message is explicitly directed at the agent
    pub directed_at_agent: bool,

    /// When the message was received
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a message received now
    pub fn new(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            content: content.into(),
            source: DEFAULT_SCOPE.to_string(),
            group_id: None,
            directed_at_agent: false,
            timestamp: Utc::now(),
        }
    }

    /// Set the source identifier
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Set the group identifier
    pub fn with_group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    /// Mark the message as directed at the agent
    pub fn directed(mut self, directed: bool) -> Self {
        self.directed_at_agent = directed;
        self
    }

    /// Override the receive timestamp
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Scope key this message belongs to
    pub fn scope(&self) -> String {
        scope_key(&self.source, self.group_id.as_deref())
    }
}

/// Derive the conversation scope key from a source and optional scope id.
///
/// `("qq_group", Some("42"))` becomes `qq_group:42`; a bare source is its own
/// scope, and an empty source falls back to [`DEFAULT_SCOPE`].
pub fn scope_key(source: &str, scope: Option<&str>) -> String {
    let source = source.trim();
    match scope.map(str::trim).filter(|s| !s.is_empty()) {
        Some(id) if !source.is_empty() => format!("{}:{}", source, id),
        Some(id) => id.to_string(),
        None if !source.is_empty() => source.to_string(),
        None => DEFAULT_SCOPE.to_string(),
    }
}
