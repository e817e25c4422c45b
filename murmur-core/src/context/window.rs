//! Bounded per-scope message window

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::message::Message;

/// Ordered copy of a window, handed to the agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    /// Scope the snapshot was taken from
    pub scope: String,

    /// Messages, oldest first
    pub messages: Vec<Message>,
}

impl ContextSnapshot {
    /// Number of messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the snapshot holds no messages
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Most recent message
    pub fn latest(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Render as `sender: content` lines
    pub fn transcript(&self) -> String {
        self.messages
            .iter()
            .map(|m| format!("{}: {}", m.sender, m.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Capacity-bounded, insertion-ordered message buffer with FIFO eviction.
///
/// The window never holds more than `capacity` messages.
#[derive(Debug, Clone)]
pub struct ContextWindow {
    scope: String,
    capacity: usize,
    messages: VecDeque<Message>,
}

impl ContextWindow {
    /// Create an empty window; capacity is at least one
    pub fn new(scope: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            scope: scope.into(),
            capacity,
            messages: VecDeque::with_capacity(capacity),
        }
    }

    /// Scope key
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Maximum number of messages held
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current number of messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the window is empty
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Append a message, returning the evicted oldest entry if full
    pub fn push(&mut self, message: Message) -> Option<Message> {
        let evicted = if self.messages.len() >= self.capacity {
            self.messages.pop_front()
        } else {
            None
        };
        self.messages.push_back(message);
        evicted
    }

    /// Replace the contents, keeping only the newest `capacity` messages
    pub fn reseed(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.clear();
        for message in messages {
            self.push(message);
        }
    }

    /// Messages, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    /// Ordered copy of the current contents
    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            scope: self.scope.clone(),
            messages: self.messages.iter().cloned().collect(),
        }
    }
}
