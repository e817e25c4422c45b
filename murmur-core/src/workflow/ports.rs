//! Collaborator contracts: adapter input, router and agent

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::ContextSnapshot;
use crate::engagement::{EngagementDecision, Escalation};
use crate::error::Result;
use crate::message::Message;

/// Raw event handed over by an adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Raw content text
    pub content: String,

    /// Whether the platform flagged the agent as addressed
    pub at_user: bool,

    /// Source or channel identifier
    pub source: String,

    /// Optional scope id within the source (e.g. group id)
    pub scope: Option<String>,

    /// Sender identity, if known
    pub sender: Option<String>,

    /// When the adapter received the event
    pub received_at: DateTime<Utc>,
}

impl InboundEvent {
    /// Create an unaddressed event received now
    pub fn new(content: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            at_user: false,
            source: source.into(),
            scope: None,
            sender: None,
            received_at: Utc::now(),
        }
    }

    /// Set the addressed flag
    pub fn at_user(mut self, at_user: bool) -> Self {
        self.at_user = at_user;
        self
    }

    /// Set the scope id
    pub fn in_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Set the sender
    pub fn from_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    /// Override the receive time
    pub fn received_at(mut self, at: DateTime<Utc>) -> Self {
        self.received_at = at;
        self
    }
}

/// `<prefix><name> [args]` command recognised by a router
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredCommand {
    /// Lower-cased command name
    pub name: String,

    /// Remaining text after the name
    pub args: String,
}

impl StructuredCommand {
    /// Parse `content` if it starts with `prefix` followed by a name
    pub fn parse(content: &str, prefix: &str) -> Option<Self> {
        if prefix.is_empty() {
            return None;
        }
        let rest = content.trim().strip_prefix(prefix)?;
        let mut parts = rest.splitn(2, char::is_whitespace);
        let name = parts.next().filter(|n| !n.is_empty())?;
        Some(Self {
            name: name.to_lowercase(),
            args: parts.next().unwrap_or("").trim().to_string(),
        })
    }
}

/// Router output
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    /// Normalized content text
    pub content: String,

    /// Whether the message is directed at the agent
    pub directed_at_agent: bool,

    /// Structured command, if one was recognised
    pub command: Option<StructuredCommand>,
}

/// Normalizes raw adapter events
#[async_trait]
pub trait Router: Send + Sync {
    /// Normalize content and classify whether it addresses the agent
    async fn normalize(&self, event: &InboundEvent) -> Result<Normalized>;

    /// Answer a structured command directly.
    ///
    /// `Ok(None)` lets the message continue through the pipeline.
    async fn handle_command(
        &self,
        _command: &StructuredCommand,
        _event: &InboundEvent,
    ) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Trims content, recognises `prefix`-commands and answers `help`/`ping`
#[derive(Debug, Clone)]
pub struct DefaultRouter {
    prefix: String,
}

impl DefaultRouter {
    /// Create with a command prefix (empty disables commands)
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn help_text(&self) -> String {
        format!(
            "Commands:\n  {p}help  show this message\n  {p}ping  check that I'm listening",
            p = self.prefix
        )
    }
}

impl Default for DefaultRouter {
    fn default() -> Self {
        Self::new("/")
    }
}

#[async_trait]
impl Router for DefaultRouter {
    async fn normalize(&self, event: &InboundEvent) -> Result<Normalized> {
        let content = event.content.trim().to_string();
        let command = StructuredCommand::parse(&content, &self.prefix);

        Ok(Normalized {
            directed_at_agent: event.at_user || command.is_some(),
            content,
            command,
        })
    }

    async fn handle_command(
        &self,
        command: &StructuredCommand,
        _event: &InboundEvent,
    ) -> Result<Option<String>> {
        let reply = match command.name.as_str() {
            "help" => Some(self.help_text()),
            "ping" => Some("pong".to_string()),
            _ => None,
        };
        Ok(reply)
    }
}

/// Why the agent is being asked to reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyMode {
    /// The message addressed the agent
    Addressed,

    /// Related follow-up during an active Tense window
    Engaged,

    /// Heartbeat-triggered participation; declining is expected
    Spontaneous,
}

impl ReplyMode {
    /// Derive the mode from an engagement decision
    pub fn from_decision(decision: &EngagementDecision) -> Self {
        match decision.escalation {
            Escalation::Continue => ReplyMode::Engaged,
            Escalation::Spontaneous => ReplyMode::Spontaneous,
            Escalation::Mention | Escalation::Ignore => ReplyMode::Addressed,
        }
    }

    /// Stable name used in events
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplyMode::Addressed => "addressed",
            ReplyMode::Engaged => "engaged",
            ReplyMode::Spontaneous => "spontaneous",
        }
    }
}

/// Input to an agent call
#[derive(Debug, Clone)]
pub struct AgentRequest {
    /// Message that triggered the call
    pub message: Message,

    /// Scope key
    pub scope: String,

    /// Window contents, oldest first, ending with `message`
    pub snapshot: ContextSnapshot,

    /// Why the agent is being asked
    pub mode: ReplyMode,
}

/// Agent answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentReply {
    /// Reply text
    pub text: String,

    /// `false` means the agent chose not to speak
    pub should_reply: bool,
}

impl AgentReply {
    /// A reply to send
    pub fn reply(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            should_reply: true,
        }
    }

    /// Decline to reply
    pub fn decline() -> Self {
        Self {
            text: String::new(),
            should_reply: false,
        }
    }
}

/// Language-model backed responder
#[async_trait]
pub trait Agent: Send + Sync {
    /// Produce a reply (or decline) for the request
    async fn respond(&self, request: &AgentRequest) -> Result<AgentReply>;
}
