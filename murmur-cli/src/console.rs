//! Console adapter and echo agent for `murmur chat`

use async_trait::async_trait;
use murmur_core::error::Result;
use murmur_core::workflow::{Agent, AgentReply, AgentRequest, InboundEvent, ReplyMode};

/// Repeats the triggering message back.
///
/// Declines spontaneous turns unless `chatty` is set, so unaddressed console
/// chatter only shows up in the engagement logs.
pub struct EchoAgent {
    chatty: bool,
}

impl EchoAgent {
    pub fn new(chatty: bool) -> Self {
        Self { chatty }
    }
}

#[async_trait]
impl Agent for EchoAgent {
    async fn respond(&self, request: &AgentRequest) -> Result<AgentReply> {
        let content = &request.message.content;
        let reply = match request.mode {
            ReplyMode::Addressed => AgentReply::reply(format!("you said: {}", content)),
            ReplyMode::Engaged => AgentReply::reply(format!(
                "still with you ({} messages in view): {}",
                request.snapshot.len(),
                content
            )),
            ReplyMode::Spontaneous if self.chatty => {
                AgentReply::reply(format!("couldn't help overhearing: {}", content))
            }
            ReplyMode::Spontaneous => AgentReply::decline(),
        };
        Ok(reply)
    }
}

/// Turns one stdin line into an inbound event.
///
/// A leading `@` marks the line as addressed to the agent. Blank lines are
/// passed through so the pipeline can report them as ignored.
pub fn parse_line(line: &str, source: &str, scope: Option<&str>, sender: &str) -> InboundEvent {
    let trimmed = line.trim();
    let (content, at_user) = match trimmed.strip_prefix('@') {
        Some(rest) => (rest.trim_start(), true),
        None => (trimmed, false),
    };

    let mut event = InboundEvent::new(content, source)
        .at_user(at_user)
        .from_sender(sender);
    event.scope = scope.map(str::to_string);
    event
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_core::context::ContextSnapshot;
    use murmur_core::message::Message;

    fn request(mode: ReplyMode) -> AgentRequest {
        let message = Message::new("you", "hi");
        AgentRequest {
            scope: "console".into(),
            snapshot: ContextSnapshot {
                scope: "console".into(),
                messages: vec![message.clone()],
            },
            message,
            mode,
        }
    }

    #[test]
    fn test_parse_line() {
        let event = parse_line("@ hello there ", "console", None, "you");
        assert!(event.at_user);
        assert_eq!(event.content, "hello there");
        assert_eq!(event.sender.as_deref(), Some("you"));

        let event = parse_line("just talking", "console", Some("room1"), "you");
        assert!(!event.at_user);
        assert_eq!(event.scope.as_deref(), Some("room1"));
    }

    #[tokio::test]
    async fn test_echo_agent_modes() {
        let quiet = EchoAgent::new(false);
        assert!(quiet.respond(&request(ReplyMode::Addressed)).await.unwrap().should_reply);
        assert!(!quiet.respond(&request(ReplyMode::Spontaneous)).await.unwrap().should_reply);

        let chatty = EchoAgent::new(true);
        assert!(chatty.respond(&request(ReplyMode::Spontaneous)).await.unwrap().should_reply);
    }
}
