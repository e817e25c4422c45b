//! Fixed-order message pipeline with pluggable observation hooks
//!
//! Every inbound event runs through **Adapter → Router → Engagement →
//! Context → Agent**. Adapter, Router and Agent are external collaborators
//! behind narrow traits; Engagement and Context are the core components.
//! Registered [`WorkflowHook`]s observe each stage transition.
//!
//! # Example
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use murmur_core::config::MurmurConfig;
//! use murmur_core::error::Result;
//! use murmur_core::workflow::{Agent, AgentReply, AgentRequest, Orchestrator};
//! use std::sync::Arc;
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl Agent for Echo {
//!     async fn respond(&self, request: &AgentRequest) -> Result<AgentReply> {
//!         Ok(AgentReply::reply(format!("you said: {}", request.message.content)))
//!     }
//! }
//!
//! # async fn demo() -> Result<()> {
//! let orchestrator = Orchestrator::from_config(&MurmurConfig::load()?, Arc::new(Echo)).await?;
//! let reply = orchestrator
//!     .process("hello", true, "qq_group", Some("42"))
//!     .await;
//! # Ok(())
//! # }
//! ```

mod hooks;
mod orchestrator;
mod ports;

pub use hooks::{HookRegistry, LoggingHook, WorkflowEvent, WorkflowHook};
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
pub use ports::{
    Agent, AgentReply, AgentRequest, DefaultRouter, InboundEvent, Normalized, ReplyMode, Router,
    StructuredCommand,
};
