//! # Murmur - Engagement and Memory Core for Always-On Agents
//!
//! Murmur decides, for a conversational agent sitting in group chats, *when*
//! it should speak and *what it remembers*:
//! - A per-scope heartbeat/tension state machine governing spontaneous
//!   participation
//! - A bounded conversation window with crash-safe backfill
//! - A durable append-only long-term memory log
//! - A fixed-order pipeline with pluggable observation hooks
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use murmur_core::prelude::*;
//! use std::sync::Arc;
//!
//! struct Quiet;
//!
//! #[async_trait::async_trait]
//! impl Agent for Quiet {
//!     async fn respond(&self, _request: &AgentRequest) -> Result<AgentReply> {
//!         Ok(AgentReply::decline())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = MurmurConfig::load()?;
//!     let orchestrator = Orchestrator::from_config(&config, Arc::new(Quiet)).await?;
//!
//!     // Unaddressed chatter warms the heartbeat; a mention always escalates
//!     orchestrator.process("anyone around?", false, "qq_group", Some("42")).await;
//!     let reply = orchestrator.process("hey bot", true, "qq_group", Some("42")).await;
//!     assert!(reply.is_none());
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **memory**: durable JSON-lines log, the source of truth for history
//! - **engagement**: heartbeat/tension per scope, persisted to SQLite
//! - **context**: bounded windows over the memory log's tail
//! - **workflow**: Adapter → Router → Engagement → Context → Agent

pub mod config;
pub mod context;
pub mod engagement;
pub mod error;
pub mod memory;
pub mod message;
pub mod workflow;

/// Current library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{
        ConfigBuilder, ContextConfig, EngagementConfig, MemoryConfig, MurmurConfig, StoreConfig,
        WorkflowConfig,
    };
    pub use crate::context::{ContextEngine, ContextSnapshot, ContextWindow};
    pub use crate::engagement::{
        AlwaysRelated, EngagementDecision, EngagementPhase, EngagementRecord, EngagementState,
        EngagementStore, Escalation, FixedSampler, InMemoryEngagementStore, KeywordOverlap,
        RandomSampler, RelevancePredicate, SqliteEngagementStore, TenseOrigin, TriggerSampler,
    };
    pub use crate::error::{MurmurError, Result};
    pub use crate::memory::{JsonlMemoryLog, MemoryLog, MemoryRecord};
    pub use crate::message::{DEFAULT_SCOPE, Message, scope_key};
    pub use crate::workflow::{
        Agent, AgentReply, AgentRequest, DefaultRouter, HookRegistry, InboundEvent, LoggingHook,
        Normalized, Orchestrator, OrchestratorBuilder, ReplyMode, Router, StructuredCommand,
        WorkflowEvent, WorkflowHook,
    };
}
