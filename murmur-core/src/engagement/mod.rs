//! Engagement: when should the agent speak?
//!
//! Every scope carries a heartbeat scalar and a tension flag. Unaddressed
//! chatter slowly warms the heartbeat, and each message is a chance (scaled
//! by heartbeat) for the agent to join in unprompted. An explicit mention
//! puts the scope into Tense with a fixed hold; a spontaneous invocation puts
//! it into a relevance-gated Tense that collapses as soon as the conversation
//! moves on.
//!
//! ```text
//!            unaddressed msg                 mention / draw + invoke
//!   Idle ───────────────────▶ Warming ───────────────────────────▶ Tense
//!    ▲                           │                                   │
//!    └───────────────────────────┴──── expiry / unrelated follow-up ─┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use murmur_core::config::EngagementConfig;
//! use murmur_core::engagement::{EngagementState, InMemoryEngagementStore};
//! use murmur_core::message::Message;
//! use std::sync::Arc;
//!
//! # async fn demo() {
//! let state = EngagementState::new(
//!     EngagementConfig::default(),
//!     Arc::new(InMemoryEngagementStore::new()),
//! );
//!
//! let msg = Message::new("alice", "hey bot").directed(true);
//! let decision = state.observe(&msg, "console").await;
//! assert!(decision.should_escalate());
//! # }
//! ```

mod record;
mod relevance;
mod sampler;
mod state;
mod store;


pub use record::{EngagementPhase, EngagementRecord, TenseOrigin};
pub use relevance::{AlwaysRelated, KeywordOverlap, RelevancePredicate};
pub use sampler::{FixedSampler, RandomSampler, TriggerSampler};
pub use state::{EngagementDecision, EngagementState, Escalation};
pub use store::{EngagementStore, InMemoryEngagementStore, SqliteEngagementStore};
