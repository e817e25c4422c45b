//! Short-term conversational context
//!
//! Each scope has a bounded [`ContextWindow`] of its most recent messages.
//! The window is a cache over the tail of the [`MemoryLog`](crate::memory::MemoryLog):
//! it is rebuilt from the log on startup (backfill) and mutated incrementally
//! afterwards, never persisted on its own.

mod engine;
mod window;


pub use engine::ContextEngine;
pub use window::{ContextSnapshot, ContextWindow};
