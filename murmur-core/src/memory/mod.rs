//! Durable long-term memory
//!
//! The memory log is the source of truth for conversation history. It is an
//! append-only, chronological record of every message that entered a context
//! window; context windows are bounded views over its tail.
//!
//! # Example
//!
//! ```rust,no_run
//! use murmur_core::memory::{JsonlMemoryLog, MemoryLog, MemoryRecord};
//! use murmur_core::message::Message;
//!
//! # async fn demo() -> murmur_core::error::Result<()> {
//! let log = JsonlMemoryLog::open("data/memory_pool.jsonl").await?;
//! let msg = Message::new("alice", "hello").with_source("qq_group").with_group("42");
//! log.append(&MemoryRecord::from_message(&msg)).await?;
//!
//! let recent = log.read_tail("qq_group:42", 100).await?;
//! # Ok(())
//! # }
//! ```

mod log;
mod record;

pub use log::JsonlMemoryLog;
pub use record::MemoryRecord;

use crate::error::Result;
use async_trait::async_trait;

/// Append-only record store backing every context window
#[async_trait]
pub trait MemoryLog: Send + Sync {
    /// Durably persist one record.
    ///
    /// Success means the record has been synchronized to storage.
    async fn append(&self, record: &MemoryRecord) -> Result<()>;

    /// Up to `n` most recent records for a scope, oldest first.
    ///
    /// Malformed entries are skipped, never fatal.
    async fn read_tail(&self, scope: &str, n: usize) -> Result<Vec<MemoryRecord>>;

    /// Distinct scopes present in the log, in first-seen order
    async fn scopes(&self) -> Result<Vec<String>>;
}
