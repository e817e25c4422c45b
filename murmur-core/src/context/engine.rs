//! Context engine: windows backed by the memory log

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use super::window::{ContextSnapshot, ContextWindow};
use crate::config::ContextConfig;
use crate::engagement::EngagementDecision;
use crate::error::Result;
use crate::memory::{MemoryLog, MemoryRecord};
use crate::message::Message;

type Slot = Arc<Mutex<Option<ContextWindow>>>;

/// Owns one [`ContextWindow`] per scope and keeps the [`MemoryLog`] in step.
///
/// Windows are backfilled from the log on first access. Every message is
/// appended to the log before it enters the window; when the append fails the
/// engine keeps going in degraded mode (the window still updates, long-term
/// recall for that record is lost).
pub struct ContextEngine {
    log: Arc<dyn MemoryLog>,
    capacity: usize,
    windows: RwLock<HashMap<String, Slot>>,
}

impl std::fmt::Debug for ContextEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextEngine")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl ContextEngine {
    /// Create an engine over `log`
    pub fn new(log: Arc<dyn MemoryLog>, config: &ContextConfig) -> Self {
        Self {
            log,
            capacity: config.capacity.max(1),
            windows: RwLock::new(HashMap::new()),
        }
    }

    /// Per-scope window capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Backing memory log
    pub fn log(&self) -> &Arc<dyn MemoryLog> {
        &self.log
    }

    /// Record a message and, if it should reach the agent, snapshot the window.
    ///
    /// Returns a snapshot (including `message`) when the message is directed
    /// at the agent or the decision escalates; otherwise records it for
    /// bookkeeping and returns `None`.
    pub async fn on_message(
        &self,
        message: &Message,
        scope: &str,
        decision: &EngagementDecision,
    ) -> Option<ContextSnapshot> {
        let slot = self.slot(scope).await;
        let mut guard = slot.lock().await;
        let window = self.loaded(&mut guard, scope).await;

        self.append_durably(scope, message).await;
        window.push(message.clone());

        if message.directed_at_agent || decision.should_escalate() {
            Some(window.snapshot())
        } else {
            None
        }
    }

    /// Remember an agent reply in the window and the log
    pub async fn remember_reply(
        &self,
        scope: &str,
        sender: &str,
        text: &str,
        at: DateTime<Utc>,
    ) {
        let reply = Message {
            sender: sender.to_string(),
            content: text.to_string(),
            source: scope.to_string(),
            group_id: None,
            directed_at_agent: false,
            timestamp: at,
        };

        let slot = self.slot(scope).await;
        let mut guard = slot.lock().await;
        let window = self.loaded(&mut guard, scope).await;

        self.append_durably(scope, &reply).await;
        window.push(reply);
    }

    /// Reseed a scope's window from the most recent log records.
    ///
    /// Idempotent: with an unchanged log, repeated calls produce the same
    /// window. Returns the number of messages loaded.
    pub async fn backfill(&self, scope: &str) -> Result<usize> {
        let slot = self.slot(scope).await;
        let mut guard = slot.lock().await;
        let records = self.log.read_tail(scope, self.capacity).await?;

        let window = guard.get_or_insert_with(|| ContextWindow::new(scope, self.capacity));
        window.reseed(records.iter().map(MemoryRecord::to_message));

        tracing::debug!(scope = %scope, loaded = window.len(), "Backfilled context window");
        Ok(window.len())
    }

    /// Backfill every scope present in the log
    pub async fn backfill_all(&self) -> Result<usize> {
        let scopes = self.log.scopes().await?;
        for scope in &scopes {
            self.backfill(scope).await?;
        }
        tracing::info!(scopes = scopes.len(), "Backfilled context windows");
        Ok(scopes.len())
    }

    /// Ordered copy of a scope's window
    pub async fn snapshot(&self, scope: &str) -> ContextSnapshot {
        let slot = self.slot(scope).await;
        let mut guard = slot.lock().await;
        self.loaded(&mut guard, scope).await.snapshot()
    }

    async fn append_durably(&self, scope: &str, message: &Message) {
        let mut record = MemoryRecord::from_message(message);
        record.scope = scope.to_string();

        if let Err(e) = self.log.append(&record).await {
            tracing::error!(
                scope = %scope,
                error = %e,
                "Memory log append failed, continuing in degraded mode"
            );
        }
    }

    async fn slot(&self, scope: &str) -> Slot {
        if let Some(slot) = self.windows.read().await.get(scope) {
            return Arc::clone(slot);
        }
        let mut windows = self.windows.write().await;
        Arc::clone(windows.entry(scope.to_string()).or_default())
    }

    async fn loaded<'a>(
        &self,
        guard: &'a mut Option<ContextWindow>,
        scope: &str,
    ) -> &'a mut ContextWindow {
        if guard.is_none() {
            let mut window = ContextWindow::new(scope, self.capacity);
            match self.log.read_tail(scope, self.capacity).await {
                Ok(records) => window.reseed(records.iter().map(MemoryRecord::to_message)),
                Err(e) => {
                    tracing::warn!(
                        scope = %scope,
                        error = %e,
                        "Backfill failed, starting with an empty window"
                    );
                }
            }
            *guard = Some(window);
        }
        guard.get_or_insert_with(|| ContextWindow::new(scope, self.capacity))
    }
}
