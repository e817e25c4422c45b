//! Pipeline observation hooks

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::Result;

/// Event emitted at a pipeline stage boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEvent {
    /// Event ID
    pub id: Uuid,

    /// Event name, e.g. `engagement.checked`
    pub name: String,

    /// Scope the pipeline run belongs to
    pub scope: String,

    /// Timestamp
    pub timestamp: DateTime<Utc>,

    /// Small structured payload
    pub payload: serde_json::Value,
}

impl WorkflowEvent {
    /// Create an event stamped now
    pub fn new(
        name: impl Into<String>,
        scope: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            scope: scope.into(),
            timestamp: Utc::now(),
            payload,
        }
    }
}

/// Observer of pipeline stage transitions.
///
/// Hooks run synchronously on the pipeline task, so they should be quick.
/// Errors and panics are caught by the [`HookRegistry`] and never reach the
/// pipeline.
pub trait WorkflowHook: Send + Sync {
    /// Handle one event
    fn on_event(&self, event: &WorkflowEvent) -> Result<()>;

    /// Name used when a failure is logged
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

impl<F> WorkflowHook for F
where
    F: Fn(&WorkflowEvent) -> Result<()> + Send + Sync,
{
    fn on_event(&self, event: &WorkflowEvent) -> Result<()> {
        self(event)
    }
}

/// Ordered list of hooks
#[derive(Clone, Default)]
pub struct HookRegistry {
    hooks: Vec<Arc<dyn WorkflowHook>>,
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("hooks", &self.hooks.iter().map(|h| h.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl HookRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook; hooks run in registration order
    pub fn register(&mut self, hook: Arc<dyn WorkflowHook>) {
        self.hooks.push(hook);
    }

    /// Number of registered hooks
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Whether no hooks are registered
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Build an event and dispatch it to every hook
    pub fn emit(&self, name: &str, scope: &str, payload: serde_json::Value) {
        if self.hooks.is_empty() {
            return;
        }
        self.dispatch(&WorkflowEvent::new(name, scope, payload));
    }

    /// Dispatch an event to every hook in order, isolating failures
    pub fn dispatch(&self, event: &WorkflowEvent) {
        for hook in &self.hooks {
            match catch_unwind(AssertUnwindSafe(|| hook.on_event(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(
                        hook = hook.name(),
                        event = %event.name,
                        error = %e,
                        "Workflow hook failed"
                    );
                }
                Err(_) => {
                    tracing::error!(
                        hook = hook.name(),
                        event = %event.name,
                        "Workflow hook panicked"
                    );
                }
            }
        }
    }
}

/// Logs every workflow event
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHook;

impl WorkflowHook for LoggingHook {
    fn on_event(&self, event: &WorkflowEvent) -> Result<()> {
        tracing::info!(
            target: "murmur::workflow",
            event = %event.name,
            scope = %event.scope,
            payload = %event.payload,
            "Workflow event"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "logging"
    }
}
