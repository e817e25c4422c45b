//! Per-message pipeline: Adapter → Router → Engagement → Context → Agent

use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::hooks::{HookRegistry, LoggingHook, WorkflowHook};
use super::ports::{
    Agent, AgentReply, AgentRequest, DefaultRouter, InboundEvent, ReplyMode, Router,
};
use crate::config::{MurmurConfig, StoreConfig, WorkflowConfig};
use crate::context::ContextEngine;
use crate::engagement::{
    EngagementState, EngagementStore, Escalation, InMemoryEngagementStore, SqliteEngagementStore,
};
use crate::error::{MurmurError, Result};
use crate::memory::JsonlMemoryLog;
use crate::message::{Message, scope_key};

/// Per-scope mutual exclusion around engagement/context mutation
#[derive(Default)]
struct ScopeLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ScopeLocks {
    async fn get(&self, scope: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(scope.to_string()).or_default())
    }
}

/// How an agent call ended
enum AgentOutcome {
    Replied(String),
    Declined,
    Failed,
    TimedOut,
}

/// Threads one inbound event through routing, engagement, context and the
/// agent, emitting hook events at each stage boundary.
///
/// Engagement and context mutation for a scope happens under that scope's
/// lock; the agent call runs outside it so other messages for the scope are
/// still recorded while a reply is pending. Collaborator failures end the run
/// with no reply.
///
/// # Events
///
/// | name | when |
/// |------|------|
/// | `adapter.captured` | every inbound event |
/// | `adapter.ignored` | content normalized to empty |
/// | `router.command` | router answered a structured command |
/// | `engagement.checked` | engagement decision made |
/// | `context.recorded` | message entered the window |
/// | `agent.invoked` | agent call started |
/// | `agent.declined` / `agent.failed` / `agent.timeout` | agent produced no reply |
/// | `workflow.replied` / `workflow.no_reply` | run finished |
pub struct Orchestrator {
    config: WorkflowConfig,
    router: Arc<dyn Router>,
    agent: Arc<dyn Agent>,
    engagement: Arc<EngagementState>,
    context: Arc<ContextEngine>,
    hooks: HookRegistry,
    locks: ScopeLocks,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Start building an orchestrator
    pub fn builder(
        engagement: Arc<EngagementState>,
        context: Arc<ContextEngine>,
        agent: Arc<dyn Agent>,
    ) -> OrchestratorBuilder {
        OrchestratorBuilder::new(engagement, context, agent)
    }

    /// Wire every component from configuration.
    ///
    /// Opens the memory log and engagement store and backfills every scope
    /// found in the log. Fails on invalid configuration or unusable storage.
    pub async fn from_config(config: &MurmurConfig, agent: Arc<dyn Agent>) -> Result<Self> {
        config.validate()?;

        let log = Arc::new(JsonlMemoryLog::open(&config.memory.log_path).await?);
        let store: Arc<dyn EngagementStore> = match &config.store {
            StoreConfig::Sqlite { path } => Arc::new(SqliteEngagementStore::open(path)?),
            StoreConfig::Memory => Arc::new(InMemoryEngagementStore::new()),
        };

        let engagement = Arc::new(EngagementState::new(config.engagement.clone(), store));
        let context = Arc::new(ContextEngine::new(log, &config.context));
        if let Err(e) = context.backfill_all().await {
            tracing::warn!(error = %e, "Startup backfill failed, windows will load lazily");
        }

        Ok(Self::builder(engagement, context, agent)
            .config(config.workflow.clone())
            .build())
    }

    /// Engagement state machine
    pub fn engagement(&self) -> &Arc<EngagementState> {
        &self.engagement
    }

    /// Context engine
    pub fn context(&self) -> &Arc<ContextEngine> {
        &self.context
    }

    /// Workflow configuration
    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Process one message from an adapter, received now.
    ///
    /// Returns the reply text, or `None` when the agent chose not to, or was
    /// not eligible to, respond.
    pub async fn process(
        &self,
        content: &str,
        at_user: bool,
        source: &str,
        scope: Option<&str>,
    ) -> Option<String> {
        let mut event = InboundEvent::new(content, source).at_user(at_user);
        event.scope = scope.map(str::to_string);
        self.process_event(event).await
    }

    /// Process one inbound event through the full pipeline
    pub async fn process_event(&self, event: InboundEvent) -> Option<String> {
        let scope_id = event
            .scope
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let scope = scope_key(&event.source, scope_id.as_deref());

        self.hooks.emit(
            "adapter.captured",
            &scope,
            json!({
                "source": event.source,
                "scope_id": scope_id,
                "at_user": event.at_user,
                "content_length": event.content.chars().count(),
            }),
        );

        if !self.is_allowed(scope_id.as_deref(), &scope) {
            tracing::debug!(scope = %scope, "Scope not in allowlist, dropping message");
            return None;
        }

        let normalized = match self.router.normalize(&event).await {
            Ok(normalized) => normalized,
            Err(e) => {
                tracing::warn!(scope = %scope, error = %e, "Router failed to normalize message");
                self.no_reply(&scope, "router_failed");
                return None;
            }
        };

        if normalized.content.trim().is_empty() {
            self.hooks
                .emit("adapter.ignored", &scope, json!({"reason": "empty_message"}));
            return None;
        }

        if let Some(command) = &normalized.command {
            match self.router.handle_command(command, &event).await {
                Ok(Some(reply)) => {
                    self.hooks.emit(
                        "router.command",
                        &scope,
                        json!({"command": command.name, "handled": true}),
                    );
                    return Some(reply);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        scope = %scope,
                        command = %command.name,
                        error = %e,
                        "Router failed to handle command"
                    );
                    self.no_reply(&scope, "router_failed");
                    return None;
                }
            }
        }

        let message = Message {
            sender: event.sender.clone().unwrap_or_else(|| "user".to_string()),
            content: normalized.content,
            source: event.source.clone(),
            group_id: scope_id,
            directed_at_agent: normalized.directed_at_agent,
            timestamp: event.received_at,
        };

        let lock = self.locks.get(&scope).await;

        let (decision, snapshot) = {
            let _guard = lock.lock().await;

            let decision = self.engagement.observe(&message, &scope).await;
            self.hooks.emit(
                "engagement.checked",
                &scope,
                json!({
                    "escalation": decision.escalation.as_str(),
                    "heartbeat": decision.heartbeat,
                    "is_tense": decision.is_tense,
                    "expired": decision.expired,
                    "collapsed": decision.collapsed,
                }),
            );

            let snapshot = self.context.on_message(&message, &scope, &decision).await;
            self.hooks.emit(
                "context.recorded",
                &scope,
                json!({
                    "directed_at_agent": message.directed_at_agent,
                    "escalated": snapshot.is_some(),
                }),
            );

            (decision, snapshot)
        };

        let Some(snapshot) = snapshot else {
            self.no_reply(&scope, "not_escalated");
            return None;
        };

        let mode = ReplyMode::from_decision(&decision);
        let request = AgentRequest {
            message,
            scope: scope.clone(),
            snapshot,
            mode,
        };

        self.hooks.emit(
            "agent.invoked",
            &scope,
            json!({"mode": mode.as_str(), "window": request.snapshot.len()}),
        );

        let started = tokio::time::Instant::now();
        let outcome = self.call_agent(&request).await;
        let finished_at = advance(request.message.timestamp, started.elapsed());

        let (reply, reason) = match outcome {
            AgentOutcome::Replied(text) => (Some(text), "replied"),
            AgentOutcome::Declined => {
                self.hooks
                    .emit("agent.declined", &scope, json!({"mode": mode.as_str()}));
                (None, "agent_declined")
            }
            AgentOutcome::Failed => (None, "agent_failed"),
            AgentOutcome::TimedOut => {
                self.hooks.emit(
                    "agent.timeout",
                    &scope,
                    json!({"timeout_ms": self.config.agent_timeout.as_millis() as u64}),
                );
                (None, "agent_timeout")
            }
        };

        {
            let _guard = lock.lock().await;
            let trigger = request.message.content.as_str();

            if decision.escalation == Escalation::Spontaneous {
                self.engagement
                    .mark_invoked(&scope, trigger, reply.as_deref(), finished_at)
                    .await;
            } else if let Some(text) = &reply {
                self.engagement
                    .refresh_focus(&scope, trigger, text, finished_at)
                    .await;
            }

            if let Some(text) = &reply {
                self.context
                    .remember_reply(&scope, &self.config.agent_name, text, finished_at)
                    .await;
            }
        }

        match &reply {
            Some(text) => self.hooks.emit(
                "workflow.replied",
                &scope,
                json!({"mode": mode.as_str(), "reply_length": text.chars().count()}),
            ),
            None => self.no_reply(&scope, reason),
        }

        reply
    }

    async fn call_agent(&self, request: &AgentRequest) -> AgentOutcome {
        let timeout = self.config.agent_timeout;

        match tokio::time::timeout(timeout, self.agent.respond(request)).await {
            Ok(Ok(AgentReply { text, should_reply })) => {
                if should_reply && !text.trim().is_empty() {
                    AgentOutcome::Replied(text)
                } else {
                    AgentOutcome::Declined
                }
            }
            Ok(Err(e)) => {
                tracing::warn!(scope = %request.scope, error = %e, "Agent call failed");
                self.hooks.emit(
                    "agent.failed",
                    &request.scope,
                    json!({"error": e.to_string()}),
                );
                AgentOutcome::Failed
            }
            Err(_) => {
                let e = MurmurError::AgentTimeout(timeout);
                tracing::warn!(scope = %request.scope, error = %e, "Agent call abandoned");
                AgentOutcome::TimedOut
            }
        }
    }

    /// An empty allowlist admits everything; otherwise the scope key or scope id must be listed
    fn is_allowed(&self, scope_id: Option<&str>, scope: &str) -> bool {
        let allowed = &self.config.allowed_scopes;
        if allowed.is_empty() {
            return true;
        }
        allowed
            .iter()
            .any(|a| a == scope || scope_id.is_some_and(|id| a == id))
    }

    fn no_reply(&self, scope: &str, reason: &str) {
        self.hooks
            .emit("workflow.no_reply", scope, json!({"reason": reason}));
    }
}

fn advance(from: DateTime<Utc>, elapsed: std::time::Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(elapsed)
        .ok()
        .and_then(|d| from.checked_add_signed(d))
        .unwrap_or(from)
}

/// Builder for [`Orchestrator`]
pub struct OrchestratorBuilder {
    config: WorkflowConfig,
    router: Option<Arc<dyn Router>>,
    agent: Arc<dyn Agent>,
    engagement: Arc<EngagementState>,
    context: Arc<ContextEngine>,
    hooks: HookRegistry,
}

impl OrchestratorBuilder {
    /// Create a builder with default workflow configuration
    pub fn new(
        engagement: Arc<EngagementState>,
        context: Arc<ContextEngine>,
        agent: Arc<dyn Agent>,
    ) -> Self {
        Self {
            config: WorkflowConfig::default(),
            router: None,
            agent,
            engagement,
            context,
            hooks: HookRegistry::new(),
        }
    }

    /// Set workflow configuration
    pub fn config(mut self, config: WorkflowConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the default router
    pub fn router(mut self, router: Arc<dyn Router>) -> Self {
        self.router = Some(router);
        self
    }

    /// Register a hook. Without any, a [`LoggingHook`] is installed.
    pub fn hook(mut self, hook: Arc<dyn WorkflowHook>) -> Self {
        self.hooks.register(hook);
        self
    }

    /// Build the orchestrator
    pub fn build(self) -> Orchestrator {
        let mut hooks = self.hooks;
        if hooks.is_empty() {
            hooks.register(Arc::new(LoggingHook));
        }

        let router = self.router.unwrap_or_else(|| {
            Arc::new(DefaultRouter::new(self.config.command_prefix.clone())) as Arc<dyn Router>
        });

        Orchestrator {
            config: self.config,
            router,
            agent: self.agent,
            engagement: self.engagement,
            context: self.context,
            hooks,
            locks: ScopeLocks::default(),
        }
    }
}
