//! Heartbeat/tension state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use super::record::{EngagementRecord, TenseOrigin};
use super::relevance::{KeywordOverlap, RelevancePredicate};
use super::sampler::{RandomSampler, TriggerSampler};
use super::store::EngagementStore;
use crate::config::EngagementConfig;
use crate::message::Message;

/// Why (or whether) a message should reach the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Escalation {
    /// Explicitly directed at the agent
    Mention,

    /// Related follow-up during an active Tense window
    Continue,

    /// Heartbeat draw succeeded
    Spontaneous,

    /// Do not invoke the agent
    Ignore,
}

impl Escalation {
    /// Stable name used in events and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Escalation::Mention => "mention",
            Escalation::Continue => "continue",
            Escalation::Spontaneous => "spontaneous",
            Escalation::Ignore => "ignore",
        }
    }
}

/// Outcome of observing one message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngagementDecision {
    /// Whether and why to escalate
    pub escalation: Escalation,

    /// Heartbeat after the observation
    pub heartbeat: f64,

    /// Tension after the observation
    pub is_tense: bool,

    /// Tense deadline after the observation
    pub tense_expiry: Option<DateTime<Utc>>,

    /// Whether a Tense window lapsed at this observation
    pub expired: bool,

    /// Whether an unrelated follow-up collapsed a spontaneous Tense window
    pub collapsed: bool,
}

impl EngagementDecision {
    /// Whether the agent should be invoked
    pub fn should_escalate(&self) -> bool {
        self.escalation != Escalation::Ignore
    }

    fn from_record(
        escalation: Escalation,
        record: &EngagementRecord,
        expired: bool,
        collapsed: bool,
    ) -> Self {
        Self {
            escalation,
            heartbeat: record.heartbeat,
            is_tense: record.is_tense,
            tense_expiry: record.tense_expiry,
            expired,
            collapsed,
        }
    }
}

type Slot = Arc<Mutex<Option<EngagementRecord>>>;

/// Per-scope engagement state machine.
///
/// Each scope moves between Idle, Warming and Tense. Unaddressed messages
/// warm the heartbeat; a heartbeat draw can trigger spontaneous
/// participation; explicit mentions enter Tense with a fixed hold.
///
/// Records are loaded lazily from the [`EngagementStore`] and persisted after
/// every mutation. Observations within one scope are serialized; distinct
/// scopes never contend. Persistence failures are logged and do not change
/// the decision.
pub struct EngagementState {
    config: EngagementConfig,
    store: Arc<dyn EngagementStore>,
    relevance: Arc<dyn RelevancePredicate>,
    sampler: Arc<dyn TriggerSampler>,
    slots: RwLock<HashMap<String, Slot>>,
}

impl std::fmt::Debug for EngagementState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngagementState")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl EngagementState {
    /// Create with keyword-overlap relevance and a random sampler
    pub fn new(config: EngagementConfig, store: Arc<dyn EngagementStore>) -> Self {
        Self {
            config,
            store,
            relevance: Arc::new(KeywordOverlap::new()),
            sampler: Arc::new(RandomSampler),
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Replace the relatedness predicate
    pub fn with_relevance(mut self, relevance: Arc<dyn RelevancePredicate>) -> Self {
        self.relevance = relevance;
        self
    }

    /// Replace the trigger sampler
    pub fn with_sampler(mut self, sampler: Arc<dyn TriggerSampler>) -> Self {
        self.sampler = sampler;
        self
    }

    /// Active configuration
    pub fn config(&self) -> &EngagementConfig {
        &self.config
    }

    /// Update engagement for one inbound message and decide escalation.
    ///
    /// Observation time is the message timestamp. Empty content never
    /// escalates and leaves the record untouched.
    pub async fn observe(&self, message: &Message, scope: &str) -> EngagementDecision {
        let now = message.timestamp;
        let slot = self.slot(scope).await;
        let mut guard = slot.lock().await;
        let record = self.loaded(&mut guard, scope, now).await;

        let content = message.content.trim();
        if content.is_empty() {
            return EngagementDecision::from_record(Escalation::Ignore, record, false, false);
        }

        let expired = self.apply_expiry(record, now);
        let mut collapsed = false;

        let escalation = if message.directed_at_agent {
            self.enter_hold(record, content, now);
            Escalation::Mention
        } else if record.is_tense {
            let related = self.relevance.is_related(&record.focus, content);
            match (record.origin, related) {
                (Some(TenseOrigin::Mention), true) => {
                    self.enter_hold(record, content, now);
                    Escalation::Continue
                }
                // A fixed hold is not shortened by off-topic chatter
                (Some(TenseOrigin::Mention), false) => Escalation::Ignore,
                (_, true) => {
                    record.tense_expiry = Some(deadline(now, self.config.relevance_window));
                    record.heartbeat = self.raise(record.heartbeat);
                    record.focus = content.to_string();
                    Escalation::Continue
                }
                (_, false) => {
                    record.collapse();
                    collapsed = true;
                    Escalation::Ignore
                }
            }
        } else {
            record.heartbeat = self.grow(record.heartbeat);
            let probability = record.heartbeat / self.config.max_heartbeat;
            if self.sampler.sample() < probability {
                Escalation::Spontaneous
            } else {
                Escalation::Ignore
            }
        };

        record.updated_at = now;
        let decision = EngagementDecision::from_record(escalation, record, expired, collapsed);

        tracing::debug!(
            scope = %scope,
            escalation = escalation.as_str(),
            heartbeat = record.heartbeat,
            is_tense = record.is_tense,
            expired,
            collapsed,
            "Observed message"
        );

        self.persist(scope, record).await;
        decision
    }

    /// Record that the agent was invoked for `trigger`.
    ///
    /// Outside an explicit-mention hold this enters the relevance-gated Tense
    /// window: follow-ups must relate to the trigger (and reply, if any)
    /// within `relevance_window` or the scope collapses back to Idle.
    pub async fn mark_invoked(
        &self,
        scope: &str,
        trigger: &str,
        reply: Option<&str>,
        at: DateTime<Utc>,
    ) {
        let slot = self.slot(scope).await;
        let mut guard = slot.lock().await;
        let record = self.loaded(&mut guard, scope, at).await;
        self.apply_expiry(record, at);

        let focus = merge_focus(trigger, reply);
        if record.is_tense && record.origin == Some(TenseOrigin::Mention) {
            record.focus = focus;
        } else {
            record.is_tense = true;
            record.origin = Some(TenseOrigin::Spontaneous);
            record.tense_expiry = Some(deadline(at, self.config.relevance_window));
            record.heartbeat = self.raise(record.heartbeat);
            record.focus = focus;
        }
        record.updated_at = at;

        tracing::debug!(
            scope = %scope,
            heartbeat = record.heartbeat,
            origin = ?record.origin,
            "Marked agent invocation"
        );

        self.persist(scope, record).await;
    }

    /// Fold the agent's reply into the focus of an active Tense window
    pub async fn refresh_focus(&self, scope: &str, trigger: &str, reply: &str, at: DateTime<Utc>) {
        let slot = self.slot(scope).await;
        let mut guard = slot.lock().await;
        let record = self.loaded(&mut guard, scope, at).await;
        self.apply_expiry(record, at);

        if record.is_tense {
            record.focus = merge_focus(trigger, Some(reply));
            record.updated_at = at;
        }
        self.persist(scope, record).await;
    }

    /// Current record for a scope with expiry applied; nothing is persisted
    pub async fn snapshot(&self, scope: &str, at: DateTime<Utc>) -> EngagementRecord {
        let slot = self.slot(scope).await;
        let mut guard = slot.lock().await;
        let mut record = self.loaded(&mut guard, scope, at).await.clone();
        self.apply_expiry(&mut record, at);
        record
    }

    /// Force a scope back to Idle
    pub async fn reset(&self, scope: &str, at: DateTime<Utc>) {
        let slot = self.slot(scope).await;
        let mut guard = slot.lock().await;
        let record = self.loaded(&mut guard, scope, at).await;
        record.collapse();
        record.updated_at = at;

        tracing::info!(scope = %scope, "Reset engagement state");
        self.persist(scope, record).await;
    }

    async fn slot(&self, scope: &str) -> Slot {
        if let Some(slot) = self.slots.read().await.get(scope) {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write().await;
        Arc::clone(slots.entry(scope.to_string()).or_default())
    }

    async fn loaded<'a>(
        &self,
        guard: &'a mut Option<EngagementRecord>,
        scope: &str,
        now: DateTime<Utc>,
    ) -> &'a mut EngagementRecord {
        if guard.is_none() {
            let record = match self.store.load(scope).await {
                Ok(Some(record)) => record,
                Ok(None) => EngagementRecord::idle(now),
                Err(e) => {
                    tracing::warn!(
                        scope = %scope,
                        error = %e,
                        "Failed to load engagement state, starting idle"
                    );
                    EngagementRecord::idle(now)
                }
            };
            *guard = Some(self.sanitize(record));
        }
        guard.get_or_insert_with(|| EngagementRecord::idle(now))
    }

    async fn persist(&self, scope: &str, record: &EngagementRecord) {
        if let Err(e) = self.store.save(scope, record).await {
            tracing::warn!(scope = %scope, error = %e, "Failed to persist engagement state");
        }
    }

    /// Clamp values read from storage back into range
    fn sanitize(&self, mut record: EngagementRecord) -> EngagementRecord {
        record.heartbeat = self.clamp(record.heartbeat);
        if !record.is_tense {
            record.tense_expiry = None;
            record.origin = None;
        } else if record.tense_expiry.is_none() {
            record.collapse();
        }
        record
    }

    /// Returns true when an active Tense window lapsed
    fn apply_expiry(&self, record: &mut EngagementRecord, now: DateTime<Utc>) -> bool {
        if record.is_expired(now) {
            record.collapse();
            record.updated_at = now;
            true
        } else {
            false
        }
    }

    fn enter_hold(&self, record: &mut EngagementRecord, content: &str, now: DateTime<Utc>) {
        record.is_tense = true;
        record.origin = Some(TenseOrigin::Mention);
        record.tense_expiry = Some(deadline(now, self.config.tense_hold));
        record.heartbeat = self.raise(record.heartbeat);
        record.focus = content.to_string();
    }

    fn grow(&self, heartbeat: f64) -> f64 {
        if heartbeat <= 0.0 {
            self.clamp(self.config.wakeup_growth)
        } else {
            self.clamp(heartbeat + self.config.idle_growth)
        }
    }

    fn raise(&self, heartbeat: f64) -> f64 {
        self.clamp(heartbeat.max(self.config.tense_floor) + self.config.tense_boost)
    }

    fn clamp(&self, heartbeat: f64) -> f64 {
        if heartbeat.is_nan() {
            return 0.0;
        }
        heartbeat.clamp(0.0, self.config.max_heartbeat)
    }
}

fn deadline(from: DateTime<Utc>, hold: std::time::Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(hold)
        .ok()
        .and_then(|hold| from.checked_add_signed(hold))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn merge_focus(trigger: &str, reply: Option<&str>) -> String {
    match reply.map(str::trim).filter(|r| !r.is_empty()) {
        Some(reply) => format!("{} {}", trigger.trim(), reply),
        None => trigger.trim().to_string(),
    }
}
