//! Engagement record types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How the current Tense window was entered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenseOrigin {
    /// Explicit mention, fixed hold
    Mention,

    /// Spontaneous invocation, relevance-gated
    Spontaneous,
}

impl TenseOrigin {
    /// Stable storage name
    pub fn as_str(&self) -> &'static str {
        match self {
            TenseOrigin::Mention => "mention",
            TenseOrigin::Spontaneous => "spontaneous",
        }
    }

    /// Parse a storage name
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "mention" => Some(TenseOrigin::Mention),
            "spontaneous" => Some(TenseOrigin::Spontaneous),
            _ => None,
        }
    }
}

/// Observable phase of a scope's engagement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngagementPhase {
    /// Heartbeat at zero, not tense
    Idle,

    /// Heartbeat above zero, not tense
    Warming,

    /// Primed to respond, hold timer running
    Tense,
}

impl std::fmt::Display for EngagementPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EngagementPhase::Idle => "idle",
            EngagementPhase::Warming => "warming",
            EngagementPhase::Tense => "tense",
        };
        f.write_str(name)
    }
}

/// Per-scope heartbeat/tension state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngagementRecord {
    /// Propensity for spontaneous participation, within `[0, max_heartbeat]`
    pub heartbeat: f64,

    /// Whether the agent is primed to respond
    pub is_tense: bool,

    /// When the Tense window lapses; `None` whenever `is_tense` is false
    pub tense_expiry: Option<DateTime<Utc>>,

    /// How the Tense window was entered
    #[serde(default)]
    pub origin: Option<TenseOrigin>,

    /// Text follow-ups are judged related against
    #[serde(default)]
    pub focus: String,

    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl EngagementRecord {
    /// A fresh Idle record
    pub fn idle(at: DateTime<Utc>) -> Self {
        Self {
            heartbeat: 0.0,
            is_tense: false,
            tense_expiry: None,
            origin: None,
            focus: String::new(),
            updated_at: at,
        }
    }

    /// Current phase
    pub fn phase(&self) -> EngagementPhase {
        if self.is_tense {
            EngagementPhase::Tense
        } else if self.heartbeat > 0.0 {
            EngagementPhase::Warming
        } else {
            EngagementPhase::Idle
        }
    }

    /// Whether the Tense window has lapsed at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.is_tense && self.tense_expiry.is_some_and(|expiry| now >= expiry)
    }

    /// Drop back to Idle
    pub(crate) fn collapse(&mut self) {
        self.heartbeat = 0.0;
        self.is_tense = false;
        self.tense_expiry = None;
        self.origin = None;
        self.focus.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_phase() {
        let now = Utc::now();
        let mut record = EngagementRecord::idle(now);
        assert_eq!(record.phase(), EngagementPhase::Idle);

        record.heartbeat = 8.0;
        assert_eq!(record.phase(), EngagementPhase::Warming);

        record.is_tense = true;
        record.tense_expiry = Some(now + Duration::seconds(10));
        assert_eq!(record.phase(), EngagementPhase::Tense);
        assert!(!record.is_expired(now + Duration::seconds(9)));
        assert!(record.is_expired(now + Duration::seconds(10)));

        record.collapse();
        assert_eq!(record.phase(), EngagementPhase::Idle);
        assert!(record.tense_expiry.is_none());
    }

    #[test]
    fn test_origin_names() {
        for origin in [TenseOrigin::Mention, TenseOrigin::Spontaneous] {
            assert_eq!(TenseOrigin::parse(origin.as_str()), Some(origin));
        }
        assert_eq!(TenseOrigin::parse("bogus"), None);
    }
}
