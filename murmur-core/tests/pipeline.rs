//! End-to-end pipeline scenarios
//!
//! These tests drive the orchestrator through realistic message sequences and
//! check engagement, context, memory and hook behavior together.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use murmur_core::config::{
    ContextConfig, EngagementConfig, MemoryConfig, MurmurConfig, StoreConfig, WorkflowConfig,
};
use murmur_core::context::ContextEngine;
use murmur_core::engagement::{
    EngagementPhase, EngagementState, FixedSampler, InMemoryEngagementStore, TenseOrigin,
};
use murmur_core::error::{MurmurError, Result};
use murmur_core::memory::{JsonlMemoryLog, MemoryLog, MemoryRecord};
use murmur_core::workflow::{
    Agent, AgentReply, AgentRequest, InboundEvent, Orchestrator, ReplyMode, WorkflowEvent,
};

// ============================================================================
// Test doubles
// ============================================================================

#[derive(Clone)]
enum Behavior {
    Reply(&'static str),
    Decline,
    Fail,
    Stall(Duration),
}

struct ScriptedAgent {
    behavior: Behavior,
    calls: AtomicUsize,
    modes: Mutex<Vec<ReplyMode>>,
    window_sizes: Mutex<Vec<usize>>,
}

impl ScriptedAgent {
    fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            calls: AtomicUsize::new(0),
            modes: Mutex::new(Vec::new()),
            window_sizes: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn modes(&self) -> Vec<ReplyMode> {
        self.modes.lock().unwrap().clone()
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    async fn respond(&self, request: &AgentRequest) -> Result<AgentReply> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.modes.lock().unwrap().push(request.mode);
        self.window_sizes
            .lock()
            .unwrap()
            .push(request.snapshot.len());

        match &self.behavior {
            Behavior::Reply(text) => Ok(AgentReply::reply(*text)),
            Behavior::Decline => Ok(AgentReply::decline()),
            Behavior::Fail => Err(MurmurError::Agent("model unavailable".into())),
            Behavior::Stall(duration) => {
                tokio::time::sleep(*duration).await;
                Ok(AgentReply::reply("too late"))
            }
        }
    }
}

/// Process-local memory log
#[derive(Default)]
struct VecMemoryLog {
    records: Mutex<Vec<MemoryRecord>>,
}

#[async_trait]
impl MemoryLog for VecMemoryLog {
    async fn append(&self, record: &MemoryRecord) -> Result<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn read_tail(&self, scope: &str, n: usize) -> Result<Vec<MemoryRecord>> {
        let records = self.records.lock().unwrap();
        let matching: Vec<_> = records.iter().filter(|r| r.scope == scope).cloned().collect();
        let skip = matching.len().saturating_sub(n);
        Ok(matching.into_iter().skip(skip).collect())
    }

    async fn scopes(&self) -> Result<Vec<String>> {
        let mut scopes: Vec<String> = Vec::new();
        for record in self.records.lock().unwrap().iter() {
            if !scopes.contains(&record.scope) {
                scopes.push(record.scope.clone());
            }
        }
        Ok(scopes)
    }
}

/// Memory log whose storage is gone
struct UnavailableLog;

#[async_trait]
impl MemoryLog for UnavailableLog {
    async fn append(&self, _record: &MemoryRecord) -> Result<()> {
        Err(MurmurError::MemoryLog("disk full".into()))
    }

    async fn read_tail(&self, _scope: &str, _n: usize) -> Result<Vec<MemoryRecord>> {
        Err(MurmurError::MemoryLog("disk full".into()))
    }

    async fn scopes(&self) -> Result<Vec<String>> {
        Err(MurmurError::MemoryLog("disk full".into()))
    }
}

type EventLog = Arc<Mutex<Vec<String>>>;

struct Harness {
    orchestrator: Orchestrator,
    agent: Arc<ScriptedAgent>,
    events: EventLog,
}

impl Harness {
    fn new(
        behavior: Behavior,
        sampler: f64,
        workflow: WorkflowConfig,
        log: Arc<dyn MemoryLog>,
    ) -> Self {
        let agent = ScriptedAgent::new(behavior);
        let events: EventLog = Arc::new(Mutex::new(Vec::new()));

        let engagement = Arc::new(
            EngagementState::new(
                EngagementConfig::default(),
                Arc::new(InMemoryEngagementStore::new()),
            )
            .with_sampler(Arc::new(FixedSampler(sampler))),
        );
        let context = Arc::new(ContextEngine::new(log, &ContextConfig::default()));

        let recorder = Arc::clone(&events);
        let orchestrator = Orchestrator::builder(engagement, context, agent.clone())
            .config(workflow)
            .hook(Arc::new(move |event: &WorkflowEvent| -> Result<()> {
                recorder.lock().unwrap().push(event.name.clone());
                Ok(())
            }))
            .build();

        Self {
            orchestrator,
            agent,
            events,
        }
    }

    fn simple(behavior: Behavior, sampler: f64) -> Self {
        Self::new(
            behavior,
            sampler,
            WorkflowConfig::default(),
            Arc::new(VecMemoryLog::default()),
        )
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn clear_events(&self) {
        self.events.lock().unwrap().clear();
    }

    async fn send(&self, content: &str, at_user: bool, at: DateTime<Utc>) -> Option<String> {
        let event = InboundEvent::new(content, "qq_group")
            .at_user(at_user)
            .in_scope("42")
            .from_sender("alice")
            .received_at(at);
        self.orchestrator.process_event(event).await
    }
}

const SCOPE: &str = "qq_group:42";

fn t(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + ChronoDuration::seconds(secs)
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_unaddressed_chatter_is_recorded_but_never_escalated() {
    let harness = Harness::simple(Behavior::Reply("hi"), 1.0);

    for i in 0..50 {
        let reply = harness.send(&format!("chatter number {}", i), false, t(i)).await;
        assert!(reply.is_none());
    }

    assert_eq!(harness.agent.calls(), 0);
    let window = harness.orchestrator.context().snapshot(SCOPE).await;
    assert_eq!(window.len(), 50);

    let record = harness.orchestrator.engagement().snapshot(SCOPE, t(50)).await;
    assert_eq!(record.phase(), EngagementPhase::Warming);
    assert_eq!(record.heartbeat, 100.0);
}

#[tokio::test]
async fn test_mention_enters_tense_and_replies() {
    let harness = Harness::simple(Behavior::Reply("hi there!"), 1.0);

    harness.send("morning all", false, t(0)).await;
    harness.clear_events();

    let reply = harness.send("hello", true, t(1)).await;
    assert_eq!(reply.as_deref(), Some("hi there!"));
    assert_eq!(harness.agent.calls(), 1);
    assert_eq!(harness.agent.modes(), vec![ReplyMode::Addressed]);
    assert_eq!(*harness.agent.window_sizes.lock().unwrap(), vec![2]);

    let record = harness.orchestrator.engagement().snapshot(SCOPE, t(2)).await;
    assert!(record.is_tense);
    assert_eq!(record.origin, Some(TenseOrigin::Mention));
    assert_eq!(record.focus, "hello hi there!");

    let window = harness.orchestrator.context().snapshot(SCOPE).await;
    let last = window.latest().expect("reply remembered");
    assert_eq!(last.sender, "assistant");
    assert_eq!(last.content, "hi there!");

    assert_eq!(
        harness.events(),
        vec![
            "adapter.captured",
            "engagement.checked",
            "context.recorded",
            "agent.invoked",
            "workflow.replied",
        ]
    );
}

#[tokio::test]
async fn test_related_follow_up_continues_during_hold() {
    let harness = Harness::simple(Behavior::Reply("it is a language"), 1.0);

    harness.send("what is rust", true, t(0)).await;
    let reply = harness.send("is rust fast", false, t(60)).await;

    assert!(reply.is_some());
    assert_eq!(
        harness.agent.modes(),
        vec![ReplyMode::Addressed, ReplyMode::Engaged]
    );

    // Off-topic chatter during the hold is only recorded
    let reply = harness.send("lunch?", false, t(120)).await;
    assert!(reply.is_none());
    assert_eq!(harness.agent.calls(), 2);
}

#[tokio::test]
async fn test_spontaneous_invocation_is_relevance_gated() {
    let harness = Harness::simple(Behavior::Reply("sounds fun"), 0.0);

    let reply = harness.send("weekend hiking trip", false, t(0)).await;
    assert_eq!(reply.as_deref(), Some("sounds fun"));
    assert_eq!(harness.agent.modes(), vec![ReplyMode::Spontaneous]);

    let record = harness.orchestrator.engagement().snapshot(SCOPE, t(1)).await;
    assert!(record.is_tense);
    assert_eq!(record.origin, Some(TenseOrigin::Spontaneous));

    // Unrelated follow-up collapses straight back to Idle
    harness.clear_events();
    let reply = harness.send("what's for dinner", false, t(5)).await;
    assert!(reply.is_none());
    let record = harness.orchestrator.engagement().snapshot(SCOPE, t(6)).await;
    assert_eq!(record.phase(), EngagementPhase::Idle);
    assert_eq!(
        harness.events(),
        vec![
            "adapter.captured",
            "engagement.checked",
            "context.recorded",
            "workflow.no_reply",
        ]
    );
}

#[tokio::test]
async fn test_declined_spontaneous_call_still_marks_invocation() {
    let harness = Harness::simple(Behavior::Decline, 0.0);

    let reply = harness.send("weekend hiking trip", false, t(0)).await;
    assert!(reply.is_none());
    assert_eq!(harness.agent.calls(), 1);

    let record = harness.orchestrator.engagement().snapshot(SCOPE, t(1)).await;
    assert_eq!(record.origin, Some(TenseOrigin::Spontaneous));
    let expiry = record.tense_expiry.expect("relevance window running");
    assert!(expiry >= t(120) && expiry < t(121));

    // Nothing remembered from the agent
    assert_eq!(harness.orchestrator.context().snapshot(SCOPE).await.len(), 1);
    assert!(harness.events().contains(&"agent.declined".to_string()));
}

#[tokio::test]
async fn test_allowlist_denial_short_circuits() {
    let workflow = WorkflowConfig {
        allowed_scopes: vec!["42".to_string(), "console".to_string()],
        ..Default::default()
    };
    let log = Arc::new(VecMemoryLog::default());
    let harness = Harness::new(Behavior::Reply("hi"), 0.0, workflow, log.clone());

    let event = InboundEvent::new("hello", "qq_group")
        .at_user(true)
        .in_scope("7")
        .received_at(t(0));
    let reply = harness.orchestrator.process_event(event).await;

    assert!(reply.is_none());
    assert_eq!(harness.agent.calls(), 0);
    assert_eq!(harness.events(), vec!["adapter.captured"]);
    assert!(log.scopes().await.unwrap().is_empty());

    let record = harness
        .orchestrator
        .engagement()
        .snapshot("qq_group:7", t(1))
        .await;
    assert_eq!(record.phase(), EngagementPhase::Idle);

    // A source without a scope id is judged by its scope key
    assert!(harness.orchestrator.process("hello", true, "qq_group", None).await.is_none());
    assert_eq!(harness.agent.calls(), 0);
    assert!(harness.orchestrator.context().snapshot("qq_group").await.is_empty());
    assert!(log.scopes().await.unwrap().is_empty());

    // Listed scopes go through
    assert!(harness.send("hello", true, t(2)).await.is_some());
    assert!(harness.orchestrator.process("hi", true, "console", None).await.is_some());
    assert_eq!(harness.agent.calls(), 2);
    assert_eq!(log.scopes().await.unwrap(), vec![SCOPE, "console"]);
}

#[tokio::test]
async fn test_memory_log_failure_degrades_gracefully() {
    let harness = Harness::new(
        Behavior::Reply("still here"),
        1.0,
        WorkflowConfig::default(),
        Arc::new(UnavailableLog),
    );

    let reply = harness.send("are you there?", true, t(0)).await;
    assert_eq!(reply.as_deref(), Some("still here"));

    let window = harness.orchestrator.context().snapshot(SCOPE).await;
    assert_eq!(window.len(), 2);
}

#[tokio::test]
async fn test_hook_failures_do_not_alter_result() {
    let agent = ScriptedAgent::new(Behavior::Reply("ok"));
    let events: EventLog = Arc::new(Mutex::new(Vec::new()));

    let engagement = Arc::new(EngagementState::new(
        EngagementConfig::default(),
        Arc::new(InMemoryEngagementStore::new()),
    ));
    let context = Arc::new(ContextEngine::new(
        Arc::new(VecMemoryLog::default()),
        &ContextConfig::default(),
    ));

    let recorder = Arc::clone(&events);
    let orchestrator = Orchestrator::builder(engagement, context, agent.clone())
        .hook(Arc::new(|_: &WorkflowEvent| -> Result<()> {
            Err(MurmurError::Hook("observer broke".into()))
        }))
        .hook(Arc::new(|event: &WorkflowEvent| -> Result<()> {
            if event.name == "agent.invoked" {
                panic!("observer exploded");
            }
            Ok(())
        }))
        .hook(Arc::new(move |event: &WorkflowEvent| -> Result<()> {
            recorder.lock().unwrap().push(event.name.clone());
            Ok(())
        }))
        .build();

    let reply = orchestrator.process("ping me", true, "console", None).await;
    assert_eq!(reply.as_deref(), Some("ok"));
    assert_eq!(events.lock().unwrap().len(), 5);
}

#[tokio::test]
async fn test_agent_failure_is_no_reply() {
    let harness = Harness::simple(Behavior::Fail, 1.0);

    let reply = harness.send("hello", true, t(0)).await;
    assert!(reply.is_none());

    let events = harness.events();
    assert!(events.contains(&"agent.failed".to_string()));
    assert_eq!(events.last().map(String::as_str), Some("workflow.no_reply"));

    // The run did not poison the scope
    assert_eq!(harness.orchestrator.context().snapshot(SCOPE).await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_agent_timeout_is_abandoned() {
    let workflow = WorkflowConfig {
        agent_timeout: Duration::from_secs(30),
        ..Default::default()
    };
    let harness = Harness::new(
        Behavior::Stall(Duration::from_secs(600)),
        1.0,
        workflow,
        Arc::new(VecMemoryLog::default()),
    );

    let started = tokio::time::Instant::now();
    let reply = harness.send("hello", true, t(0)).await;

    assert!(reply.is_none());
    assert!(started.elapsed() < Duration::from_secs(600));
    assert!(harness.events().contains(&"agent.timeout".to_string()));

    // The scope lock was released
    let next = harness.send("anyone?", false, t(40)).await;
    assert!(next.is_none());
    assert_eq!(harness.orchestrator.context().snapshot(SCOPE).await.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_spontaneous_timeout_takes_fast_collapse_path() {
    let workflow = WorkflowConfig {
        agent_timeout: Duration::from_secs(30),
        ..Default::default()
    };
    let harness = Harness::new(
        Behavior::Stall(Duration::from_secs(600)),
        0.0,
        workflow,
        Arc::new(VecMemoryLog::default()),
    );

    assert!(harness.send("weekend hiking trip", false, t(0)).await.is_none());

    let record = harness.orchestrator.engagement().snapshot(SCOPE, t(31)).await;
    assert!(record.is_tense);
    assert_eq!(record.origin, Some(TenseOrigin::Spontaneous));
    let expiry = record.tense_expiry.expect("relevance window running");
    assert!(expiry >= t(30 + 120) && expiry < t(30 + 121));

    let record = harness.orchestrator.engagement().snapshot(SCOPE, t(152)).await;
    assert_eq!(record.phase(), EngagementPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_same_scope_chatter_recorded_while_reply_pending() {
    let workflow = WorkflowConfig {
        agent_timeout: Duration::from_secs(120),
        ..Default::default()
    };
    let harness = Harness::new(
        Behavior::Stall(Duration::from_secs(60)),
        0.0,
        workflow,
        Arc::new(VecMemoryLog::default()),
    );
    let started = tokio::time::Instant::now();

    let pending = harness.send("are you there", true, t(0));
    let chatter = async {
        while harness.agent.calls() == 0 {
            tokio::task::yield_now().await;
        }
        let reply = harness.send("lunch plans", false, t(1)).await;
        let window = harness.orchestrator.context().snapshot(SCOPE).await.len();
        (reply, window, started.elapsed())
    };
    let (first, (second, window, recorded_after)) = tokio::join!(pending, chatter);

    assert_eq!(first.as_deref(), Some("too late"));
    assert!(second.is_none());
    assert_eq!(window, 2);
    assert!(recorded_after < Duration::from_secs(60));
    assert_eq!(harness.agent.calls(), 1);
}

#[tokio::test]
async fn test_structured_commands() {
    let harness = Harness::simple(Behavior::Reply("weather is nice"), 1.0);

    let pong = harness.send("/ping", false, t(0)).await;
    assert_eq!(pong.as_deref(), Some("pong"));
    assert_eq!(harness.agent.calls(), 0);
    assert_eq!(harness.events(), vec!["adapter.captured", "router.command"]);
    assert!(harness.orchestrator.context().snapshot(SCOPE).await.is_empty());

    let help = harness.send("/help", false, t(1)).await;
    assert!(help.expect("help text").contains("/ping"));

    // Unknown commands reach the agent as directed messages
    let reply = harness.send("/weather tomorrow", false, t(2)).await;
    assert_eq!(reply.as_deref(), Some("weather is nice"));
    assert_eq!(harness.agent.modes(), vec![ReplyMode::Addressed]);
}

#[tokio::test]
async fn test_empty_message_is_ignored() {
    let harness = Harness::simple(Behavior::Reply("hi"), 0.0);

    assert!(harness.send("   ", true, t(0)).await.is_none());
    assert_eq!(harness.events(), vec!["adapter.captured", "adapter.ignored"]);
    assert!(harness.orchestrator.context().snapshot(SCOPE).await.is_empty());

    let record = harness.orchestrator.engagement().snapshot(SCOPE, t(1)).await;
    assert_eq!(record.phase(), EngagementPhase::Idle);
}

#[tokio::test]
async fn test_same_scope_runs_do_not_lose_updates() {
    let harness = Arc::new(Harness::simple(Behavior::Reply("hi"), 1.0));

    let runs = (0..20).map(|i| {
        let harness = Arc::clone(&harness);
        async move { harness.send(&format!("chatter {}", i), false, t(i)).await }
    });
    futures::future::join_all(runs).await;

    assert_eq!(harness.orchestrator.context().snapshot(SCOPE).await.len(), 20);
    let record = harness.orchestrator.engagement().snapshot(SCOPE, t(30)).await;
    assert_eq!(record.heartbeat, 6.0 + 2.0 * 19.0);
}

#[tokio::test]
async fn test_scopes_are_isolated() {
    let harness = Harness::simple(Behavior::Reply("hi"), 1.0);

    harness.send("hello bot", true, t(0)).await;
    let other = harness
        .orchestrator
        .process_event(
            InboundEvent::new("just chatting", "qq_group")
                .in_scope("43")
                .received_at(t(1)),
        )
        .await;
    assert!(other.is_none());

    let a = harness.orchestrator.engagement().snapshot(SCOPE, t(2)).await;
    let b = harness
        .orchestrator
        .engagement()
        .snapshot("qq_group:43", t(2))
        .await;
    assert!(a.is_tense);
    assert!(!b.is_tense);
    assert_eq!(b.heartbeat, 6.0);
    assert_eq!(
        harness.orchestrator.context().snapshot("qq_group:43").await.len(),
        1
    );
}

#[tokio::test]
async fn test_restart_restores_window_and_engagement() {
    let dir = TempDir::new().unwrap();
    // No heartbeat growth, so only the mention reaches the agent
    let config = MurmurConfig {
        engagement: EngagementConfig {
            wakeup_growth: 0.0,
            idle_growth: 0.0,
            ..Default::default()
        },
        memory: MemoryConfig {
            log_path: dir.path().join("memory_pool.jsonl"),
        },
        store: StoreConfig::Sqlite {
            path: dir.path().join("engagement.db"),
        },
        ..Default::default()
    };

    let before = {
        let orchestrator =
            Orchestrator::from_config(&config, ScriptedAgent::new(Behavior::Reply("noted")))
                .await
                .unwrap();
        for i in 0..5 {
            let event = InboundEvent::new(format!("note {}", i), "qq_group")
                .in_scope("42")
                .at_user(i == 4)
                .received_at(t(i));
            orchestrator.process_event(event).await;
        }
        orchestrator.context().snapshot(SCOPE).await
    };
    assert_eq!(before.len(), 6);

    let orchestrator =
        Orchestrator::from_config(&config, ScriptedAgent::new(Behavior::Reply("noted")))
            .await
            .unwrap();
    let after = orchestrator.context().snapshot(SCOPE).await;

    let project = |s: &murmur_core::context::ContextSnapshot| {
        s.messages
            .iter()
            .map(|m| (m.sender.clone(), m.content.clone(), m.timestamp))
            .collect::<Vec<_>>()
    };
    assert_eq!(project(&after), project(&before));

    let record = orchestrator.engagement().snapshot(SCOPE, t(10)).await;
    assert!(record.is_tense);
    assert_eq!(record.tense_expiry, Some(t(4 + 900)));

    let log = JsonlMemoryLog::open(dir.path().join("memory_pool.jsonl"))
        .await
        .unwrap();
    assert_eq!(log.scopes().await.unwrap(), vec![SCOPE]);
}
