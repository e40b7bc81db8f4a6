//! End-to-end session flow against a mock channel and a scripted backend

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use callflow_config::{SessionSettings, Settings};
use callflow_core::{
    CallChannel, CallEvent, ChannelError, DialTarget, FinishReason, GatherOptions, Message, Role,
    SessionRef, TelephonyContext, ToolCall,
};
use callflow_llm::{AutopilotModel, BoundToolset, ChatBackend, ChatOutcome, LlmError};
use callflow_session::{call_control_tools, SessionError, SessionManager};

/// Records every channel operation; can fail the next one.
#[derive(Default)]
struct MockChannel {
    calls: Mutex<Vec<String>>,
    fail_next: Mutex<Option<ChannelError>>,
}

impl MockChannel {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn fail_next(&self, err: ChannelError) {
        *self.fail_next.lock() = Some(err);
    }

    async fn op(&self, desc: String) -> Result<(), ChannelError> {
        if let Some(err) = self.fail_next.lock().take() {
            return Err(err);
        }
        self.calls.lock().push(desc);
        Ok(())
    }
}

#[async_trait]
impl CallChannel for MockChannel {
    async fn answer(&self, session_ref: &SessionRef) -> Result<(), ChannelError> {
        self.op(format!("answer {}", session_ref)).await
    }
    async fn say(&self, session_ref: &SessionRef, text: &str) -> Result<(), ChannelError> {
        self.op(format!("say {} {}", session_ref, text)).await
    }
    async fn play(&self, session_ref: &SessionRef, url: &str) -> Result<(), ChannelError> {
        self.op(format!("play {} {}", session_ref, url)).await
    }
    async fn gather(
        &self,
        session_ref: &SessionRef,
        _options: &GatherOptions,
    ) -> Result<(), ChannelError> {
        self.op(format!("gather {}", session_ref)).await
    }
    async fn dial(
        &self,
        session_ref: &SessionRef,
        target: &DialTarget,
    ) -> Result<(), ChannelError> {
        self.op(format!("dial {} {}", session_ref, target.0)).await
    }
    async fn hangup(&self, session_ref: &SessionRef) -> Result<(), ChannelError> {
        self.op(format!("hangup {}", session_ref)).await
    }
    async fn mute(&self, session_ref: &SessionRef) -> Result<(), ChannelError> {
        self.op(format!("mute {}", session_ref)).await
    }
    async fn unmute(&self, session_ref: &SessionRef) -> Result<(), ChannelError> {
        self.op(format!("unmute {}", session_ref)).await
    }
    async fn send_dtmf(&self, session_ref: &SessionRef, digits: &str) -> Result<(), ChannelError> {
        self.op(format!("send_dtmf {} {}", session_ref, digits)).await
    }
}

struct Step {
    delay: Option<Duration>,
    outcome: Result<ChatOutcome, LlmError>,
}

/// Plays back scripted outcomes and records how it was called.
#[derive(Default)]
struct ScriptedBackend {
    steps: Mutex<VecDeque<Step>>,
    seen: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedBackend {
    fn push_text(&self, text: &str) {
        self.steps.lock().push_back(Step {
            delay: None,
            outcome: Ok(text_outcome(text)),
        });
    }

    fn push_tool(&self, name: &str, arguments: serde_json::Value) {
        self.steps.lock().push_back(Step {
            delay: None,
            outcome: Ok(tool_outcome(name, arguments)),
        });
    }

    fn push_slow_text(&self, text: &str, delay: Duration) {
        self.steps.lock().push_back(Step {
            delay: Some(delay),
            outcome: Ok(text_outcome(text)),
        });
    }

    fn push_delayed_texts(&self, texts: &[&str], delay: Duration) {
        for text in texts {
            self.push_slow_text(text, delay);
        }
    }

    fn seen(&self) -> Vec<String> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn chat(&self, messages: &[Message]) -> Result<ChatOutcome, LlmError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(last_user) = messages.iter().rev().find(|m| m.role == Role::User) {
            self.seen.lock().push(last_user.content.clone());
        }

        let step = self.steps.lock().pop_front();
        let result = match step {
            Some(step) => {
                if let Some(delay) = step.delay {
                    tokio::time::sleep(delay).await;
                }
                step.outcome
            }
            None => Ok(text_outcome("Okay.")),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

fn text_outcome(text: &str) -> ChatOutcome {
    ChatOutcome {
        text: Some(text.to_string()),
        tool_calls: vec![],
        finish: FinishReason::Stop,
    }
}

fn tool_outcome(name: &str, arguments: serde_json::Value) -> ChatOutcome {
    let arguments: HashMap<String, serde_json::Value> = match arguments {
        serde_json::Value::Object(map) => map.into_iter().collect(),
        _ => HashMap::new(),
    };
    ChatOutcome {
        text: None,
        tool_calls: vec![ToolCall {
            id: "call_1".to_string(),
            name: name.to_string(),
            arguments,
        }],
        finish: FinishReason::ToolCalls,
    }
}

fn test_settings() -> Settings {
    Settings {
        session: SessionSettings {
            decide_timeout_ms: 1_000,
            verb_timeout_ms: 500,
            max_provider_retries: 1,
            fallback_line: "I'm having trouble at the moment, please hold.".to_string(),
            max_sessions: 10,
            event_queue_depth: 16,
        },
        ..Default::default()
    }
}

fn manager_with(backend: Arc<ScriptedBackend>, channel: Arc<MockChannel>) -> SessionManager {
    manager_with_settings(backend, channel, test_settings())
}

fn manager_with_settings(
    backend: Arc<ScriptedBackend>,
    channel: Arc<MockChannel>,
    settings: Settings,
) -> SessionManager {
    let decide_timeout = Duration::from_millis(settings.session.decide_timeout_ms);
    SessionManager::new(channel, settings).with_model_builder(Arc::new(
        move |context: &TelephonyContext| {
            Ok(AutopilotModel::new(
                backend.clone(),
                BoundToolset::new(call_control_tools())?,
                context,
                decide_timeout,
            ))
        },
    ))
}

fn incoming(session_ref: &str) -> CallEvent {
    CallEvent::Incoming {
        session_ref: SessionRef::new(session_ref),
        caller: "+15550100".to_string(),
        callee: "+15550111".to_string(),
    }
}

fn gather_result(session_ref: &str, input: &str) -> CallEvent {
    CallEvent::GatherResult {
        session_ref: SessionRef::new(session_ref),
        input: input.to_string(),
    }
}

async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

#[tokio::test]
async fn answer_then_greeting_is_spoken() {
    let backend = Arc::new(ScriptedBackend::default());
    backend.push_text("Hello! How can I help you today?");
    let channel = Arc::new(MockChannel::default());
    let manager = manager_with(backend.clone(), channel.clone());

    manager.route_event(incoming("S1")).await.unwrap();

    assert!(
        wait_until(|| channel.calls().len() >= 2).await,
        "calls: {:?}",
        channel.calls()
    );
    assert_eq!(
        channel.calls(),
        vec![
            "answer S1".to_string(),
            "say S1 Hello! How can I help you today?".to_string(),
        ]
    );
    assert!(manager.is_active(&SessionRef::new("S1")));
}

#[tokio::test]
async fn hangup_tool_closes_session_and_later_events_are_terminal() {
    let backend = Arc::new(ScriptedBackend::default());
    backend.push_text("Hello!");
    backend.push_tool("hangup", serde_json::json!({}));
    let channel = Arc::new(MockChannel::default());
    let manager = manager_with(backend.clone(), channel.clone());

    manager.route_event(incoming("S1")).await.unwrap();
    assert!(wait_until(|| channel.calls().len() >= 2).await);

    manager
        .route_event(gather_result("S1", "that's all, goodbye"))
        .await
        .unwrap();

    assert!(wait_until(|| !manager.is_active(&SessionRef::new("S1"))).await);
    assert!(channel.calls().contains(&"hangup S1".to_string()));

    // A subsequent event for the closed reference is rejected as terminal
    let err = manager
        .route_event(gather_result("S1", "hello?"))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Terminal(_)));
}

#[tokio::test]
async fn answer_not_found_closes_session_without_decides() {
    let backend = Arc::new(ScriptedBackend::default());
    let channel = Arc::new(MockChannel::default());
    channel.fail_next(ChannelError::NotFound(SessionRef::new("S1")));
    let manager = manager_with(backend.clone(), channel.clone());

    manager.route_event(incoming("S1")).await.unwrap();

    assert!(wait_until(|| !manager.is_active(&SessionRef::new("S1"))).await);
    assert!(backend.seen().is_empty());
    assert!(channel.calls().is_empty());
}

#[tokio::test]
async fn decide_timeout_retries_once_then_speaks_fallback() {
    let mut settings = test_settings();
    settings.session.decide_timeout_ms = 100;

    let backend = Arc::new(ScriptedBackend::default());
    // Both the first attempt and its retry outlive the decide timeout
    backend.push_delayed_texts(&["too late", "too late"], Duration::from_millis(400));
    let channel = Arc::new(MockChannel::default());
    let manager = manager_with_settings(backend.clone(), channel.clone(), settings);

    manager.route_event(incoming("S1")).await.unwrap();

    assert!(wait_until(|| channel.calls().len() >= 2).await);
    let calls = channel.calls();
    assert_eq!(calls[0], "answer S1");
    assert!(calls[1].contains("please hold"), "calls: {:?}", calls);

    // Exactly two provider attempts: the original and one bounded retry
    assert_eq!(backend.seen().len(), 2);

    // The session survived the provider outage
    assert!(manager.is_active(&SessionRef::new("S1")));
    manager
        .route_event(gather_result("S1", "still there?"))
        .await
        .unwrap();
    assert!(wait_until(|| channel.calls().len() >= 3).await);
}

#[tokio::test]
async fn concurrent_events_for_one_session_are_serialized() {
    let backend = Arc::new(ScriptedBackend::default());
    backend.push_delayed_texts(
        &["greeting", "first", "second", "third"],
        Duration::from_millis(50),
    );
    let channel = Arc::new(MockChannel::default());
    let manager = manager_with(backend.clone(), channel.clone());

    manager.route_event(incoming("S1")).await.unwrap();
    for input in ["one", "two", "three"] {
        manager.route_event(gather_result("S1", input)).await.unwrap();
    }

    assert!(wait_until(|| backend.seen().len() >= 4).await);

    // At most one decide in flight, processed in arrival order
    assert_eq!(backend.max_in_flight.load(Ordering::SeqCst), 1);
    let seen = backend.seen();
    assert_eq!(&seen[1..], &["one", "two", "three"]);
}

#[tokio::test]
async fn duplicate_incoming_for_live_session_is_rejected() {
    let backend = Arc::new(ScriptedBackend::default());
    let channel = Arc::new(MockChannel::default());
    let manager = manager_with(backend.clone(), channel.clone());

    manager.route_event(incoming("S1")).await.unwrap();
    let err = manager.route_event(incoming("S1")).await.unwrap_err();
    assert!(matches!(err, SessionError::Duplicate(_)));
    assert_eq!(manager.session_count(), 1);
}

#[tokio::test]
async fn event_for_unknown_session_is_terminal() {
    let backend = Arc::new(ScriptedBackend::default());
    let channel = Arc::new(MockChannel::default());
    let manager = manager_with(backend, channel);

    let err = manager
        .route_event(gather_result("S404", "hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Terminal(_)));
}

#[tokio::test]
async fn dial_tool_transfers_and_session_continues() {
    let backend = Arc::new(ScriptedBackend::default());
    backend.push_text("Hello!");
    backend.push_tool("dial", serde_json::json!({"target": "sip:agent@example.com"}));
    let channel = Arc::new(MockChannel::default());
    let manager = manager_with(backend.clone(), channel.clone());

    manager.route_event(incoming("S1")).await.unwrap();
    assert!(wait_until(|| channel.calls().len() >= 2).await);

    manager
        .route_event(gather_result("S1", "get me a human"))
        .await
        .unwrap();

    assert!(
        wait_until(|| channel
            .calls()
            .contains(&"dial S1 sip:agent@example.com".to_string()))
        .await
    );
    assert!(manager.is_active(&SessionRef::new("S1")));

    // Remote hangup after the transfer closes the session
    manager
        .route_event(CallEvent::Hangup {
            session_ref: SessionRef::new("S1"),
        })
        .await
        .unwrap();
    assert!(wait_until(|| !manager.is_active(&SessionRef::new("S1"))).await);
}
