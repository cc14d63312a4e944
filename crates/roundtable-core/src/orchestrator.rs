//! Turn orchestration
//!
//! One user message becomes one turn: the message is logged, responders are
//! selected, and each responder is invoked strictly one after another with
//! the same context snapshot. A failing agent is reported and skipped; the
//! rest of the queue still runs.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agents::{Agent, Selection, resolve};
use crate::backend::AgentBackend;
use crate::context::build_context;
use crate::error::{InvocationError, TurnError};
use crate::events::{EventBus, RoomEvent};
use crate::invoker::AgentInvoker;
use crate::mentions::parse_mentions;
use crate::room::Room;
use crate::types::Message;

/// Configuration for the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Backend-side identifier every call is addressed to
    pub backend_id: String,
    /// Per-call limit in seconds; 0 disables it
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
}

fn default_call_timeout_secs() -> u64 {
    120
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            backend_id: "default".to_string(),
            call_timeout_secs: default_call_timeout_secs(),
        }
    }
}

/// One agent that produced no message this turn
#[derive(Debug, Clone, PartialEq)]
pub struct AgentFailure {
    pub agent_id: String,
    pub agent_name: String,
    pub error: InvocationError,
    pub notice: String,
}

/// Everything a turn did, returned once the queue is exhausted
#[derive(Debug, Clone)]
pub struct TurnReport {
    pub user_message: Message,
    pub selection: Selection,
    /// Agent messages appended to the log, in append order
    pub replies: Vec<Message>,
    pub failures: Vec<AgentFailure>,
    /// Set when no agent was selected
    pub notice: Option<String>,
    /// Set when the turn was abandoned before the queue ran out
    pub cancelled: bool,
}

impl TurnReport {
    pub fn responder_count(&self) -> usize {
        self.selection.responders().len()
    }
}

/// Notice shown when one agent fails
pub fn failure_notice(agent_name: &str) -> String {
    format!(
        "{} failed to respond. You can try sending the message again.",
        agent_name
    )
}

/// Drives turns for any number of rooms; each room allows one turn at a time
pub struct TurnOrchestrator {
    backend: Arc<dyn AgentBackend>,
    config: OrchestratorConfig,
    events: EventBus,
    cancel: CancellationToken,
}

impl TurnOrchestrator {
    pub fn new(backend: Arc<dyn AgentBackend>, config: OrchestratorConfig) -> Self {
        Self {
            backend,
            config,
            events: EventBus::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Publish events on an existing bus
    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// Stop turns when this token is cancelled
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Abandon in-flight turns and refuse new ones. Nothing partial is appended;
    /// rooms return to idle.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    fn invoker_for(&self, room: &Room) -> AgentInvoker {
        let invoker =
            AgentInvoker::new(self.backend.clone(), &self.config.backend_id, room.id());
        match self.config.call_timeout_secs {
            0 => invoker,
            secs => invoker.with_timeout(Duration::from_secs(secs)),
        }
    }

    /// Process one user message in `room`.
    ///
    /// Returns `Err` only for precondition violations, before anything is
    /// logged. Per-agent failures are in the report.
    pub async fn send(
        &self,
        room: &Room,
        text: &str,
        display_name: &str,
    ) -> Result<TurnReport, TurnError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(TurnError::EmptyMessage);
        }
        if self.cancel.is_cancelled() {
            warn!("Rejected message for room '{}': orchestrator shut down", room.id());
            return Err(TurnError::ShutDown);
        }

        let turn = match room.begin_turn() {
            Ok(turn) => turn,
            Err(e) => {
                warn!("Rejected message for room '{}': turn in progress", room.id());
                return Err(e);
            }
        };

        let user_message = Message::user(display_name, text);
        room.append(user_message.clone()).await;

        // One snapshot for the whole turn
        let context = build_context(&room.messages().await);
        let roster = room.agents().await;
        let selection = resolve(&roster, &parse_mentions(text));

        let mut report = TurnReport {
            user_message,
            selection: selection.clone(),
            replies: Vec::new(),
            failures: Vec::new(),
            notice: None,
            cancelled: false,
        };

        if let Some(notice) = selection.notice() {
            info!("Room '{}': no responders selected", room.id());
            let mentions = match &selection {
                Selection::Dangling { mentions } => mentions.clone(),
                _ => Vec::new(),
            };
            self.events.publish(RoomEvent::NoResponders {
                room_id: room.id().to_string(),
                mentions,
                notice: notice.clone(),
            });
            report.notice = Some(notice);
            return Ok(report);
        }

        let responders: Vec<Agent> = selection.into_responders();
        info!(
            "Room '{}': turn started with {} responder(s)",
            room.id(),
            responders.len()
        );
        turn.enqueue(responders.iter().map(|a| a.name.clone()));
        self.events.publish(RoomEvent::TurnStarted {
            room_id: room.id().to_string(),
            responders: responders.iter().map(|a| a.name.clone()).collect(),
        });

        let invoker = self.invoker_for(room);

        for agent in &responders {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            turn.start_thinking(&agent.name);
            self.events.publish(RoomEvent::AgentThinking {
                room_id: room.id().to_string(),
                agent_id: agent.id.clone(),
                agent_name: agent.name.clone(),
            });

            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                outcome = invoker.invoke(agent, text, display_name, &context) => Some(outcome),
            };

            match outcome {
                None => {
                    warn!(
                        "Room '{}': turn cancelled while '{}' was thinking",
                        room.id(),
                        agent.name
                    );
                    turn.finish(&agent.name);
                    report.cancelled = true;
                    break;
                }
                Some(Ok(reply)) => {
                    let message = Message::agent(
                        &agent.id,
                        reply.agent_name,
                        reply.text,
                        reply.confidence,
                        reply.tone,
                        reply.references,
                    );
                    room.append(message.clone()).await;
                    debug!("Room '{}': '{}' replied", room.id(), agent.name);
                    self.events.publish(RoomEvent::AgentReplied {
                        room_id: room.id().to_string(),
                        message: message.clone(),
                    });
                    report.replies.push(message);
                }
                Some(Err(error)) => {
                    let notice = failure_notice(&agent.name);
                    warn!("Room '{}': '{}' failed: {}", room.id(), agent.name, error);
                    turn.record_error(&notice);
                    self.events.publish(RoomEvent::AgentFailed {
                        room_id: room.id().to_string(),
                        agent_id: agent.id.clone(),
                        agent_name: agent.name.clone(),
                        notice: notice.clone(),
                        error: error.to_string(),
                    });
                    report.failures.push(AgentFailure {
                        agent_id: agent.id.clone(),
                        agent_name: agent.name.clone(),
                        error,
                        notice,
                    });
                }
            }

            turn.finish(&agent.name);
        }

        info!(
            "Room '{}': turn finished ({} replies, {} failures{})",
            room.id(),
            report.replies.len(),
            report.failures.len(),
            if report.cancelled { ", cancelled" } else { "" }
        );
        self.events.publish(RoomEvent::TurnFinished {
            room_id: room.id().to_string(),
            replies: report.replies.len(),
            failures: report.failures.len(),
            cancelled: report.cancelled,
        });

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::Trigger;
    use crate::backend::{CallOptions, CallResult};
    use crate::room::TurnPhase;
    use crate::types::SenderType;
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Backend answering per session id, recording calls in order
    #[derive(Default)]
    struct FakeBackend {
        replies: Mutex<HashMap<String, Result<CallResult>>>,
        calls: Mutex<Vec<(String, String)>>,
        hang: bool,
    }

    impl FakeBackend {
        fn reply(self, agent_id: &str, outcome: Result<CallResult>) -> Self {
            self.replies
                .lock()
                .unwrap()
                .insert(format!("room-r1-agent-{}", agent_id), outcome);
            self
        }

        fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AgentBackend for FakeBackend {
        fn backend_name(&self) -> &str {
            "fake"
        }

        async fn send(
            &self,
            prompt: &str,
            _backend_id: &str,
            options: &CallOptions,
        ) -> Result<CallResult> {
            self.calls
                .lock()
                .unwrap()
                .push((options.session_id.clone(), prompt.to_string()));
            if self.hang {
                std::future::pending::<()>().await;
            }
            self.replies
                .lock()
                .unwrap()
                .remove(&options.session_id)
                .unwrap_or_else(|| Err(anyhow!("no reply scripted for {}", options.session_id)))
        }
    }

    fn text_reply(agent: &str, text: &str) -> Result<CallResult> {
        Ok(CallResult::ok(json!({
            "result": { "response": text, "agent_name": agent, "confidence": 0.8 }
        })))
    }

    fn roster() -> Vec<Agent> {
        vec![
            Agent::new("alpha", "Alpha").with_trigger(Trigger::All).with_personality("formal"),
            Agent::new("beta", "Beta").with_trigger(Trigger::Mentions),
        ]
    }

    fn setup(
        backend: FakeBackend,
        agents: Vec<Agent>,
    ) -> (TurnOrchestrator, Room, Arc<FakeBackend>) {
        let backend = Arc::new(backend);
        let orchestrator = TurnOrchestrator::new(
            backend.clone(),
            OrchestratorConfig {
                backend_id: "backend-1".to_string(),
                call_timeout_secs: 0,
            },
        );
        let room = Room::new("r1", "Strategy", agents).unwrap();
        (orchestrator, room, backend)
    }

    fn drain(rx: &mut tokio::sync::broadcast::Receiver<RoomEvent>) -> Vec<RoomEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_broadcast_turn_appends_reply() {
        let (orch, room, backend) = setup(
            FakeBackend::default().reply("alpha", text_reply("Alpha", "Retention first.")),
            roster(),
        );

        let report = orch.send(&room, "  Thoughts?  ", "Sarah").await.unwrap();

        assert_eq!(report.user_message.content, "Thoughts?");
        assert_eq!(report.replies.len(), 1);
        assert!(report.failures.is_empty());
        assert!(report.notice.is_none());

        let log = room.messages().await;
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].sender_type, SenderType::User);
        assert_eq!(log[0].sender, "Sarah");
        assert_eq!(log[1].sender, "Alpha");
        assert_eq!(log[1].agent_id.as_deref(), Some("alpha"));
        assert_eq!(log[1].confidence, Some(0.8));
        assert_eq!(log[1].tone.as_deref(), Some("formal"));
        assert_eq!(log[1].references.as_deref(), Some(&[][..]));

        assert_eq!(backend.calls().len(), 1);
        assert_eq!(room.phase(), TurnPhase::Idle);
    }

    #[tokio::test]
    async fn test_mention_routes_to_mentioned_agent_only() {
        let (orch, room, backend) = setup(
            FakeBackend::default().reply("beta", text_reply("Beta", "Here.")),
            roster(),
        );

        let report = orch.send(&room, "@Beta thoughts?", "Sarah").await.unwrap();

        assert_eq!(report.replies.len(), 1);
        assert_eq!(report.replies[0].agent_id.as_deref(), Some("beta"));
        let calls = backend.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "room-r1-agent-beta");
    }

    #[tokio::test]
    async fn test_dangling_mention_makes_no_call() {
        let (orch, room, backend) = setup(FakeBackend::default(), roster());
        let mut rx = orch.events().subscribe();

        let report = orch.send(&room, "@Gamma thoughts?", "Sarah").await.unwrap();

        assert!(report.replies.is_empty());
        assert!(report.notice.as_deref().unwrap().contains("@gamma"));
        assert!(backend.calls().is_empty());
        assert_eq!(room.message_count().await, 1);

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            RoomEvent::NoResponders { mentions, .. } if mentions == &vec!["gamma".to_string()]
        ));
        assert_eq!(room.phase(), TurnPhase::Idle);
    }

    #[tokio::test]
    async fn test_first_failure_does_not_block_second() {
        let agents = vec![Agent::new("alpha", "Alpha"), Agent::new("gamma", "Gamma")];
        let (orch, room, backend) = setup(
            FakeBackend::default()
                .reply("alpha", Err(anyhow!("backend exploded")))
                .reply("gamma", text_reply("Gamma", "I made it.")),
            agents,
        );
        let mut rx = orch.events().subscribe();

        let report = orch.send(&room, "Ideas?", "Sarah").await.unwrap();

        assert_eq!(report.replies.len(), 1);
        assert_eq!(report.replies[0].content, "I made it.");
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].agent_name, "Alpha");
        assert!(matches!(report.failures[0].error, InvocationError::CallFailed(_)));
        assert_eq!(report.failures[0].notice, failure_notice("Alpha"));

        let log = room.messages().await;
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].agent_id.as_deref(), Some("gamma"));

        let calls = backend.calls();
        assert_eq!(calls[0].0, "room-r1-agent-alpha");
        assert_eq!(calls[1].0, "room-r1-agent-gamma");

        let names: Vec<&str> = drain(&mut rx).iter().map(|e| e.name()).collect();
        assert_eq!(
            names,
            vec![
                "turn_started",
                "agent_thinking",
                "agent_failed",
                "agent_thinking",
                "agent_replied",
                "turn_finished"
            ]
        );
        assert_eq!(room.phase(), TurnPhase::Idle);
        assert!(room.thinking().is_empty());
    }

    #[tokio::test]
    async fn test_earlier_reply_survives_later_failure() {
        let agents = vec![Agent::new("alpha", "Alpha"), Agent::new("gamma", "Gamma")];
        let (orch, room, _backend) = setup(
            FakeBackend::default()
                .reply("alpha", text_reply("Alpha", "First!"))
                .reply("gamma", Ok(CallResult::failed(None))),
            agents,
        );

        let report = orch.send(&room, "Ideas?", "Sarah").await.unwrap();

        assert_eq!(report.replies.len(), 1);
        assert_eq!(report.failures[0].error, InvocationError::Unsuccessful);
        assert_eq!(room.messages().await[1].content, "First!");
    }

    #[tokio::test]
    async fn test_malformed_reply_is_a_failure() {
        let (orch, room, _backend) = setup(
            FakeBackend::default()
                .reply("alpha", Ok(CallResult::ok(json!({ "unexpected": true })))),
            roster(),
        );

        let report = orch.send(&room, "Anyone?", "Sarah").await.unwrap();

        assert!(report.replies.is_empty());
        assert_eq!(report.failures[0].error, InvocationError::EmptyReply);
        assert_eq!(room.message_count().await, 1);
    }

    #[tokio::test]
    async fn test_context_snapshot_excludes_same_turn_replies() {
        let agents = vec![Agent::new("alpha", "Alpha"), Agent::new("gamma", "Gamma")];
        let (orch, room, backend) = setup(
            FakeBackend::default()
                .reply("alpha", text_reply("Alpha", "ALPHA-SAYS-THIS"))
                .reply("gamma", text_reply("Gamma", "ok")),
            agents,
        );

        orch.send(&room, "Ideas?", "Sarah").await.unwrap();

        let calls = backend.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].1.contains("[Sarah]: Ideas?"));
        assert!(!calls[1].1.contains("ALPHA-SAYS-THIS"));
        let context_of = |prompt: &str| {
            let start = prompt.find("[Conversation Context]").unwrap();
            let end = prompt.find("[User Message]").unwrap();
            prompt[start..end].to_string()
        };
        assert_eq!(context_of(&calls[0].1), context_of(&calls[1].1));
    }

    #[tokio::test]
    async fn test_context_window_is_bounded() {
        let (orch, room, backend) = setup(
            FakeBackend::default().reply("alpha", text_reply("Alpha", "ok")),
            roster(),
        );
        let history: Vec<Message> = (0..15)
            .map(|i| Message::user("Old", format!("history-{:02}", i)))
            .collect();
        let room = room.with_history(history);

        orch.send(&room, "Latest?", "Sarah").await.unwrap();

        let prompt = &backend.calls()[0].1;
        assert!(!prompt.contains("history-05"));
        assert!(prompt.contains("history-06"));
        assert!(prompt.contains("[Sarah]: Latest?"));
    }

    #[tokio::test]
    async fn test_empty_message_rejected_before_mutation() {
        let (orch, room, backend) = setup(FakeBackend::default(), roster());

        assert_eq!(orch.send(&room, "   ", "Sarah").await.unwrap_err(), TurnError::EmptyMessage);
        assert_eq!(room.message_count().await, 0);
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_busy_room_rejects_second_send() {
        let (orch, room, _backend) = setup(FakeBackend::default(), roster());
        let _turn = room.begin_turn().unwrap();

        let err = orch.send(&room, "hello?", "Sarah").await.unwrap_err();
        assert!(matches!(err, TurnError::TurnInProgress { .. }));
        assert_eq!(room.message_count().await, 0);
    }

    #[tokio::test]
    async fn test_cancel_mid_turn_appends_nothing_partial() {
        let backend = FakeBackend {
            hang: true,
            ..Default::default()
        };
        let (orch, room, _backend) = setup(backend, roster());
        let orch = Arc::new(orch);
        let room = Arc::new(room);

        let handle = {
            let orch = orch.clone();
            let room = room.clone();
            tokio::spawn(async move { orch.send(&room, "Thoughts?", "Sarah").await })
        };

        // Wait until Alpha is thinking
        while room.thinking().is_empty() {
            tokio::task::yield_now().await;
        }
        orch.shutdown();

        let report = handle.await.unwrap().unwrap();
        assert!(report.cancelled);
        assert!(report.replies.is_empty());
        assert!(report.failures.is_empty());
        assert_eq!(room.message_count().await, 1);
        assert_eq!(room.phase(), TurnPhase::Idle);
    }

    #[tokio::test]
    async fn test_reply_text_appended_verbatim() {
        let (orch, room, _backend) = setup(
            FakeBackend::default().reply(
                "alpha",
                Ok(CallResult::ok(Value::String("  indented code\n    more\n".to_string()))),
            ),
            roster(),
        );

        let report = orch.send(&room, "Show me", "Sarah").await.unwrap();
        assert_eq!(report.replies[0].content, "  indented code\n    more\n");
        assert_eq!(room.messages().await[1].content, "  indented code\n    more\n");
    }

    #[test]
    fn test_room_with_unmentionable_name_is_refused() {
        let err = Room::new(
            "r1",
            "Strategy",
            vec![Agent::new("cost", "cost-optimizer").with_trigger(Trigger::Mentions)],
        )
        .unwrap_err();
        assert!(matches!(err, crate::error::RosterError::UnmentionableName { .. }));
    }

    #[tokio::test]
    async fn test_send_after_shutdown_rejected_before_mutation() {
        let (orch, room, backend) = setup(
            FakeBackend::default().reply("alpha", text_reply("Alpha", "too late")),
            roster(),
        );
        let mut rx = orch.events().subscribe();
        orch.shutdown();

        let err = orch.send(&room, "hello", "Sarah").await.unwrap_err();
        assert_eq!(err, TurnError::ShutDown);
        assert_eq!(room.message_count().await, 0);
        assert!(backend.calls().is_empty());
        assert!(drain(&mut rx).is_empty());
        assert!(!room.is_busy());
    }

    #[tokio::test]
    async fn test_dropped_turn_future_releases_room() {
        let backend = FakeBackend {
            hang: true,
            ..Default::default()
        };
        let (orch, room, _backend) = setup(backend, roster());

        let result = tokio::time::timeout(
            Duration::from_millis(50),
            orch.send(&room, "Thoughts?", "Sarah"),
        )
        .await;
        assert!(result.is_err());

        assert_eq!(room.phase(), TurnPhase::Idle);
        assert_eq!(room.message_count().await, 1);
    }

    #[tokio::test]
    async fn test_self_reported_name_is_used_as_sender() {
        let (orch, room, _backend) = setup(
            FakeBackend::default().reply(
                "alpha",
                Ok(CallResult::ok(Value::String("plain text answer".to_string()))),
            ),
            roster(),
        );

        let report = orch.send(&room, "Hi", "Sarah").await.unwrap();
        let reply = &report.replies[0];
        assert_eq!(reply.content, "plain text answer");
        assert_eq!(reply.sender, "Alpha");
        assert_eq!(reply.confidence, Some(0.0));
    }

    #[test]
    fn test_orchestrator_config_default() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.call_timeout_secs, 120);
        assert_eq!(config.backend_id, "default");
    }
}
