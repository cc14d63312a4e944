//! Event bus: broadcast turn progress to presentation layers

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use crate::types::Message;

/// Progress of a turn, in the order it happens
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RoomEvent {
    TurnStarted {
        room_id: String,
        responders: Vec<String>,
    },
    /// Transient "agent is thinking" indicator
    AgentThinking {
        room_id: String,
        agent_id: String,
        agent_name: String,
    },
    AgentReplied {
        room_id: String,
        message: Message,
    },
    /// Dismissible per-agent failure notice
    AgentFailed {
        room_id: String,
        agent_id: String,
        agent_name: String,
        notice: String,
        error: String,
    },
    /// Nobody was selected; no backend call was made
    NoResponders {
        room_id: String,
        mentions: Vec<String>,
        notice: String,
    },
    TurnFinished {
        room_id: String,
        replies: usize,
        failures: usize,
        cancelled: bool,
    },
}

impl RoomEvent {
    /// Short event name, used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::TurnStarted { .. } => "turn_started",
            Self::AgentThinking { .. } => "agent_thinking",
            Self::AgentReplied { .. } => "agent_replied",
            Self::AgentFailed { .. } => "agent_failed",
            Self::NoResponders { .. } => "no_responders",
            Self::TurnFinished { .. } => "turn_finished",
        }
    }

    pub fn room_id(&self) -> &str {
        match self {
            Self::TurnStarted { room_id, .. }
            | Self::AgentThinking { room_id, .. }
            | Self::AgentReplied { room_id, .. }
            | Self::AgentFailed { room_id, .. }
            | Self::NoResponders { room_id, .. }
            | Self::TurnFinished { room_id, .. } => room_id,
        }
    }
}

/// Broadcast event bus for room events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<RoomEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.sender.subscribe()
    }

    /// Publish an event; dropped silently when nobody is listening
    pub fn publish(&self, event: RoomEvent) {
        let receivers = self.sender.receiver_count();
        if receivers > 0 {
            debug!(
                "Publishing event '{}' for room {} to {} receivers",
                event.name(),
                event.room_id(),
                receivers
            );
            let _ = self.sender.send(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
