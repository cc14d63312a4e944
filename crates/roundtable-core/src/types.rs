//! Shared types for roundtable-core

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who authored a message in the room log
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SenderType {
    User,
    Agent,
}

impl std::fmt::Display for SenderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Agent => write!(f, "agent"),
        }
    }
}

/// A single entry in a room's conversation log.
///
/// Messages are immutable once created. Agent messages carry the agent id
/// and the metadata extracted from the backend reply; user messages never do.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub content: String,
    pub sender: String,
    pub sender_type: SenderType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<Vec<String>>,
}

impl Message {
    /// Create a message authored by a human participant
    pub fn user(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.into(),
            sender: sender.into(),
            sender_type: SenderType::User,
            agent_id: None,
            timestamp: Utc::now(),
            confidence: None,
            tone: None,
            references: None,
        }
    }

    /// Create a message authored by an agent, carrying reply metadata
    pub fn agent(
        agent_id: impl Into<String>,
        sender: impl Into<String>,
        content: impl Into<String>,
        confidence: f64,
        tone: impl Into<String>,
        references: Vec<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.into(),
            sender: sender.into(),
            sender_type: SenderType::Agent,
            agent_id: Some(agent_id.into()),
            timestamp: Utc::now(),
            confidence: Some(confidence),
            tone: Some(tone.into()),
            references: Some(references),
        }
    }

    pub fn is_from_agent(&self) -> bool {
        self.sender_type == SenderType::Agent
    }
}
