//! Agent profile: identity, persona and trigger policy of a room participant

use serde::{Deserialize, Serialize};

use crate::error::RosterError;
use crate::mentions::is_mentionable;

/// When an agent speaks without being addressed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    /// Only when named with an `@mention`
    Mentions,
    /// Every message that mentions nobody
    #[default]
    All,
    /// Same selection as `All`; the persona is expected to steer the topic
    Proactive,
}

impl Trigger {
    /// Whether the agent answers messages that contain no mentions at all
    pub fn is_broadcast(&self) -> bool {
        matches!(self, Self::All | Self::Proactive)
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mentions => write!(f, "mentions"),
            Self::All => write!(f, "all"),
            Self::Proactive => write!(f, "proactive"),
        }
    }
}

/// Qualitative reply length. Rendered as guidance, never a token cap.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResponseLength {
    Short,
    #[default]
    Medium,
    Long,
    Unlimited,
}

impl ResponseLength {
    pub fn guidance(&self) -> &'static str {
        match self {
            Self::Short => "Keep your reply short: two or three sentences at most.",
            Self::Medium => "Keep your reply to a few concise paragraphs.",
            Self::Long => "Give a thorough, detailed reply.",
            Self::Unlimited => "Use as much length as the question genuinely needs.",
        }
    }
}

impl std::fmt::Display for ResponseLength {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Short => write!(f, "short"),
            Self::Medium => write!(f, "medium"),
            Self::Long => write!(f, "long"),
            Self::Unlimited => write!(f, "unlimited"),
        }
    }
}

/// How often an agent would like to participate. Forwarded to the backend as-is.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Frequency {
    #[default]
    #[serde(rename = "every")]
    Every,
    #[serde(rename = "every-2nd")]
    EverySecond,
    #[serde(rename = "every-3rd")]
    EveryThird,
    #[serde(rename = "cooldown")]
    Cooldown,
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Every => write!(f, "every"),
            Self::EverySecond => write!(f, "every-2nd"),
            Self::EveryThird => write!(f, "every-3rd"),
            Self::Cooldown => write!(f, "cooldown"),
        }
    }
}

/// Whether an agent should see peer replies from the same turn.
///
/// Reserved: context assembly currently gives every responder the same
/// snapshot regardless of this value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum InterAgentRules {
    #[default]
    Reference,
    Independent,
}

impl std::fmt::Display for InterAgentRules {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reference => write!(f, "reference"),
            Self::Independent => write!(f, "independent"),
        }
    }
}

/// A configured automated participant in a room.
///
/// Owned by the room configuration; the orchestrator only reads it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Agent {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub trigger: Trigger,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default = "default_personality")]
    pub personality: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default)]
    pub response_length: ResponseLength,
    #[serde(default)]
    pub frequency: Frequency,
    #[serde(default)]
    pub inter_agent_rules: InterAgentRules,
}

fn default_personality() -> String {
    "analytical".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_top_p() -> f32 {
    0.9
}

impl Agent {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            trigger: Trigger::default(),
            system_prompt: String::new(),
            personality: default_personality(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            response_length: ResponseLength::default(),
            frequency: Frequency::default(),
            inter_agent_rules: InterAgentRules::default(),
        }
    }

    pub fn with_trigger(mut self, trigger: Trigger) -> Self {
        self.trigger = trigger;
        self
    }

    pub fn with_personality(mut self, personality: impl Into<String>) -> Self {
        self.personality = personality.into();
        self
    }

    /// Case-insensitive comparison against a lowercase mention token
    pub fn answers_to(&self, token: &str) -> bool {
        self.name.to_lowercase() == token.to_lowercase()
    }

    /// Check a single agent's fields
    pub fn validate(&self) -> Result<(), RosterError> {
        if self.id.trim().is_empty() {
            return Err(RosterError::EmptyId {
                name: self.name.clone(),
            });
        }
        if self.name.is_empty() {
            return Err(RosterError::EmptyName {
                id: self.id.clone(),
            });
        }
        if !is_mentionable(&self.name) {
            return Err(RosterError::UnmentionableName {
                name: self.name.clone(),
            });
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(RosterError::OutOfRange {
                name: self.name.clone(),
                field: "temperature",
                value: self.temperature,
            });
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(RosterError::OutOfRange {
                name: self.name.clone(),
                field: "top_p",
                value: self.top_p,
            });
        }
        Ok(())
    }
}

/// Validate a whole roster: every agent is well-formed, ids are unique and
/// names are unique ignoring case, so a mention resolves to at most one agent.
pub fn validate_roster(agents: &[Agent]) -> Result<(), RosterError> {
    let mut ids = std::collections::HashSet::new();
    let mut names = std::collections::HashSet::new();
    for agent in agents {
        agent.validate()?;
        if !ids.insert(agent.id.as_str()) {
            return Err(RosterError::DuplicateId {
                id: agent.id.clone(),
            });
        }
        if !names.insert(agent.name.to_lowercase()) {
            return Err(RosterError::DuplicateName {
                name: agent.name.clone(),
            });
        }
    }
    Ok(())
}
