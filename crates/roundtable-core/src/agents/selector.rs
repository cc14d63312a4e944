//! Responder selection: which agents act on a message, in roster order

use tracing::debug;

use super::profile::Agent;

/// Outcome of resolving a message against a roster
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// At least one mention matched; only the matched agents respond
    Mentioned(Vec<Agent>),
    /// The message mentions nobody; every broadcasting agent responds.
    /// May be empty when the room has no `all`/`proactive` agents.
    Broadcast(Vec<Agent>),
    /// Mentions were present but none named an agent in the room
    Dangling { mentions: Vec<String> },
}

impl Selection {
    /// The responders, in roster order
    pub fn responders(&self) -> &[Agent] {
        match self {
            Self::Mentioned(agents) | Self::Broadcast(agents) => agents,
            Self::Dangling { .. } => &[],
        }
    }

    pub fn into_responders(self) -> Vec<Agent> {
        match self {
            Self::Mentioned(agents) | Self::Broadcast(agents) => agents,
            Self::Dangling { .. } => Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.responders().is_empty()
    }

    /// User-facing notice for an empty selection, `None` when someone will respond
    pub fn notice(&self) -> Option<String> {
        match self {
            Self::Dangling { mentions } => {
                let names: Vec<String> = mentions.iter().map(|m| format!("@{}", m)).collect();
                Some(format!(
                    "No agents matched {}. Check the agent names and try again.",
                    names.join(", ")
                ))
            }
            Self::Broadcast(agents) if agents.is_empty() => Some(
                "No agents are set to respond to every message. Use @name to address an agent."
                    .to_string(),
            ),
            _ => None,
        }
    }
}

/// Resolve mention tokens against the roster.
///
/// Mentions are exclusive: when any token names an agent, only named agents
/// respond, whatever their trigger. Every agent whose name equals some token
/// is selected, so a roster with colliding names yields all of them.
pub fn resolve(agents: &[Agent], mentions: &[String]) -> Selection {
    let mentioned: Vec<Agent> = agents
        .iter()
        .filter(|agent| mentions.iter().any(|token| agent.answers_to(token)))
        .cloned()
        .collect();

    if !mentioned.is_empty() {
        debug!(
            "Selected {} mentioned agent(s) from {} token(s)",
            mentioned.len(),
            mentions.len()
        );
        return Selection::Mentioned(mentioned);
    }

    if !mentions.is_empty() {
        debug!("No agent matched mentions {:?}", mentions);
        return Selection::Dangling {
            mentions: mentions.to_vec(),
        };
    }

    let broadcast: Vec<Agent> = agents
        .iter()
        .filter(|agent| agent.trigger.is_broadcast())
        .cloned()
        .collect();
    debug!("Selected {} broadcasting agent(s)", broadcast.len());
    Selection::Broadcast(broadcast)
}

/// Ordered responders for a message; empty for dangling mentions
pub fn select(agents: &[Agent], mentions: &[String]) -> Vec<Agent> {
    resolve(agents, mentions).into_responders()
}
