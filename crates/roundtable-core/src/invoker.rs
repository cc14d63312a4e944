//! Single-agent invocation: prompt building, one backend call, normalization

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::agents::Agent;
use crate::backend::{AgentBackend, CallOptions};
use crate::error::InvocationError;
use crate::normalize::{NormalizedReply, normalize};

/// A successful agent reply, already normalized
pub type AgentReply = NormalizedReply;

/// Session key addressing per-(room, agent) memory on the backend
pub fn session_key(room_id: &str, agent_id: &str) -> String {
    format!("room-{}-agent-{}", room_id, agent_id)
}

/// Build the outbound prompt for one agent
pub fn build_agent_prompt(
    agent: &Agent,
    user_message: &str,
    user_display_name: &str,
    context: &str,
) -> String {
    let mut prompt = String::new();

    prompt.push_str("[System Configuration]\n");
    prompt.push_str(&format!("Agent Name: {}\n", agent.name));
    prompt.push_str(&format!("Personality: {}\n", agent.personality));
    prompt.push_str(&format!("Response Style: {}\n", agent.response_length));
    if !agent.system_prompt.trim().is_empty() {
        prompt.push_str(&format!("System Prompt: {}\n", agent.system_prompt.trim()));
    }
    prompt.push_str(&format!(
        "Temperature: {}\nTop P: {}\n",
        agent.temperature, agent.top_p
    ));
    prompt.push_str(&format!(
        "Trigger: {}\nFrequency: {}\nInter-Agent Rules: {}\n",
        agent.trigger, agent.frequency, agent.inter_agent_rules
    ));

    prompt.push_str("\n[Conversation Context]\n");
    prompt.push_str(context);
    prompt.push('\n');

    prompt.push_str("\n[User Message]\n");
    prompt.push_str(&format!("{}: {}\n", user_display_name, user_message));

    prompt.push('\n');
    prompt.push_str(&format!(
        "Respond as {} with a {} tone. {} Your agent_name in the response must be \"{}\".",
        agent.name,
        agent.personality,
        agent.response_length.guidance(),
        agent.name
    ));

    prompt
}

/// Turns one agent plus one user message into exactly one backend call
#[derive(Clone)]
pub struct AgentInvoker {
    backend: Arc<dyn AgentBackend>,
    backend_id: String,
    room_id: String,
    timeout: Option<Duration>,
}

impl AgentInvoker {
    pub fn new(
        backend: Arc<dyn AgentBackend>,
        backend_id: impl Into<String>,
        room_id: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            backend_id: backend_id.into(),
            room_id: room_id.into(),
            timeout: None,
        }
    }

    /// Bound each backend call; an elapsed timeout counts as a failed call
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Invoke one agent. Failures come back as values, never as panics.
    pub async fn invoke(
        &self,
        agent: &Agent,
        user_message: &str,
        user_display_name: &str,
        context: &str,
    ) -> Result<AgentReply, InvocationError> {
        let prompt = build_agent_prompt(agent, user_message, user_display_name, context);
        let options = CallOptions::new(session_key(&self.room_id, &agent.id));

        debug!(
            "Invoking agent '{}' via {} backend (session {})",
            agent.name,
            self.backend.backend_name(),
            options.session_id
        );

        let call = self.backend.send(&prompt, &self.backend_id, &options);
        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!("Agent '{}' timed out after {:?}", agent.name, limit);
                    return Err(InvocationError::TimedOut(limit.as_secs()));
                }
            },
            None => call.await,
        };

        let result = outcome.map_err(|e| {
            warn!("Agent '{}' call failed: {:#}", agent.name, e);
            InvocationError::CallFailed(format!("{:#}", e))
        })?;

        if !result.success {
            warn!("Agent '{}' call reported failure", agent.name);
            return Err(InvocationError::Unsuccessful);
        }

        let payload = result.payload().ok_or(InvocationError::EmptyReply)?;
        let reply = normalize(&payload, &agent.name, &agent.personality);
        if reply.text.is_empty() {
            warn!("Agent '{}' reply had no extractable text", agent.name);
            return Err(InvocationError::EmptyReply);
        }

        debug!(
            "Agent '{}' replied ({} chars, confidence {:.2})",
            agent.name,
            reply.text.len(),
            reply.confidence
        );
        Ok(reply)
    }
}
