//! Conversation context window handed to every responder of a turn

use tracing::debug;

use crate::types::Message;

/// Number of most recent messages included in the window
pub const CONTEXT_WINDOW: usize = 10;

/// Rendered in place of the window when the log is empty
pub const EMPTY_CONTEXT: &str = "(no previous messages)";

/// Render the last [`CONTEXT_WINDOW`] messages as `[sender]: content` lines,
/// oldest first.
///
/// The orchestrator calls this once per turn; the same snapshot goes to
/// every responder, so replies produced earlier in the turn are not visible.
pub fn build_context(log: &[Message]) -> String {
    if log.is_empty() {
        return EMPTY_CONTEXT.to_string();
    }

    let start = log.len().saturating_sub(CONTEXT_WINDOW);
    let context = log[start..]
        .iter()
        .map(|m| format!("[{}]: {}", m.sender, m.content))
        .collect::<Vec<_>>()
        .join("\n");

    debug!(
        "Built context from {} of {} messages ({} chars)",
        log.len() - start,
        log.len(),
        context.len()
    );

    context
}
