//! roundtable-core - Multi-agent group chat orchestration
//!
//! This crate provides:
//! - Agent profiles and mention-based responder selection
//! - Bounded conversation context shared by every responder of a turn
//! - Sequential per-turn orchestration with per-agent failure isolation
//! - Tolerant normalization of heterogeneous backend reply shapes
//! - An HTTP reasoning backend and an event bus for presentation layers

pub mod agents;
pub mod backend;
pub mod context;
pub mod error;
pub mod events;
pub mod invoker;
pub mod mentions;
pub mod normalize;
pub mod orchestrator;
pub mod room;
pub mod types;

// Re-export main types for convenience
pub use agents::{
    Agent, Frequency, InterAgentRules, ResponseLength, Selection, Trigger, resolve, select,
    validate_roster,
};
pub use backend::{AgentBackend, CallOptions, CallResult, HttpBackend};
pub use context::{CONTEXT_WINDOW, build_context};
pub use error::{InvocationError, RosterError, TurnError};
pub use events::{EventBus, RoomEvent};
pub use invoker::{AgentInvoker, AgentReply, build_agent_prompt, session_key};
pub use mentions::parse_mentions;
pub use normalize::{NormalizedReply, normalize};
pub use orchestrator::{AgentFailure, OrchestratorConfig, TurnOrchestrator, TurnReport};
pub use room::{Room, TurnPhase};
pub use types::{Message, SenderType};
