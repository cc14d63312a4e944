//! Reasoning backend abstraction
//!
//! The orchestrator talks to exactly one external call, `send`. Backends
//! implement [`AgentBackend`]; [`HttpBackend`] is the networked one.

pub mod http;
pub mod types;

pub use http::HttpBackend;
pub use types::{AgentBackend, CallOptions, CallResult};
