//! Room agents: profiles, roster validation and responder selection
//!
//! An agent is an automated participant with a name, a persona and a
//! trigger policy. The selector decides, for one incoming message, which
//! agents respond and in which order.

pub mod profile;
pub mod selector;

pub use profile::{
    Agent, Frequency, InterAgentRules, ResponseLength, Trigger, validate_roster,
};
pub use selector::{Selection, resolve, select};
