//! Two-step LLM extraction (spec §4.8) and action-based aggregation
//! (spec §4.9): images -> scene text -> actions -> activities.

pub mod action_agent;
pub mod raw_agent;
pub mod session_agent;

pub use action_agent::{ActionAgent, ActionExtractionOutcome};
pub use raw_agent::{RawAgent, Scene};
pub use session_agent::{DraftActivity, SessionAgent, SessionAgentConfig};
