//! Agents: definitions, registry and the executor that runs them

mod definition;
mod executor;
mod reasoner;
mod registry;

pub use definition::AgentDefinition;
pub use executor::{AgentExecutor, AgentOutput, ExecutionRequest};
pub use reasoner::{Decision, Observation, Outcome, PlannedReasoner, Reasoner, ReasoningContext};
pub use registry::AgentRegistry;
