//! Abode Core - multi-agent orchestration for a real-estate assistant
//!
//! This crate provides the runtime behind the abode server:
//!
//! - **Tool**: callable capabilities with JSON-schema contracts, registered by
//!   reference in a catalog and bound by name in configuration
//! - **Agent**: agent definitions, the agent registry, and the bounded
//!   reasoning loop that runs them
//! - **Workflow**: linear or dependency-graph compositions of agent calls,
//!   run with bounded concurrency
//! - **Trace**: per-request, append-only execution records
//! - **Config**: the TOML runtime configuration and its bundled default
//! - **Runtime**: the assembled, immutable bundle shared by request handlers
//!
//! # Architecture
//!
//! ```text
//! RuntimeConfig ──► ToolRegistry ──► AgentRegistry ──► WorkflowRegistry
//!                        │                 │                  │
//!                        └──────► AgentExecutor ◄──── WorkflowEngine
//! ```
//!
//! All cross references are checked while the runtime is built; nothing is
//! resolved lazily at request time except the target name itself.

pub mod agent;
pub mod config;
pub mod error;
pub mod runtime;
pub mod tool;
pub mod trace;
pub mod workflow;

pub use agent::{
    AgentDefinition, AgentExecutor, AgentOutput, AgentRegistry, Decision, ExecutionRequest,
    PlannedReasoner, Reasoner,
};
pub use config::{
    AgentConfig, InputBinding, RuntimeConfig, RuntimeSettings, StepConfig, ToolConfig,
    WorkflowConfig,
};
pub use error::{AbodeError, ConfigError, EntityKind, MappingError, Result, ToolError};
pub use runtime::{Runtime, RuntimeBuilder};
pub use tool::{Tool, ToolCatalog, ToolContext, ToolDefinition, ToolRegistry};
pub use trace::{ExecutionTrace, TraceEntry, TraceKind};
pub use workflow::{WorkflowDefinition, WorkflowEngine, WorkflowOutput, WorkflowRegistry};

/// Returns the version of abode-core
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
