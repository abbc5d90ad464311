//! Workflows: compositions of agent invocations
//!
//! - **definition**: loaded workflows with their validated step graph
//! - **mapping**: source paths and step input assembly
//! - **registry**: named workflows
//! - **engine**: dependency-ordered, bounded-concurrency execution

mod definition;
mod engine;
mod mapping;
mod registry;

pub use definition::{StepDefinition, StepInput, WorkflowDefinition, WorkflowMode};
pub use engine::{StepReport, WorkflowEngine, WorkflowOutput};
pub use mapping::{build_step_input, SourcePath};
pub use registry::WorkflowRegistry;
