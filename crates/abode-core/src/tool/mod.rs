//! Tools: the callable capabilities agents use
//!
//! Implementations are registered by reference in a [`ToolCatalog`] at
//! startup. Configuration declares named tools bound to those
//! implementations; the resulting [`ToolRegistry`] is immutable.

pub mod builtin;
mod definition;
mod registry;
pub mod schema;

pub use definition::{Tool, ToolContext, ToolDefinition};
pub use registry::{RegisteredTool, ToolCatalog, ToolRegistry};
