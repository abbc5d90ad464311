//! Tool contract and definitions

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::ToolError;

/// Per-invocation context handed to a tool
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Request this invocation belongs to
    pub request_id: Uuid,
    /// Agent issuing the call
    pub agent: String,
    /// Iteration of the agent loop that issued the call
    pub iteration: u32,
    /// Cancelled when the request is abandoned; long-running tools must watch it
    pub cancellation: CancellationToken,
}

impl ToolContext {
    pub fn new(request_id: Uuid, agent: impl Into<String>, cancellation: CancellationToken) -> Self {
        Self {
            request_id,
            agent: agent.into(),
            iteration: 0,
            cancellation,
        }
    }

    /// Detached context for direct invocations in tests and tooling
    pub fn detached(agent: impl Into<String>) -> Self {
        Self::new(Uuid::new_v4(), agent, CancellationToken::new())
    }

    pub fn at_iteration(mut self, iteration: u32) -> Self {
        self.iteration = iteration;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// Capability contract every tool implements
///
/// Tools are registered by reference at startup through a
/// [`ToolCatalog`](super::ToolCatalog); configuration files only bind names to
/// already-registered implementations.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Implementation name the configuration binds to
    fn name(&self) -> &str;

    /// Default description shown to reasoners and API clients
    fn description(&self) -> &str;

    /// JSON schema of the input object
    fn input_schema(&self) -> Value;

    /// JSON schema of the output object
    fn output_schema(&self) -> Value {
        json!({ "type": "object" })
    }

    /// Environment variable this tool needs but does not have
    fn missing_secret(&self) -> Option<&'static str> {
        None
    }

    /// Run the tool
    async fn invoke(&self, input: Value, ctx: &ToolContext) -> Result<Value, ToolError>;
}

/// Loaded, immutable description of a configured tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Name agents refer to
    pub name: String,
    /// Registered implementation backing this tool
    pub implementation: String,
    pub description: String,
    pub input_schema: Value,
    pub output_schema: Value,
}

impl ToolDefinition {
    /// Describe `tool` under a configured name
    pub fn for_tool(name: impl Into<String>, tool: &dyn Tool) -> Self {
        Self {
            name: name.into(),
            implementation: tool.name().to_string(),
            description: tool.description().to_string(),
            input_schema: tool.input_schema(),
            output_schema: tool.output_schema(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}
