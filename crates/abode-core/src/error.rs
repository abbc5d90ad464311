//! Error types for abode-core

use thiserror::Error;

use crate::trace::ExecutionTrace;

/// Result type alias for abode operations
pub type Result<T> = std::result::Result<T, AbodeError>;

/// Kind of definition a lookup was made against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Agent,
    Tool,
    Workflow,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Agent => write!(f, "agent"),
            EntityKind::Tool => write!(f, "tool"),
            EntityKind::Workflow => write!(f, "workflow"),
        }
    }
}

/// Main error type for abode operations
#[derive(Error, Debug)]
pub enum AbodeError {
    /// Malformed or inconsistent configuration, raised at load time
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Unknown agent, workflow or tool referenced at request time
    #[error("Unknown {kind}: {name}")]
    NotFound { kind: EntityKind, name: String },

    /// Agent loop hit its iteration cap without a final answer
    #[error("Agent '{agent}' reached its limit of {max_iterations} iterations without a final answer")]
    IterationLimit {
        agent: String,
        max_iterations: u32,
        trace: Box<ExecutionTrace>,
    },

    /// Workflow step input could not be assembled
    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),

    /// Non-recoverable tool fault
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    /// A workflow step failed; remaining steps were abandoned
    #[error("Workflow '{workflow}' failed at step {step_index} ('{step}'): {cause}")]
    Workflow {
        workflow: String,
        step: String,
        step_index: usize,
        cause: Box<AbodeError>,
        trace: Box<ExecutionTrace>,
    },

    /// The reasoner could not produce a decision
    #[error("Reasoner error for agent '{agent}': {message}")]
    Reasoner { agent: String, message: String },

    /// The caller went away or the request timed out
    #[error("Execution cancelled")]
    Cancelled,
}

impl AbodeError {
    pub fn not_found(kind: EntityKind, name: impl Into<String>) -> Self {
        AbodeError::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Stable machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            AbodeError::Config(_) => "config_error",
            AbodeError::NotFound { .. } => "not_found",
            AbodeError::IterationLimit { .. } => "iteration_limit",
            AbodeError::Mapping(_) => "mapping_error",
            AbodeError::Tool(_) => "tool_error",
            AbodeError::Workflow { .. } => "workflow_error",
            AbodeError::Reasoner { .. } => "reasoner_error",
            AbodeError::Cancelled => "cancelled",
        }
    }

    /// Partial trace attached to the error, if any
    pub fn trace(&self) -> Option<&ExecutionTrace> {
        match self {
            AbodeError::IterationLimit { trace, .. } | AbodeError::Workflow { trace, .. } => {
                Some(&**trace)
            }
            _ => None,
        }
    }

    /// The innermost cause, looking through workflow wrappers
    pub fn root_cause(&self) -> &AbodeError {
        match self {
            AbodeError::Workflow { cause, .. } => cause.root_cause(),
            other => other,
        }
    }
}

/// Configuration errors, all raised before the runtime starts serving
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Cannot read {path}: {message}")]
    Io { path: String, message: String },

    #[error("TOML parse error: {0}")]
    Parse(String),

    #[error("TOML serialization error: {0}")]
    Serialize(String),

    #[error("Duplicate {kind} name: {name}")]
    Duplicate { kind: String, name: String },

    #[error("Agent '{agent}' references unknown tool '{tool}'")]
    UnknownTool { agent: String, tool: String },

    #[error("Workflow '{workflow}' step '{step}' references unknown agent '{agent}'")]
    UnknownAgent {
        workflow: String,
        step: String,
        agent: String,
    },

    #[error("Workflow '{workflow}' step '{step}' depends on unknown step '{dependency}'")]
    UnknownStep {
        workflow: String,
        step: String,
        dependency: String,
    },

    #[error("Workflow '{workflow}' has a dependency cycle through step '{step}'")]
    Cycle { workflow: String, step: String },

    #[error("Workflow '{workflow}' step '{step}' has an invalid input binding for '{field}': {message}")]
    InvalidBinding {
        workflow: String,
        step: String,
        field: String,
        message: String,
    },

    #[error("Workflow '{0}' has no steps")]
    EmptyWorkflow(String),

    #[error("{field} is out of range: {message}")]
    OutOfRange { field: String, message: String },

    #[error("Tool '{tool}' is bound to unregistered implementation '{implementation}'")]
    UnregisteredImplementation { tool: String, implementation: String },

    #[error("Tool '{tool}' requires the {variable} environment variable, which is not set")]
    MissingSecret { tool: String, variable: String },

    #[error("Invalid CA bundle: {0}")]
    Certificate(String),
}

/// Workflow input mapping errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MappingError {
    #[error("workflow '{workflow}' step '{step}' is missing required field '{field}' (expected at {path})")]
    MissingField {
        workflow: String,
        step: String,
        field: String,
        path: String,
    },

    #[error("workflow '{workflow}' expects an object payload, got {found}")]
    InvalidPayload { workflow: String, found: String },
}

impl MappingError {
    pub fn field(&self) -> Option<&str> {
        match self {
            MappingError::MissingField { field, .. } => Some(field),
            MappingError::InvalidPayload { .. } => None,
        }
    }
}

/// Errors raised by tool implementations
///
/// Recoverable errors are fed back to the agent loop as observations; fatal
/// errors abort the run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("{tool}: {message}")]
    Recoverable { tool: String, message: String },

    #[error("{tool} (fatal): {message}")]
    Fatal { tool: String, message: String },
}

impl ToolError {
    pub fn recoverable(tool: impl Into<String>, message: impl Into<String>) -> Self {
        ToolError::Recoverable {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn fatal(tool: impl Into<String>, message: impl Into<String>) -> Self {
        ToolError::Fatal {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(self, ToolError::Recoverable { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            ToolError::Recoverable { message, .. } | ToolError::Fatal { message, .. } => message,
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

impl From<toml::ser::Error> for ConfigError {
    fn from(err: toml::ser::Error) -> Self {
        ConfigError::Serialize(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_cause_unwraps_workflow() {
        let err = AbodeError::Workflow {
            workflow: "w".into(),
            step: "s".into(),
            step_index: 1,
            cause: Box::new(AbodeError::Tool(ToolError::fatal("web_search", "denied"))),
            trace: Box::default(),
        };
        assert_eq!(err.kind(), "workflow_error");
        assert_eq!(err.root_cause().kind(), "tool_error");
        assert!(err.trace().is_some());
    }

    #[test]
    fn test_messages_carry_context() {
        let err = AbodeError::from(MappingError::MissingField {
            workflow: "customer_onboarding".into(),
            step: "collect".into(),
            field: "budget".into(),
            path: "input.budget".into(),
        });
        let text = err.to_string();
        assert!(text.contains("customer_onboarding"));
        assert!(text.contains("collect"));
        assert!(text.contains("budget"));
    }
}
