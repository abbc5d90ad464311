//! Runtime configuration for abode-core
//!
//! A configuration file declares the tools, agents and workflows a runtime
//! serves. Files are TOML:
//!
//! ```toml
//! [runtime]
//! max_parallel_steps = 4
//!
//! [[tools]]
//! name = "search_properties"
//!
//! [[agents]]
//! name = "property_researcher"
//! tools = ["extract_requirements", "search_properties"]
//! max_iterations = 6
//! temperature = 0.3
//!
//! [[workflows]]
//! name = "customer_onboarding"
//!
//! [[workflows.steps]]
//! id = "collect"
//! agent = "requirement_analyst"
//!
//! [workflows.steps.inputs]
//! budget = "input.budget"
//! notes = { from = "input.notes", required = false }
//! ```
//!
//! Cross references (agents to tools, steps to agents and to each other) are
//! checked when the registries are built, not here.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigError;

/// Bundled real-estate configuration
pub const REAL_ESTATE_TOML: &str = include_str!("../config/real_estate.toml");

/// Full configuration document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub runtime: RuntimeSettings,
    #[serde(default)]
    pub tools: Vec<ToolConfig>,
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
    #[serde(default)]
    pub workflows: Vec<WorkflowConfig>,
}

/// Engine-wide settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeSettings {
    /// Upper bound on workflow steps running at once
    #[serde(default = "default_max_parallel_steps")]
    pub max_parallel_steps: usize,
}

fn default_max_parallel_steps() -> usize {
    4
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            max_parallel_steps: default_max_parallel_steps(),
        }
    }
}

/// A named tool bound to a registered implementation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolConfig {
    pub name: String,
    /// Implementation name; defaults to `name`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implementation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ToolConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            implementation: None,
            description: None,
        }
    }

    pub fn implementation_name(&self) -> &str {
        self.implementation.as_deref().unwrap_or(&self.name)
    }
}

/// Agent declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default = "default_max_tool_retries")]
    pub max_tool_retries: u32,
}

fn default_max_iterations() -> u32 {
    10
}
fn default_temperature() -> f64 {
    0.7
}
fn default_max_tool_retries() -> u32 {
    1
}

impl AgentConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            system_prompt: String::new(),
            tools: Vec::new(),
            max_iterations: default_max_iterations(),
            temperature: default_temperature(),
            verbose: false,
            max_tool_retries: default_max_tool_retries(),
        }
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}

/// Workflow declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub steps: Vec<StepConfig>,
}

/// One workflow step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepConfig {
    pub id: String,
    pub agent: String,
    /// Upstream step ids; declaring this on any step makes the workflow a graph
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<Vec<String>>,
    /// Agent input field name to source path
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub inputs: BTreeMap<String, InputBinding>,
}

impl StepConfig {
    pub fn new(id: impl Into<String>, agent: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            agent: agent.into(),
            depends_on: None,
            inputs: BTreeMap::new(),
        }
    }

    pub fn after<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = Some(dependencies.into_iter().map(Into::into).collect());
        self
    }

    pub fn input(mut self, field: impl Into<String>, binding: InputBinding) -> Self {
        self.inputs.insert(field.into(), binding);
        self
    }
}

/// Where a step input field comes from
///
/// Either a bare path (`"input.budget"`, required) or a table with
/// `from`, `required` and `default`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputBinding {
    Path(String),
    Detailed {
        from: String,
        #[serde(default = "default_required")]
        required: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<Value>,
    },
}

fn default_required() -> bool {
    true
}

impl InputBinding {
    pub fn path(path: impl Into<String>) -> Self {
        InputBinding::Path(path.into())
    }

    pub fn optional(path: impl Into<String>) -> Self {
        InputBinding::Detailed {
            from: path.into(),
            required: false,
            default: None,
        }
    }

    pub fn source(&self) -> &str {
        match self {
            InputBinding::Path(path) => path,
            InputBinding::Detailed { from, .. } => from,
        }
    }

    pub fn is_required(&self) -> bool {
        match self {
            InputBinding::Path(_) => true,
            InputBinding::Detailed {
                required, default, ..
            } => *required && default.is_none(),
        }
    }

    pub fn default_value(&self) -> Option<&Value> {
        match self {
            InputBinding::Path(_) => None,
            InputBinding::Detailed { default, .. } => default.as_ref(),
        }
    }
}

impl RuntimeConfig {
    /// Create a new empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// The bundled real-estate configuration
    pub fn real_estate() -> Result<Self, ConfigError> {
        Self::from_toml(REAL_ESTATE_TOML)
    }

    /// Validate value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.runtime.max_parallel_steps == 0 {
            return Err(ConfigError::OutOfRange {
                field: "runtime.max_parallel_steps".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        for agent in &self.agents {
            if agent.name.trim().is_empty() {
                return Err(ConfigError::OutOfRange {
                    field: "agents.name".to_string(),
                    message: "must not be empty".to_string(),
                });
            }
            if !(1..=100).contains(&agent.max_iterations) {
                return Err(ConfigError::OutOfRange {
                    field: format!("agents.{}.max_iterations", agent.name),
                    message: format!("{} is not between 1 and 100", agent.max_iterations),
                });
            }
            if !(0.0..=1.0).contains(&agent.temperature) {
                return Err(ConfigError::OutOfRange {
                    field: format!("agents.{}.temperature", agent.name),
                    message: format!("{} is not between 0.0 and 1.0", agent.temperature),
                });
            }
            if agent.max_tool_retries > 5 {
                return Err(ConfigError::OutOfRange {
                    field: format!("agents.{}.max_tool_retries", agent.name),
                    message: format!("{} is more than 5", agent.max_tool_retries),
                });
            }
        }

        for tool in &self.tools {
            if tool.name.trim().is_empty() {
                return Err(ConfigError::OutOfRange {
                    field: "tools.name".to_string(),
                    message: "must not be empty".to_string(),
                });
            }
        }

        Ok(())
    }
}
