//! Agent definitions

use serde::{Deserialize, Serialize};

use crate::config::AgentConfig;

/// A loaded agent: identity, allowed tools and loop limits
///
/// Pure data; the executor interprets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub name: String,
    pub description: String,
    pub system_prompt: String,
    /// Tools the agent may call, in preference order
    pub tools: Vec<String>,
    pub max_iterations: u32,
    pub temperature: f64,
    pub verbose: bool,
    /// Retries of a recoverable tool failure before the tool is given up
    pub max_tool_retries: u32,
}

impl AgentDefinition {
    pub fn allows_tool(&self, tool: &str) -> bool {
        self.tools.iter().any(|t| t == tool)
    }
}

impl From<&AgentConfig> for AgentDefinition {
    fn from(config: &AgentConfig) -> Self {
        // Keep the first occurrence of each tool; the list is an ordered set.
        let mut tools: Vec<String> = Vec::with_capacity(config.tools.len());
        for tool in &config.tools {
            if !tools.contains(tool) {
                tools.push(tool.clone());
            }
        }

        Self {
            name: config.name.clone(),
            description: config.description.clone(),
            system_prompt: config.system_prompt.clone(),
            tools,
            max_iterations: config.max_iterations,
            temperature: config.temperature,
            verbose: config.verbose,
            max_tool_retries: config.max_tool_retries,
        }
    }
}

impl From<&AgentDefinition> for AgentConfig {
    fn from(def: &AgentDefinition) -> Self {
        Self {
            name: def.name.clone(),
            description: def.description.clone(),
            system_prompt: def.system_prompt.clone(),
            tools: def.tools.clone(),
            max_iterations: def.max_iterations,
            temperature: def.temperature,
            verbose: def.verbose,
            max_tool_retries: def.max_tool_retries,
        }
    }
}
