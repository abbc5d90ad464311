//! Agent registry

use std::collections::HashMap;

use super::AgentDefinition;
use crate::config::AgentConfig;
use crate::error::ConfigError;
use crate::tool::ToolRegistry;

/// Registry of loaded agents, read-only once built
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AgentRegistry {
    agents: HashMap<String, AgentDefinition>,
}

impl AgentRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Load agents, checking every tool reference against `tools`
    pub fn from_config(configs: &[AgentConfig], tools: &ToolRegistry) -> Result<Self, ConfigError> {
        let mut registry = Self::new();

        for config in configs {
            let definition = AgentDefinition::from(config);
            if let Some(missing) = definition.tools.iter().find(|t| !tools.contains(t)) {
                return Err(ConfigError::UnknownTool {
                    agent: definition.name.clone(),
                    tool: missing.clone(),
                });
            }
            registry.register(definition)?;
        }

        Ok(registry)
    }

    /// Register an agent
    pub fn register(&mut self, definition: AgentDefinition) -> Result<(), ConfigError> {
        if self.agents.contains_key(&definition.name) {
            return Err(ConfigError::Duplicate {
                kind: "agent".to_string(),
                name: definition.name,
            });
        }
        self.agents.insert(definition.name.clone(), definition);
        Ok(())
    }

    /// Get an agent by name
    pub fn get(&self, name: &str) -> Option<&AgentDefinition> {
        self.agents.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    /// Get all agents
    pub fn all(&self) -> impl Iterator<Item = &AgentDefinition> {
        self.agents.values()
    }

    /// All agents sorted by name
    pub fn sorted(&self) -> Vec<&AgentDefinition> {
        let mut agents: Vec<_> = self.agents.values().collect();
        agents.sort_by(|a, b| a.name.cmp(&b.name));
        agents
    }

    /// Names of every tool some agent may call
    pub fn referenced_tools(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .agents
            .values()
            .flat_map(|a| a.tools.iter().map(String::as_str))
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    /// Get the number of registered agents
    pub fn count(&self) -> usize {
        self.agents.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolConfig;
    use crate::tool::builtin::{self, BuiltinSettings};

    fn tools() -> ToolRegistry {
        let catalog = builtin::catalog(&BuiltinSettings::default()).unwrap();
        ToolRegistry::from_config(
            &[
                ToolConfig::new("extract_requirements"),
                ToolConfig::new("search_properties"),
            ],
            &catalog,
        )
        .unwrap()
    }

    #[test]
    fn test_register_and_lookup() {
        let configs = vec![
            AgentConfig::new("analyst").with_tools(["extract_requirements"]),
            AgentConfig::new("researcher").with_tools(["extract_requirements", "search_properties"]),
        ];
        let registry = AgentRegistry::from_config(&configs, &tools()).unwrap();

        assert_eq!(registry.count(), 2);
        assert!(registry.contains("analyst"));
        assert_eq!(registry.get("researcher").unwrap().tools.len(), 2);
        assert!(registry.get("nobody").is_none());
        assert_eq!(
            registry.referenced_tools(),
            vec!["extract_requirements", "search_properties"]
        );
    }

    #[test]
    fn test_dangling_tool_reference_fails() {
        let configs = vec![AgentConfig::new("analyst").with_tools(["analyze_market"])];
        let err = AgentRegistry::from_config(&configs, &tools()).unwrap_err();
        assert_eq!(
            err,
            ConfigError::UnknownTool {
                agent: "analyst".into(),
                tool: "analyze_market".into()
            }
        );
    }

    #[test]
    fn test_duplicate_agent_fails() {
        let configs = vec![AgentConfig::new("a"), AgentConfig::new("a")];
        let err = AgentRegistry::from_config(&configs, &tools()).unwrap_err();
        assert!(matches!(err, ConfigError::Duplicate { .. }));
    }
}
