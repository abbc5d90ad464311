//! Workflow registry

use std::collections::HashMap;

use super::WorkflowDefinition;
use crate::agent::AgentRegistry;
use crate::config::WorkflowConfig;
use crate::error::ConfigError;

/// Registry of loaded workflows, read-only once built
#[derive(Debug, Default, Clone, PartialEq)]
pub struct WorkflowRegistry {
    workflows: HashMap<String, WorkflowDefinition>,
}

impl WorkflowRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Load workflows, checking step agents and dependencies
    pub fn from_config(configs: &[WorkflowConfig], agents: &AgentRegistry) -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        for config in configs {
            registry.register(WorkflowDefinition::from_config(config, agents)?)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, workflow: WorkflowDefinition) -> Result<(), ConfigError> {
        if self.workflows.contains_key(&workflow.name) {
            return Err(ConfigError::Duplicate {
                kind: "workflow".to_string(),
                name: workflow.name,
            });
        }
        self.workflows.insert(workflow.name.clone(), workflow);
        Ok(())
    }

    /// Get a workflow by name
    pub fn get(&self, name: &str) -> Option<&WorkflowDefinition> {
        self.workflows.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.workflows.contains_key(name)
    }

    /// All workflows sorted by name
    pub fn sorted(&self) -> Vec<&WorkflowDefinition> {
        let mut workflows: Vec<_> = self.workflows.values().collect();
        workflows.sort_by(|a, b| a.name.cmp(&b.name));
        workflows
    }

    pub fn names(&self) -> Vec<&str> {
        self.sorted().into_iter().map(|w| w.name.as_str()).collect()
    }

    pub fn count(&self) -> usize {
        self.workflows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AgentConfig, StepConfig};
    use crate::tool::ToolRegistry;

    #[test]
    fn test_duplicate_workflow() {
        let agents = AgentRegistry::from_config(&[AgentConfig::new("a")], &ToolRegistry::new()).unwrap();
        let config = WorkflowConfig {
            name: "w".into(),
            description: String::new(),
            steps: vec![StepConfig::new("s", "a")],
        };
        let err = WorkflowRegistry::from_config(&[config.clone(), config.clone()], &agents).unwrap_err();
        assert!(matches!(err, ConfigError::Duplicate { .. }));

        let registry = WorkflowRegistry::from_config(&[config], &agents).unwrap();
        assert_eq!(registry.names(), vec!["w"]);
        assert!(registry.contains("w"));
    }
}
