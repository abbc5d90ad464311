//! Tool catalog and registry
//!
//! The [`ToolCatalog`] holds every implementation compiled into the process,
//! registered by reference at startup. The [`ToolRegistry`] holds the tools a
//! configuration actually declares, each bound to a catalog implementation.

use std::collections::HashMap;
use std::sync::Arc;

use super::{Tool, ToolDefinition};
use crate::config::ToolConfig;
use crate::error::ConfigError;

/// Implementations available for configuration to bind to
#[derive(Default, Clone)]
pub struct ToolCatalog {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an implementation under its own name, replacing any previous one
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Builder: register an implementation
    pub fn with(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    pub fn get(&self, implementation: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(implementation)
    }

    /// Registered implementation names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn count(&self) -> usize {
        self.tools.len()
    }
}

impl std::fmt::Debug for ToolCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolCatalog")
            .field("tools", &self.names())
            .finish()
    }
}

/// A configured tool and the implementation behind it
#[derive(Clone)]
pub struct RegisteredTool {
    pub definition: ToolDefinition,
    pub tool: Arc<dyn Tool>,
}

impl std::fmt::Debug for RegisteredTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredTool")
            .field("definition", &self.definition)
            .finish()
    }
}

/// Registry of configured tools, read-only once built
#[derive(Debug, Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
}

impl ToolRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind every configured tool to its catalog implementation
    pub fn from_config(configs: &[ToolConfig], catalog: &ToolCatalog) -> Result<Self, ConfigError> {
        let mut registry = Self::new();

        for config in configs {
            let implementation = config.implementation_name();
            let tool = catalog.get(implementation).ok_or_else(|| {
                ConfigError::UnregisteredImplementation {
                    tool: config.name.clone(),
                    implementation: implementation.to_string(),
                }
            })?;

            let mut definition = ToolDefinition::for_tool(config.name.clone(), tool.as_ref());
            if let Some(ref description) = config.description {
                definition = definition.with_description(description.clone());
            }
            registry.register(definition, Arc::clone(tool))?;
        }

        Ok(registry)
    }

    /// Register a tool under its definition's name
    pub fn register(&mut self, definition: ToolDefinition, tool: Arc<dyn Tool>) -> Result<(), ConfigError> {
        if self.tools.contains_key(&definition.name) {
            return Err(ConfigError::Duplicate {
                kind: "tool".to_string(),
                name: definition.name,
            });
        }

        self.tools
            .insert(definition.name.clone(), RegisteredTool { definition, tool });
        Ok(())
    }

    /// Get a tool by configured name
    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// All definitions, sorted by name
    pub fn definitions(&self) -> Vec<&ToolDefinition> {
        let mut defs: Vec<_> = self.tools.values().map(|t| &t.definition).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Get the number of registered tools
    pub fn count(&self) -> usize {
        self.tools.len()
    }
}
