//! Runtime assembly
//!
//! A [`Runtime`] is the read-only bundle the server shares across requests:
//! the three registries, the agent executor and the workflow engine. It is
//! built once from a [`RuntimeConfig`] and a [`ToolCatalog`], and every load
//! time check happens here.

use std::sync::Arc;

use crate::agent::{AgentExecutor, AgentRegistry, PlannedReasoner, Reasoner};
use crate::config::{AgentConfig, RuntimeConfig, RuntimeSettings, ToolConfig, WorkflowConfig};
use crate::error::ConfigError;
use crate::tool::{ToolCatalog, ToolRegistry};
use crate::workflow::{WorkflowEngine, WorkflowRegistry};

#[derive(Debug, Clone)]
pub struct Runtime {
    settings: RuntimeSettings,
    tools: Arc<ToolRegistry>,
    agents: Arc<AgentRegistry>,
    workflows: Arc<WorkflowRegistry>,
    executor: AgentExecutor,
    engine: WorkflowEngine,
}

impl Runtime {
    pub fn builder(config: RuntimeConfig) -> RuntimeBuilder {
        RuntimeBuilder::new(config)
    }

    pub fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn agents(&self) -> &AgentRegistry {
        &self.agents
    }

    pub fn workflows(&self) -> &WorkflowRegistry {
        &self.workflows
    }

    pub fn executor(&self) -> &AgentExecutor {
        &self.executor
    }

    pub fn engine(&self) -> &WorkflowEngine {
        &self.engine
    }

    /// Configuration describing the loaded registries
    ///
    /// Loading the result again yields identical registries.
    pub fn to_config(&self) -> RuntimeConfig {
        let tools = self
            .tools
            .definitions()
            .into_iter()
            .map(|def| {
                let tool = self.tools.get(&def.name).map(|t| t.tool.description().to_string());
                ToolConfig {
                    name: def.name.clone(),
                    implementation: (def.implementation != def.name).then(|| def.implementation.clone()),
                    description: (tool.as_deref() != Some(def.description.as_str()))
                        .then(|| def.description.clone()),
                }
            })
            .collect();

        RuntimeConfig {
            runtime: self.settings.clone(),
            tools,
            agents: self.agents.sorted().into_iter().map(AgentConfig::from).collect(),
            workflows: self
                .workflows
                .sorted()
                .into_iter()
                .map(WorkflowConfig::from)
                .collect(),
        }
    }
}

/// Builds a [`Runtime`], validating the configuration as it goes
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    catalog: ToolCatalog,
    reasoner: Arc<dyn Reasoner>,
}

impl RuntimeBuilder {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            catalog: ToolCatalog::new(),
            reasoner: Arc::new(PlannedReasoner::new()),
        }
    }

    /// Implementations the configuration may bind tools to
    pub fn catalog(mut self, catalog: ToolCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn reasoner(mut self, reasoner: Arc<dyn Reasoner>) -> Self {
        self.reasoner = reasoner;
        self
    }

    pub fn build(self) -> Result<Runtime, ConfigError> {
        self.config.validate()?;

        let tools = ToolRegistry::from_config(&self.config.tools, &self.catalog)?;
        let agents = AgentRegistry::from_config(&self.config.agents, &tools)?;

        // Only tools some agent can actually reach need their secrets.
        for name in agents.referenced_tools() {
            if let Some(registered) = tools.get(name) {
                if let Some(variable) = registered.tool.missing_secret() {
                    return Err(ConfigError::MissingSecret {
                        tool: name.to_string(),
                        variable: variable.to_string(),
                    });
                }
            }
        }

        let workflows = WorkflowRegistry::from_config(&self.config.workflows, &agents)?;

        let tools = Arc::new(tools);
        let agents = Arc::new(agents);
        let workflows = Arc::new(workflows);
        let executor = AgentExecutor::new(Arc::clone(&agents), Arc::clone(&tools), self.reasoner);
        let engine = WorkflowEngine::new(
            Arc::clone(&workflows),
            executor.clone(),
            self.config.runtime.max_parallel_steps,
        );

        tracing::info!(
            tools = tools.count(),
            agents = agents.count(),
            workflows = workflows.count(),
            "runtime loaded"
        );

        Ok(Runtime {
            settings: self.config.runtime,
            tools,
            agents,
            workflows,
            executor,
            engine,
        })
    }
}
