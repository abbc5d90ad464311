//! Workflow definitions
//!
//! A workflow is linear when no step declares `depends_on`: each step then
//! runs after the one declared before it. Otherwise the steps form a
//! dependency graph and steps without `depends_on` are roots. Either way the
//! graph is checked and a topological order computed once, at load time.

use std::collections::{BTreeMap, HashMap};

use petgraph::algo::{has_path_connecting, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;

use super::mapping::SourcePath;
use crate::agent::AgentRegistry;
use crate::config::{InputBinding, StepConfig, WorkflowConfig};
use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowMode {
    Linear,
    Graph,
}

/// One input binding of a step, with its parsed source path
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepInput {
    pub field: String,
    pub binding: InputBinding,
    #[serde(skip)]
    pub source: SourcePath,
}

impl StepInput {
    pub fn new(field: impl Into<String>, binding: InputBinding) -> Result<Self, String> {
        let source = SourcePath::parse(binding.source())?;
        Ok(Self {
            field: field.into(),
            binding,
            source,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepDefinition {
    pub id: String,
    pub agent: String,
    /// `depends_on` as written in the configuration
    #[serde(skip)]
    pub declared_depends_on: Option<Vec<String>>,
    /// Effective dependencies, including the implicit predecessor of linear steps
    pub depends_on: Vec<String>,
    pub inputs: Vec<StepInput>,
}

/// A loaded, validated workflow
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowDefinition {
    pub name: String,
    pub description: String,
    pub mode: WorkflowMode,
    pub steps: Vec<StepDefinition>,
    /// Step indices in execution order
    #[serde(skip)]
    order: Vec<usize>,
    /// Indices of steps nothing depends on
    #[serde(skip)]
    terminals: Vec<usize>,
}

impl WorkflowDefinition {
    /// Build and validate a workflow against the loaded agents
    pub fn from_config(config: &WorkflowConfig, agents: &AgentRegistry) -> Result<Self, ConfigError> {
        if config.steps.is_empty() {
            return Err(ConfigError::EmptyWorkflow(config.name.clone()));
        }

        let mut index: HashMap<&str, usize> = HashMap::new();
        for (i, step) in config.steps.iter().enumerate() {
            if index.insert(step.id.as_str(), i).is_some() {
                return Err(ConfigError::Duplicate {
                    kind: "step".to_string(),
                    name: format!("{}.{}", config.name, step.id),
                });
            }
            if !agents.contains(&step.agent) {
                return Err(ConfigError::UnknownAgent {
                    workflow: config.name.clone(),
                    step: step.id.clone(),
                    agent: step.agent.clone(),
                });
            }
        }

        let mode = if config.steps.iter().any(|s| s.depends_on.is_some()) {
            WorkflowMode::Graph
        } else {
            WorkflowMode::Linear
        };

        let mut graph: DiGraph<usize, ()> = DiGraph::new();
        let nodes: Vec<NodeIndex> = (0..config.steps.len()).map(|i| graph.add_node(i)).collect();
        let mut depends_on: Vec<Vec<String>> = Vec::with_capacity(config.steps.len());

        for (i, step) in config.steps.iter().enumerate() {
            let deps: Vec<String> = match mode {
                WorkflowMode::Linear if i > 0 => vec![config.steps[i - 1].id.clone()],
                WorkflowMode::Linear => Vec::new(),
                WorkflowMode::Graph => dedup(step.depends_on.clone().unwrap_or_default()),
            };
            for dep in &deps {
                let &d = index.get(dep.as_str()).ok_or_else(|| ConfigError::UnknownStep {
                    workflow: config.name.clone(),
                    step: step.id.clone(),
                    dependency: dep.clone(),
                })?;
                graph.add_edge(nodes[d], nodes[i], ());
            }
            depends_on.push(deps);
        }

        let sorted = toposort(&graph, None).map_err(|cycle| ConfigError::Cycle {
            workflow: config.name.clone(),
            step: config.steps[graph[cycle.node_id()]].id.clone(),
        })?;

        // Depth-major, then declared order: stable and still topological.
        let mut depth = vec![0usize; config.steps.len()];
        for node in &sorted {
            let i = graph[*node];
            for dep in &depends_on[i] {
                depth[i] = depth[i].max(depth[index[dep.as_str()]] + 1);
            }
        }
        let mut order: Vec<usize> = (0..config.steps.len()).collect();
        order.sort_by_key(|&i| (depth[i], i));

        let mut steps = Vec::with_capacity(config.steps.len());
        for (i, (step, deps)) in config.steps.iter().zip(depends_on).enumerate() {
            let inputs = step_inputs(config, step, |upstream| {
                index
                    .get(upstream)
                    .is_some_and(|&u| u != i && has_path_connecting(&graph, nodes[u], nodes[i], None))
            })?;
            steps.push(StepDefinition {
                id: step.id.clone(),
                agent: step.agent.clone(),
                declared_depends_on: step.depends_on.clone(),
                depends_on: deps,
                inputs,
            });
        }

        let terminals = (0..steps.len())
            .filter(|&i| graph.neighbors(nodes[i]).next().is_none())
            .collect();

        Ok(Self {
            name: config.name.clone(),
            description: config.description.clone(),
            mode,
            steps,
            order,
            terminals,
        })
    }

    /// Steps in execution order
    pub fn ordered_steps(&self) -> impl Iterator<Item = (usize, &StepDefinition)> {
        self.order.iter().map(move |&i| (i, &self.steps[i]))
    }

    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Steps whose outputs form the workflow result
    pub fn terminal_steps(&self) -> impl Iterator<Item = &StepDefinition> {
        self.terminals.iter().map(move |&i| &self.steps[i])
    }

    pub fn step_index(&self, id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id == id)
    }

    /// Distinct agents used, in declared order
    pub fn agents(&self) -> Vec<&str> {
        let mut agents: Vec<&str> = Vec::new();
        for step in &self.steps {
            if !agents.contains(&step.agent.as_str()) {
                agents.push(&step.agent);
            }
        }
        agents
    }
}

fn dedup(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

fn step_inputs(
    config: &WorkflowConfig,
    step: &StepConfig,
    is_ancestor: impl Fn(&str) -> bool,
) -> Result<Vec<StepInput>, ConfigError> {
    let invalid = |field: &str, message: String| ConfigError::InvalidBinding {
        workflow: config.name.clone(),
        step: step.id.clone(),
        field: field.to_string(),
        message,
    };

    let mut inputs = Vec::with_capacity(step.inputs.len());
    for (field, binding) in &step.inputs {
        let input = StepInput::new(field.clone(), binding.clone()).map_err(|m| invalid(field, m))?;
        if let Some(upstream) = input.source.step() {
            if !is_ancestor(upstream) {
                return Err(invalid(
                    field,
                    format!("step '{}' does not run before '{}'", upstream, step.id),
                ));
            }
        }
        inputs.push(input);
    }
    Ok(inputs)
}

impl From<&WorkflowDefinition> for WorkflowConfig {
    fn from(def: &WorkflowDefinition) -> Self {
        Self {
            name: def.name.clone(),
            description: def.description.clone(),
            steps: def
                .steps
                .iter()
                .map(|s| StepConfig {
                    id: s.id.clone(),
                    agent: s.agent.clone(),
                    depends_on: s.declared_depends_on.clone(),
                    inputs: s
                        .inputs
                        .iter()
                        .map(|i| (i.field.clone(), i.binding.clone()))
                        .collect::<BTreeMap<_, _>>(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AgentConfig, ToolConfig};
    use crate::tool::builtin::{self, BuiltinSettings};
    use crate::tool::ToolRegistry;

    fn agents() -> AgentRegistry {
        let catalog = builtin::catalog(&BuiltinSettings::default()).unwrap();
        let tools = ToolRegistry::from_config(&[ToolConfig::new("analyze_market")], &catalog).unwrap();
        AgentRegistry::from_config(
            &[
                AgentConfig::new("a").with_tools(["analyze_market"]),
                AgentConfig::new("b"),
            ],
            &tools,
        )
        .unwrap()
    }

    fn workflow(steps: Vec<StepConfig>) -> WorkflowConfig {
        WorkflowConfig {
            name: "w".into(),
            description: String::new(),
            steps,
        }
    }

    #[test]
    fn test_linear_chain() {
        let def = WorkflowDefinition::from_config(
            &workflow(vec![
                StepConfig::new("one", "a"),
                StepConfig::new("two", "b"),
                StepConfig::new("three", "a"),
            ]),
            &agents(),
        )
        .unwrap();

        assert_eq!(def.mode, WorkflowMode::Linear);
        assert_eq!(def.order(), &[0, 1, 2]);
        assert_eq!(def.steps[2].depends_on, vec!["two"]);
        let terminals: Vec<_> = def.terminal_steps().map(|s| s.id.as_str()).collect();
        assert_eq!(terminals, vec!["three"]);
    }

    #[test]
    fn test_graph_order_and_terminals() {
        // Declared out of order on purpose.
        let def = WorkflowDefinition::from_config(
            &workflow(vec![
                StepConfig::new("d", "a").after(["b", "c"]),
                StepConfig::new("b", "b").after(["a"]),
                StepConfig::new("a", "a"),
                StepConfig::new("c", "b").after(["a"]),
                StepConfig::new("e", "b"),
            ]),
            &agents(),
        )
        .unwrap();

        assert_eq!(def.mode, WorkflowMode::Graph);
        let ids: Vec<_> = def.ordered_steps().map(|(_, s)| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "e", "b", "c", "d"]);
        let terminals: Vec<_> = def.terminal_steps().map(|s| s.id.as_str()).collect();
        assert_eq!(terminals, vec!["d", "e"]);
    }

    #[test]
    fn test_cycle_is_rejected() {
        let err = WorkflowDefinition::from_config(
            &workflow(vec![
                StepConfig::new("x", "a").after(["y"]),
                StepConfig::new("y", "a").after(["x"]),
            ]),
            &agents(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Cycle { .. }));
    }

    #[test]
    fn test_dangling_references() {
        let err = WorkflowDefinition::from_config(&workflow(vec![StepConfig::new("x", "ghost")]), &agents())
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownAgent { .. }));

        let err = WorkflowDefinition::from_config(
            &workflow(vec![StepConfig::new("x", "a").after(["nope"])]),
            &agents(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownStep { .. }));

        let err = WorkflowDefinition::from_config(&workflow(vec![]), &agents()).unwrap_err();
        assert_eq!(err, ConfigError::EmptyWorkflow("w".into()));
    }

    #[test]
    fn test_binding_must_read_an_ancestor() {
        let err = WorkflowDefinition::from_config(
            &workflow(vec![
                StepConfig::new("x", "a").after(Vec::<String>::new()),
                StepConfig::new("y", "a")
                    .after(Vec::<String>::new())
                    .input("area", InputBinding::path("steps.x.area")),
            ]),
            &agents(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBinding { .. }));

        let ok = WorkflowDefinition::from_config(
            &workflow(vec![
                StepConfig::new("x", "a"),
                StepConfig::new("y", "a").input("area", InputBinding::path("steps.x.area")),
            ]),
            &agents(),
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn test_round_trip_to_config() {
        let config = workflow(vec![
            StepConfig::new("x", "a").after(Vec::<String>::new()),
            StepConfig::new("y", "b")
                .after(["x"])
                .input("area", InputBinding::optional("steps.x.area")),
        ]);
        let def = WorkflowDefinition::from_config(&config, &agents()).unwrap();
        assert_eq!(WorkflowConfig::from(&def), config);
    }
}
