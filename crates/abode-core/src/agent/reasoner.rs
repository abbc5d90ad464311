//! Reasoners: the decision seam of the agent loop
//!
//! Each iteration the executor shows the reasoner the agent, its input and
//! everything observed so far, and gets back one [`Decision`]: call a tool,
//! or finish with an answer.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Map, Value};

use super::AgentDefinition;
use crate::error::Result;
use crate::tool::{schema, ToolRegistry};

/// What the agent does next
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    CallTool {
        tool: String,
        input: Value,
        thought: String,
    },
    Finish {
        output: Value,
        thought: String,
    },
}

impl Decision {
    pub fn thought(&self) -> &str {
        match self {
            Decision::CallTool { thought, .. } | Decision::Finish { thought, .. } => thought,
        }
    }
}

/// Outcome of a tool call, as the reasoner sees it
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Output(Value),
    /// Recoverable failure message
    Failed(String),
}

/// A tool call and what came back
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub iteration: u32,
    pub tool: String,
    pub outcome: Outcome,
}

impl Observation {
    pub fn output(&self) -> Option<&Value> {
        match self.outcome {
            Outcome::Output(ref value) => Some(value),
            Outcome::Failed(_) => None,
        }
    }
}

/// Everything a reasoner may look at when deciding
#[derive(Debug, Clone, Copy)]
pub struct ReasoningContext<'a> {
    pub agent: &'a AgentDefinition,
    pub input: &'a Value,
    pub observations: &'a [Observation],
    /// Iteration being decided, starting at 1
    pub iteration: u32,
    pub tools: &'a ToolRegistry,
}

#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn decide(&self, ctx: &ReasoningContext<'_>) -> Result<Decision>;
}

/// Deterministic reasoner that runs the agent's tools in declared order
///
/// Arguments are bound by schema property name, preferring the most recent
/// observation, then the agent input, then objects nested one level inside
/// the input. A plain-string input is treated as `{"query": <string>}`.
/// A tool that keeps failing is given up after `max_tool_retries` retries.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlannedReasoner;

impl PlannedReasoner {
    pub fn new() -> Self {
        Self
    }

    fn next_tool<'a>(&self, ctx: &ReasoningContext<'a>) -> Option<&'a str> {
        let attempts_allowed = ctx.agent.max_tool_retries as usize + 1;
        ctx.agent
            .tools
            .iter()
            .map(String::as_str)
            .find(|tool| {
                let mine = ctx.observations.iter().filter(|o| o.tool == *tool);
                let mut failures = 0;
                for obs in mine {
                    match obs.outcome {
                        Outcome::Output(_) => return false,
                        Outcome::Failed(_) => failures += 1,
                    }
                }
                failures < attempts_allowed
            })
    }

    fn finish(&self, ctx: &ReasoningContext<'_>) -> Decision {
        let mut results = Map::new();
        let mut failed = Vec::new();

        for tool in &ctx.agent.tools {
            let output = ctx
                .observations
                .iter()
                .rev()
                .filter(|o| &o.tool == tool)
                .find_map(Observation::output);
            match output {
                Some(value) => {
                    results.insert(tool.clone(), value.clone());
                }
                None if ctx.observations.iter().any(|o| &o.tool == tool) => {
                    failed.push(tool.clone());
                }
                None => {}
            }
        }

        let answer = if ctx.agent.tools.is_empty() {
            format!("{} has no tools; returning the input unchanged", ctx.agent.name)
        } else if failed.is_empty() {
            format!(
                "{} completed {} tool call(s): {}",
                ctx.agent.name,
                results.len(),
                results.keys().cloned().collect::<Vec<_>>().join(", ")
            )
        } else {
            format!(
                "{} completed {} tool call(s); gave up on: {}",
                ctx.agent.name,
                results.len(),
                failed.join(", ")
            )
        };

        let mut output = json!({
            "agent": ctx.agent.name,
            "answer": answer,
            "results": results,
            "failed_tools": failed,
        });
        if ctx.agent.tools.is_empty() {
            output["input"] = ctx.input.clone();
        }

        Decision::Finish {
            thought: "all tools have been tried".to_string(),
            output,
        }
    }
}

/// Candidate argument sources, highest priority first
///
/// Latest observation first, then the input itself, then the input's
/// object-valued fields in alphabetical key order.
fn argument_sources<'a>(input: &'a Map<String, Value>, observations: &'a [Observation]) -> Vec<&'a Map<String, Value>> {
    let mut sources: Vec<&Map<String, Value>> = observations
        .iter()
        .rev()
        .filter_map(Observation::output)
        .filter_map(Value::as_object)
        .collect();
    sources.push(input);
    sources.extend(input.values().filter_map(Value::as_object));
    sources
}

fn input_object(input: &Value) -> Map<String, Value> {
    match input {
        Value::Object(map) => map.clone(),
        Value::String(text) => {
            let mut map = Map::new();
            map.insert("query".to_string(), Value::String(text.clone()));
            map
        }
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("input".to_string(), other.clone());
            map
        }
    }
}

#[async_trait]
impl Reasoner for PlannedReasoner {
    async fn decide(&self, ctx: &ReasoningContext<'_>) -> Result<Decision> {
        let Some(tool) = self.next_tool(ctx) else {
            return Ok(self.finish(ctx));
        };

        let input = input_object(ctx.input);
        let sources = argument_sources(&input, ctx.observations);
        let arguments = match ctx.tools.get(tool) {
            Some(registered) => {
                schema::bind_arguments(&registered.definition.input_schema, sources.iter().copied())
            }
            // Unknown to the registry: the executor reports it back.
            None => Value::Object(input.clone()),
        };

        let retry = ctx.observations.iter().any(|o| o.tool == tool);
        let thought = if retry {
            format!("retrying {} after a recoverable failure", tool)
        } else {
            format!("calling {}", tool)
        };

        Ok(Decision::CallTool {
            tool: tool.to_string(),
            input: arguments,
            thought,
        })
    }
}
