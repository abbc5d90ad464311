//! Agent executor: the bounded reasoning loop

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::reasoner::{Decision, Observation, Outcome, Reasoner, ReasoningContext};
use super::{AgentDefinition, AgentRegistry};
use crate::error::{AbodeError, EntityKind, Result, ToolError};
use crate::tool::{schema, ToolContext, ToolRegistry};
use crate::trace::{ExecutionTrace, TraceKind};

/// A single request for work, agent or workflow
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub request_id: Uuid,
    /// Agent or workflow name
    pub target: String,
    pub payload: Value,
    pub cancellation: CancellationToken,
}

impl ExecutionRequest {
    pub fn new(target: impl Into<String>, payload: Value) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            target: target.into(),
            payload,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn with_request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = request_id;
        self
    }
}

/// Result of a successful agent run
#[derive(Debug, Clone, Serialize)]
pub struct AgentOutput {
    pub agent: String,
    pub output: Value,
    /// Iterations used, including the one that produced the answer
    pub iterations: u32,
    pub trace: ExecutionTrace,
}

/// Runs agents against the shared registries
#[derive(Clone)]
pub struct AgentExecutor {
    agents: Arc<AgentRegistry>,
    tools: Arc<ToolRegistry>,
    reasoner: Arc<dyn Reasoner>,
}

impl std::fmt::Debug for AgentExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentExecutor")
            .field("agents", &self.agents.count())
            .field("tools", &self.tools.count())
            .finish()
    }
}

impl AgentExecutor {
    pub fn new(agents: Arc<AgentRegistry>, tools: Arc<ToolRegistry>, reasoner: Arc<dyn Reasoner>) -> Self {
        Self {
            agents,
            tools,
            reasoner,
        }
    }

    pub fn agents(&self) -> &AgentRegistry {
        &self.agents
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Run an agent with a fresh, uncancellable request
    pub async fn run(&self, agent: &str, input: Value) -> Result<AgentOutput> {
        self.execute(&ExecutionRequest::new(agent, input)).await
    }

    /// Run the agent named by `request.target`
    pub async fn execute(&self, request: &ExecutionRequest) -> Result<AgentOutput> {
        let agent = self
            .agents
            .get(&request.target)
            .ok_or_else(|| AbodeError::not_found(EntityKind::Agent, &request.target))?;

        let mut trace = ExecutionTrace::new();
        trace.record(TraceKind::RunStarted {
            target: agent.name.clone(),
            input: request.payload.clone(),
        });

        match self.run_loop(agent, request, &mut trace).await {
            Ok((output, iterations)) => Ok(AgentOutput {
                agent: agent.name.clone(),
                output,
                iterations,
                trace,
            }),
            Err(err) => {
                trace.record(TraceKind::RunFailed {
                    error: err.to_string(),
                });
                tracing::warn!(agent = %agent.name, request_id = %request.request_id, error = %err, "agent run failed");
                match err {
                    AbodeError::IterationLimit {
                        agent,
                        max_iterations,
                        ..
                    } => Err(AbodeError::IterationLimit {
                        agent,
                        max_iterations,
                        trace: Box::new(trace),
                    }),
                    other => Err(other),
                }
            }
        }
    }

    async fn run_loop(
        &self,
        agent: &AgentDefinition,
        request: &ExecutionRequest,
        trace: &mut ExecutionTrace,
    ) -> Result<(Value, u32)> {
        let mut observations: Vec<Observation> = Vec::new();

        for iteration in 1..=agent.max_iterations {
            if request.cancellation.is_cancelled() {
                return Err(AbodeError::Cancelled);
            }

            let ctx = ReasoningContext {
                agent,
                input: &request.payload,
                observations: &observations,
                iteration,
                tools: &self.tools,
            };
            let decision = self.reasoner.decide(&ctx).await?;

            if agent.verbose {
                tracing::info!(agent = %agent.name, iteration, thought = decision.thought(), "decision");
            } else {
                tracing::debug!(agent = %agent.name, iteration, thought = decision.thought(), "decision");
            }
            trace.record(TraceKind::Decision {
                iteration,
                thought: decision.thought().to_string(),
            });

            match decision {
                Decision::Finish { output, .. } => {
                    trace.record(TraceKind::FinalAnswer {
                        iteration,
                        output: output.clone(),
                    });
                    return Ok((output, iteration));
                }
                Decision::CallTool { tool, input, .. } => {
                    let observation = self
                        .call_tool(agent, &tool, input, iteration, request, trace)
                        .await?;
                    observations.push(observation);
                }
            }
        }

        Err(AbodeError::IterationLimit {
            agent: agent.name.clone(),
            max_iterations: agent.max_iterations,
            trace: Box::default(),
        })
    }

    /// Invoke one tool; recoverable failures come back as observations
    async fn call_tool(
        &self,
        agent: &AgentDefinition,
        tool: &str,
        input: Value,
        iteration: u32,
        request: &ExecutionRequest,
        trace: &mut ExecutionTrace,
    ) -> Result<Observation> {
        trace.record(TraceKind::ToolCall {
            iteration,
            tool: tool.to_string(),
            input: input.clone(),
        });

        let outcome = match self.checked_invoke(agent, tool, input, iteration, request).await {
            Ok(output) => {
                trace.record(TraceKind::Observation {
                    iteration,
                    tool: tool.to_string(),
                    output: output.clone(),
                });
                Outcome::Output(output)
            }
            Err(err) => {
                let recoverable = err.is_recoverable();
                trace.record(TraceKind::ToolFailed {
                    iteration,
                    tool: tool.to_string(),
                    error: err.message().to_string(),
                    recoverable,
                });
                if !recoverable {
                    if request.cancellation.is_cancelled() {
                        return Err(AbodeError::Cancelled);
                    }
                    return Err(err.into());
                }
                tracing::debug!(agent = %agent.name, tool, error = %err, "recoverable tool failure");
                Outcome::Failed(err.message().to_string())
            }
        };

        Ok(Observation {
            iteration,
            tool: tool.to_string(),
            outcome,
        })
    }

    async fn checked_invoke(
        &self,
        agent: &AgentDefinition,
        tool: &str,
        input: Value,
        iteration: u32,
        request: &ExecutionRequest,
    ) -> std::result::Result<Value, ToolError> {
        if !agent.allows_tool(tool) {
            return Err(ToolError::recoverable(
                tool,
                format!("agent '{}' is not allowed to use this tool", agent.name),
            ));
        }
        let registered = self
            .tools
            .get(tool)
            .ok_or_else(|| ToolError::recoverable(tool, "no such tool"))?;

        schema::validate_input(&registered.definition.input_schema, &input)
            .map_err(|message| ToolError::recoverable(tool, message))?;

        let ctx = ToolContext::new(request.request_id, agent.name.clone(), request.cancellation.clone())
            .at_iteration(iteration);

        tokio::select! {
            biased;
            _ = request.cancellation.cancelled() => {
                Err(ToolError::fatal(tool, "cancelled"))
            }
            result = registered.tool.invoke(input, &ctx) => result,
        }
    }
}
