//! Workflow engine
//!
//! Runs the steps of a workflow as agent invocations. A step starts once
//! every step it depends on has completed; independent steps run
//! concurrently, up to `max_parallel_steps` at a time. The first failing
//! step aborts the run and every step still in flight.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::mapping::build_step_input;
use super::WorkflowRegistry;
use crate::agent::{AgentExecutor, ExecutionRequest};
use crate::error::{AbodeError, EntityKind, MappingError, Result};
use crate::trace::{ExecutionTrace, TraceKind};

/// Timing and iteration count of a completed step
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub id: String,
    pub agent: String,
    pub iterations: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Result of a successful workflow run
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowOutput {
    pub workflow: String,
    /// Outputs of the terminal steps, keyed by step id
    pub outputs: Map<String, Value>,
    /// Completed steps, in completion order
    pub steps: Vec<StepReport>,
    pub trace: ExecutionTrace,
}

impl WorkflowOutput {
    /// Response document without the trace
    pub fn to_value(&self) -> Value {
        json!({
            "workflow": self.workflow,
            "outputs": self.outputs,
            "steps": self.steps,
        })
    }
}

/// What a step task hands back to the engine
struct StepRun {
    index: usize,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    trace: ExecutionTrace,
    result: Result<(Value, u32)>,
}

#[derive(Debug, Clone)]
pub struct WorkflowEngine {
    workflows: Arc<WorkflowRegistry>,
    executor: AgentExecutor,
    max_parallel_steps: usize,
}

impl WorkflowEngine {
    pub fn new(workflows: Arc<WorkflowRegistry>, executor: AgentExecutor, max_parallel_steps: usize) -> Self {
        Self {
            workflows,
            executor,
            max_parallel_steps: max_parallel_steps.max(1),
        }
    }

    pub fn workflows(&self) -> &WorkflowRegistry {
        &self.workflows
    }

    pub fn max_parallel_steps(&self) -> usize {
        self.max_parallel_steps
    }

    /// Run a workflow with a fresh, uncancellable request
    pub async fn run(&self, workflow: &str, payload: Value) -> Result<WorkflowOutput> {
        self.execute(&ExecutionRequest::new(workflow, payload)).await
    }

    /// Run the workflow named by `request.target`
    pub async fn execute(&self, request: &ExecutionRequest) -> Result<WorkflowOutput> {
        let workflow = self
            .workflows
            .get(&request.target)
            .ok_or_else(|| AbodeError::not_found(EntityKind::Workflow, &request.target))?;

        let payload = match request.payload {
            Value::Null => Value::Object(Map::new()),
            Value::Object(_) => request.payload.clone(),
            ref other => {
                return Err(MappingError::InvalidPayload {
                    workflow: workflow.name.clone(),
                    found: type_name(other).to_string(),
                }
                .into())
            }
        };

        let mut trace = ExecutionTrace::new();
        trace.record(TraceKind::RunStarted {
            target: workflow.name.clone(),
            input: payload.clone(),
        });
        tracing::info!(workflow = %workflow.name, request_id = %request.request_id, "workflow started");

        // Cancels in-flight steps however this function returns.
        let steps_token = request.cancellation.child_token();
        let _cancel_steps = steps_token.clone().drop_guard();

        let count = workflow.steps.len();
        let mut started = vec![false; count];
        let mut done = vec![false; count];
        let mut outputs: HashMap<String, Value> = HashMap::new();
        let mut reports: Vec<StepReport> = Vec::with_capacity(count);
        let mut running: JoinSet<StepRun> = JoinSet::new();

        loop {
            for (index, step) in workflow.ordered_steps() {
                if running.len() >= self.max_parallel_steps {
                    break;
                }
                let ready = step
                    .depends_on
                    .iter()
                    .all(|dep| workflow.step_index(dep).is_some_and(|i| done[i]));
                if started[index] || !ready {
                    continue;
                }

                let input = match build_step_input(&workflow.name, step, &payload, &outputs) {
                    Ok(input) => input,
                    Err(err) if started.iter().any(|s| *s) => {
                        running.abort_all();
                        tracing::warn!(
                            workflow = %workflow.name,
                            step = %step.id,
                            error = %err,
                            "workflow step input could not be built"
                        );
                        trace.record_scoped(
                            &step.id,
                            TraceKind::StepFailed {
                                step: step.id.clone(),
                                error: err.to_string(),
                            },
                        );
                        trace.record(TraceKind::RunFailed {
                            error: err.to_string(),
                        });
                        return Err(AbodeError::Workflow {
                            workflow: workflow.name.clone(),
                            step: step.id.clone(),
                            step_index: index,
                            cause: Box::new(AbodeError::Mapping(err)),
                            trace: Box::new(trace),
                        });
                    }
                    // Nothing has run yet: the request itself is malformed.
                    Err(err) => return Err(err.into()),
                };
                started[index] = true;
                tracing::debug!(workflow = %workflow.name, step = %step.id, agent = %step.agent, "step launched");
                running.spawn(run_step(
                    self.executor.clone(),
                    index,
                    step.id.clone(),
                    step.agent.clone(),
                    input,
                    request.request_id,
                    steps_token.clone(),
                ));
            }

            if running.is_empty() {
                break;
            }

            let joined = tokio::select! {
                biased;
                _ = request.cancellation.cancelled() => None,
                joined = running.join_next() => joined,
            };
            let run = match joined {
                Some(Ok(run)) => run,
                Some(Err(err)) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
                Some(Err(_)) | None => {
                    trace.record(TraceKind::RunFailed {
                        error: AbodeError::Cancelled.to_string(),
                    });
                    return Err(AbodeError::Cancelled);
                }
            };

            let step = &workflow.steps[run.index];
            trace.absorb(&step.id, run.trace);

            match run.result {
                Ok((output, iterations)) => {
                    done[run.index] = true;
                    outputs.insert(step.id.clone(), output);
                    reports.push(StepReport {
                        id: step.id.clone(),
                        agent: step.agent.clone(),
                        iterations,
                        started_at: run.started_at,
                        finished_at: run.finished_at,
                    });
                }
                Err(cause) => {
                    running.abort_all();
                    tracing::warn!(
                        workflow = %workflow.name,
                        step = %step.id,
                        error = %cause,
                        "workflow step failed"
                    );
                    trace.record(TraceKind::RunFailed {
                        error: cause.to_string(),
                    });
                    return Err(AbodeError::Workflow {
                        workflow: workflow.name.clone(),
                        step: step.id.clone(),
                        step_index: run.index,
                        cause: Box::new(cause),
                        trace: Box::new(trace),
                    });
                }
            }
        }

        let mut terminal_outputs = Map::new();
        for step in workflow.terminal_steps() {
            if let Some(output) = outputs.remove(&step.id) {
                terminal_outputs.insert(step.id.clone(), output);
            }
        }

        tracing::info!(workflow = %workflow.name, steps = reports.len(), "workflow completed");
        Ok(WorkflowOutput {
            workflow: workflow.name.clone(),
            outputs: terminal_outputs,
            steps: reports,
            trace,
        })
    }
}

async fn run_step(
    executor: AgentExecutor,
    index: usize,
    step: String,
    agent: String,
    input: Value,
    request_id: Uuid,
    cancellation: CancellationToken,
) -> StepRun {
    let started_at = Utc::now();
    let mut trace = ExecutionTrace::new();
    trace.record(TraceKind::StepStarted {
        step: step.clone(),
        agent: agent.clone(),
    });

    let request = ExecutionRequest {
        request_id,
        target: agent,
        payload: input,
        cancellation,
    };

    let result = match executor.execute(&request).await {
        Ok(out) => {
            trace.absorb(&step, out.trace);
            trace.record(TraceKind::StepCompleted {
                step: step.clone(),
                iterations: out.iterations,
            });
            Ok((out.output, out.iterations))
        }
        Err(err) => {
            if let Some(partial) = err.trace() {
                trace.absorb(&step, partial.clone());
            }
            trace.record(TraceKind::StepFailed {
                step: step.clone(),
                error: err.to_string(),
            });
            Err(err)
        }
    };

    StepRun {
        index,
        started_at,
        finished_at: Utc::now(),
        trace,
        result,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
