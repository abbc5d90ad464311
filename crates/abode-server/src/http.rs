//! HTTP endpoint handlers

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use abode_core::agent::{AgentDefinition, ExecutionRequest};
use abode_core::error::{AbodeError, EntityKind};
use abode_core::tool::ToolDefinition;
use abode_core::workflow::WorkflowMode;

use crate::error::ApiError;
use crate::metrics::{MetricsSnapshot, RunStats};
use crate::AppState;

// ============================================================================
// Execution Endpoints
// ============================================================================

/// Request to run a single agent
#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub agent: String,
    #[serde(default)]
    pub input: Value,
}

/// Run an agent
pub async fn generate(
    State(state): State<Arc<AppState>>,
    body: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let started = Instant::now();
    let execution = ExecutionRequest::new(request.agent.clone(), request.input);
    let request_id = execution.request_id;
    tracing::debug!(%request_id, agent = %request.agent, "generate");

    let result = with_deadline(&state, &execution.cancellation, async {
        state.runtime.executor().execute(&execution).await
    })
    .await;
    state
        .metrics
        .record_generate(&request.agent, result.is_ok(), started.elapsed());

    let output = result?;
    Ok(Json(json!({
        "request_id": request_id,
        "agent": output.agent,
        "output": output.output,
        "iterations": output.iterations,
        "trace": output.trace,
    })))
}

/// Run a workflow
///
/// The body is either `{ "payload": {...} }` or the payload object itself.
/// An empty body runs the workflow with an empty payload; any other body
/// must be declared as JSON.
pub async fn run_workflow(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let payload = workflow_payload(&headers, &body)?;

    let started = Instant::now();
    let execution = ExecutionRequest::new(name.clone(), payload);
    let request_id = execution.request_id;
    tracing::debug!(%request_id, workflow = %name, "run workflow");

    let result = with_deadline(&state, &execution.cancellation, async {
        state.runtime.engine().execute(&execution).await
    })
    .await;
    state
        .metrics
        .record_workflow(&name, result.is_ok(), started.elapsed());

    let output = result?;
    let mut body = output.to_value();
    body["request_id"] = json!(request_id);
    body["trace"] = json!(output.trace);
    Ok(Json(body))
}

fn workflow_payload(headers: &HeaderMap, body: &[u8]) -> Result<Value, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    if !has_json_content_type(headers) {
        return Err(ApiError::BadRequest(
            "Expected request with `Content-Type: application/json`".into(),
        ));
    }
    let body: Value = serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("Failed to parse the request body as JSON: {}", e)))?;
    Ok(unwrap_payload(body))
}

fn has_json_content_type(headers: &HeaderMap) -> bool {
    let Some(value) = headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let mime = value.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    mime == "application/json" || (mime.starts_with("application/") && mime.ends_with("+json"))
}

/// `{ "payload": x }` with no other keys is unwrapped to `x`
pub fn unwrap_payload(body: Value) -> Value {
    match body {
        Value::Object(mut map) if map.len() == 1 && map.contains_key("payload") => {
            map.remove("payload").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Run `work` under the request timeout
///
/// The token is cancelled when the deadline passes or when this future is
/// dropped before finishing, e.g. on client disconnect.
async fn with_deadline<T, F>(
    state: &AppState,
    cancellation: &CancellationToken,
    work: F,
) -> Result<T, ApiError>
where
    F: Future<Output = abode_core::Result<T>>,
{
    let guard = cancellation.clone().drop_guard();
    let result = match tokio::time::timeout(state.request_timeout, work).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(_) => {
            cancellation.cancel();
            Err(ApiError::Timeout(state.request_timeout))
        }
    };
    guard.disarm();
    result
}

// ============================================================================
// Introspection Endpoints
// ============================================================================

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub agents: usize,
    pub tools: usize,
    pub workflows: usize,
}

/// Get server health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: abode_core::version(),
        uptime_secs: state.metrics.uptime().as_secs(),
        agents: state.runtime.agents().count(),
        tools: state.runtime.tools().count(),
        workflows: state.runtime.workflows().count(),
    })
}

/// Get request and run counters
pub async fn get_metrics(State(state): State<Arc<AppState>>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

/// Status of one workflow
#[derive(Debug, Serialize)]
pub struct WorkflowStatus {
    pub name: String,
    pub mode: WorkflowMode,
    pub steps: Vec<String>,
    pub terminal_steps: Vec<String>,
    pub stats: Option<RunStats>,
}

/// Get the status of every loaded workflow
pub async fn workflow_status(State(state): State<Arc<AppState>>) -> Json<Value> {
    let workflows: Vec<WorkflowStatus> = state
        .runtime
        .workflows()
        .sorted()
        .into_iter()
        .map(|workflow| WorkflowStatus {
            name: workflow.name.clone(),
            mode: workflow.mode,
            steps: workflow
                .ordered_steps()
                .map(|(_, step)| step.id.clone())
                .collect(),
            terminal_steps: workflow.terminal_steps().map(|s| s.id.clone()).collect(),
            stats: state.metrics.workflow_stats(&workflow.name),
        })
        .collect();

    Json(json!({
        "max_parallel_steps": state.runtime.engine().max_parallel_steps(),
        "workflows": workflows,
    }))
}

// ============================================================================
// Definition Endpoints
// ============================================================================

/// List loaded agents
pub async fn list_agents(State(state): State<Arc<AppState>>) -> Json<Vec<AgentDefinition>> {
    Json(
        state
            .runtime
            .agents()
            .sorted()
            .into_iter()
            .cloned()
            .collect(),
    )
}

/// Get a specific agent
pub async fn get_agent(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<AgentDefinition>, ApiError> {
    state
        .runtime
        .agents()
        .get(&name)
        .cloned()
        .map(Json)
        .ok_or_else(|| AbodeError::not_found(EntityKind::Agent, name).into())
}

/// Tool listing entry
#[derive(Debug, Serialize)]
pub struct ToolSummary {
    #[serde(flatten)]
    pub definition: ToolDefinition,
    /// Agents allowed to call the tool
    pub used_by: Vec<String>,
}

/// List loaded tools
pub async fn list_tools(State(state): State<Arc<AppState>>) -> Json<Vec<ToolSummary>> {
    let agents = state.runtime.agents().sorted();
    let tools = state
        .runtime
        .tools()
        .definitions()
        .into_iter()
        .map(|definition| ToolSummary {
            used_by: agents
                .iter()
                .filter(|agent| agent.allows_tool(&definition.name))
                .map(|agent| agent.name.clone())
                .collect(),
            definition: definition.clone(),
        })
        .collect();
    Json(tools)
}

/// List loaded workflows
pub async fn list_workflows(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!(state.runtime.workflows().sorted()))
}

/// Fallback for unknown routes
pub async fn not_found() -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": { "kind": "not_found", "message": "no such endpoint" }
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwrap_payload() {
        assert_eq!(
            unwrap_payload(json!({"payload": {"budget": "500万"}})),
            json!({"budget": "500万"})
        );
        assert_eq!(
            unwrap_payload(json!({"budget": "500万"})),
            json!({"budget": "500万"})
        );
        // A payload field next to other fields is ordinary data
        assert_eq!(
            unwrap_payload(json!({"payload": 1, "phone": "1"})),
            json!({"payload": 1, "phone": "1"})
        );
    }

    #[test]
    fn test_workflow_payload_requires_json_content_type() {
        let mut headers = HeaderMap::new();
        assert_eq!(workflow_payload(&headers, b"").unwrap(), Value::Null);
        assert_eq!(workflow_payload(&headers, b"  \n").unwrap(), Value::Null);
        assert!(matches!(
            workflow_payload(&headers, br#"{"budget": "5000000"}"#),
            Err(ApiError::BadRequest(_))
        ));

        headers.insert(header::CONTENT_TYPE, "application/json; charset=utf-8".parse().unwrap());
        assert_eq!(
            workflow_payload(&headers, br#"{"payload": {"budget": "5000000"}}"#).unwrap(),
            json!({"budget": "5000000"})
        );
        assert!(matches!(
            workflow_payload(&headers, b"{not json"),
            Err(ApiError::BadRequest(_))
        ));

        headers.insert(header::CONTENT_TYPE, "text/plain".parse().unwrap());
        assert!(matches!(
            workflow_payload(&headers, br#"{"budget": "5000000"}"#),
            Err(ApiError::BadRequest(_))
        ));
    }
}
