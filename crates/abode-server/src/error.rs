//! HTTP error responses

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Map, Value};
use thiserror::Error;

use abode_core::error::{AbodeError, MappingError, ToolError};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Runtime(#[from] AbodeError),

    #[error("request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("bad request: {0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Runtime(err) => status_for(err),
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Runtime(err) => err.kind(),
            ApiError::Timeout(_) => "timeout",
            ApiError::BadRequest(_) => "bad_request",
        }
    }

    /// `{ "error": { kind, message, ...context, trace? } }`
    pub fn body(&self) -> Value {
        let mut error = match self {
            ApiError::Runtime(err) => describe(err),
            ApiError::Timeout(timeout) => {
                let mut map = Map::new();
                map.insert("timeout_secs".into(), json!(timeout.as_secs()));
                map
            }
            ApiError::BadRequest(_) => Map::new(),
        };
        error.insert("kind".into(), json!(self.kind()));
        error.insert("message".into(), json!(self.to_string()));

        if let ApiError::Runtime(err) = self {
            if let Some(trace) = err.trace() {
                error.insert("trace".into(), json!(trace));
            }
        }

        json!({ "error": error })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(status = %status, kind = self.kind(), "{}", self);
        } else {
            tracing::debug!(status = %status, kind = self.kind(), "{}", self);
        }
        (status, Json(self.body())).into_response()
    }
}

/// Workflow failures take the status of the step's underlying cause
pub fn status_for(err: &AbodeError) -> StatusCode {
    match err.root_cause() {
        AbodeError::NotFound { .. } => StatusCode::NOT_FOUND,
        AbodeError::Mapping(_) => StatusCode::BAD_REQUEST,
        AbodeError::IterationLimit { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        AbodeError::Tool(ToolError::Fatal { .. }) => StatusCode::BAD_GATEWAY,
        AbodeError::Cancelled => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Context fields of an error, without kind, message or trace
fn describe(err: &AbodeError) -> Map<String, Value> {
    let mut map = Map::new();
    match err {
        AbodeError::NotFound { kind, name } => {
            map.insert("entity".into(), json!(kind.to_string()));
            map.insert("name".into(), json!(name));
        }
        AbodeError::IterationLimit {
            agent,
            max_iterations,
            ..
        } => {
            map.insert("agent".into(), json!(agent));
            map.insert("max_iterations".into(), json!(max_iterations));
        }
        AbodeError::Mapping(MappingError::MissingField {
            workflow,
            step,
            field,
            path,
        }) => {
            map.insert("workflow".into(), json!(workflow));
            map.insert("step".into(), json!(step));
            map.insert("field".into(), json!(field));
            map.insert("path".into(), json!(path));
        }
        AbodeError::Mapping(MappingError::InvalidPayload { workflow, .. }) => {
            map.insert("workflow".into(), json!(workflow));
        }
        AbodeError::Tool(tool_err) => {
            let (ToolError::Recoverable { tool, .. } | ToolError::Fatal { tool, .. }) = tool_err;
            map.insert("tool".into(), json!(tool));
            map.insert("recoverable".into(), json!(tool_err.is_recoverable()));
        }
        AbodeError::Workflow {
            workflow,
            step,
            step_index,
            cause,
            ..
        } => {
            let mut cause_map = describe(cause);
            cause_map.insert("kind".into(), json!(cause.kind()));
            cause_map.insert("message".into(), json!(cause.to_string()));
            map.insert("workflow".into(), json!(workflow));
            map.insert("step".into(), json!(step));
            map.insert("step_index".into(), json!(step_index));
            map.insert("cause".into(), Value::Object(cause_map));
        }
        AbodeError::Reasoner { agent, .. } => {
            map.insert("agent".into(), json!(agent));
        }
        AbodeError::Config(_) | AbodeError::Cancelled => {}
    }
    map
}
