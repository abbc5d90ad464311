use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use abode_core::config::{AgentConfig, RuntimeConfig, StepConfig, ToolConfig, WorkflowConfig};
use abode_core::error::ToolError;
use abode_core::runtime::Runtime;
use abode_core::tool::builtin::{self, BuiltinSettings};
use abode_core::tool::{Tool, ToolCatalog, ToolContext};
use abode_server::{create_router, AppState};

fn real_estate_app() -> Router {
    let catalog = builtin::catalog(&BuiltinSettings::default()).unwrap();
    let runtime = Runtime::builder(RuntimeConfig::real_estate().unwrap())
        .catalog(catalog)
        .build()
        .unwrap();
    create_router(Arc::new(AppState::new(runtime)))
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let resp = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    read(resp).await
}

async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    read(resp).await
}

async fn post_raw(app: &Router, uri: &str, content_type: Option<&str>, body: &str) -> (StatusCode, Value) {
    let mut request = Request::builder().method("POST").uri(uri);
    if let Some(content_type) = content_type {
        request = request.header("content-type", content_type);
    }
    let resp = app
        .clone()
        .oneshot(request.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap();
    read(resp).await
}

async fn read(resp: axum::response::Response) -> (StatusCode, Value) {
    let status = resp.status();
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, value)
}

fn onboarding_payload() -> Value {
    json!({
        "customer_name": "张伟",
        "phone": "13800138000",
        "budget": "300-500万",
        "preferred_location": "上海浦东新区"
    })
}

#[tokio::test]
async fn health_reports_loaded_definitions() {
    let app = real_estate_app();
    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["agents"], 4);
    assert_eq!(body["tools"], 5);
    assert_eq!(body["workflows"], 2);
}

#[tokio::test]
async fn generate_runs_an_agent() {
    let app = real_estate_app();
    let (status, body) = post(
        &app,
        "/generate",
        json!({"agent": "property_researcher", "input": "分析上海浦东新区500万预算的购房选择"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["agent"], "property_researcher");
    assert!(body["iterations"].as_u64().unwrap() <= 6);
    let properties = body["output"]["results"]["search_properties"]["properties"]
        .as_array()
        .unwrap();
    assert!(!properties.is_empty());
    assert!(body["trace"].as_array().unwrap().len() > 1);
    assert!(body["request_id"].is_string());
}

#[tokio::test]
async fn generate_unknown_agent_is_404() {
    let app = real_estate_app();
    let (status, body) = post(&app, "/generate", json!({"agent": "ghost", "input": "hi"})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["kind"], "not_found");
    assert_eq!(body["error"]["entity"], "agent");
    assert_eq!(body["error"]["name"], "ghost");
}

#[tokio::test]
async fn generate_without_agent_is_400() {
    let app = real_estate_app();
    let (status, body) = post(&app, "/generate", json!({"input": "hi"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], "bad_request");
}

#[tokio::test]
async fn workflow_accepts_wrapped_and_bare_payloads() {
    let app = real_estate_app();

    let (status, wrapped) = post(
        &app,
        "/workflow/customer_onboarding",
        json!({"payload": onboarding_payload()}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(wrapped["workflow"], "customer_onboarding");
    assert_eq!(wrapped["steps"].as_array().unwrap().len(), 4);
    assert_eq!(
        wrapped["outputs"]["summarize"]["results"]["recommend_properties"]["top_recommendation"]
            ["property_id"],
        "P006"
    );

    let (status, bare) = post(&app, "/workflow/customer_onboarding", onboarding_payload()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bare["outputs"], wrapped["outputs"]);
}

#[tokio::test]
async fn workflow_missing_budget_is_400_naming_the_field() {
    let app = real_estate_app();
    let mut payload = onboarding_payload();
    payload.as_object_mut().unwrap().remove("budget");

    let (status, body) = post(&app, "/workflow/customer_onboarding", json!({"payload": payload})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], "mapping_error");
    assert_eq!(body["error"]["field"], "budget");
    assert_eq!(body["error"]["step"], "collect");
}

#[tokio::test]
async fn workflow_mapping_failure_after_first_step_carries_step_and_trace() {
    let app = real_estate_app();
    let mut payload = onboarding_payload();
    payload["preferred_location"] = json!("");

    let (status, body) = post(&app, "/workflow/customer_onboarding", payload).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], "workflow_error");
    assert_eq!(body["error"]["step"], "market");
    assert_eq!(body["error"]["step_index"], 2);
    assert_eq!(body["error"]["cause"]["kind"], "mapping_error");
    assert_eq!(body["error"]["cause"]["field"], "area");
    assert!(body["error"]["trace"].is_array());
}

#[tokio::test]
async fn workflow_body_without_json_content_type_is_rejected() {
    let app = real_estate_app();
    let payload = onboarding_payload().to_string();

    let (status, body) = post_raw(&app, "/workflow/customer_onboarding", None, &payload).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], "bad_request");

    let (status, body) =
        post_raw(&app, "/workflow/customer_onboarding", Some("text/plain"), &payload).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], "bad_request");
}

#[tokio::test]
async fn workflow_empty_body_runs_with_empty_payload() {
    let app = real_estate_app();

    // Accepted as an empty payload, so the failure comes from input mapping.
    let (status, body) = post_raw(&app, "/workflow/customer_onboarding", None, "").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], "mapping_error");
    assert_eq!(body["error"]["step"], "collect");
}

#[tokio::test]
async fn unknown_workflow_is_404() {
    let app = real_estate_app();
    let (status, body) = post(&app, "/workflow/nope", json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["entity"], "workflow");
}

#[tokio::test]
async fn definitions_are_listed() {
    let app = real_estate_app();

    let (status, agents) = get(&app, "/agents").await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<_> = agents
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["name"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        vec!["market_analyst", "matching_advisor", "property_researcher", "requirement_analyst"]
    );

    let (status, agent) = get(&app, "/agents/market_analyst").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(agent["tools"], json!(["analyze_market"]));

    let (status, _) = get(&app, "/agents/ghost").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, tools) = get(&app, "/tools").await;
    assert_eq!(status, StatusCode::OK);
    let search = tools
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t["name"] == "web_search")
        .unwrap();
    assert_eq!(search["used_by"], json!([]));

    let (status, workflows) = get(&app, "/workflows").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(workflows.as_array().unwrap().len(), 2);

    let (status, _) = get(&app, "/nowhere").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn metrics_and_status_count_runs() {
    let app = real_estate_app();

    post(&app, "/workflow/customer_onboarding", onboarding_payload()).await;
    post(&app, "/workflow/customer_onboarding", json!({"phone": "1"})).await;
    post(&app, "/generate", json!({"agent": "market_analyst", "input": {"area": "浦东新区"}})).await;

    let (status, metrics) = get(&app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(metrics["workflow"]["runs"], 2);
    assert_eq!(metrics["workflows"]["customer_onboarding"]["successes"], 1);
    assert_eq!(metrics["workflows"]["customer_onboarding"]["failures"], 1);
    assert_eq!(metrics["workflows"]["property_search"]["runs"], 0);
    assert_eq!(metrics["agents"]["market_analyst"]["runs"], 1);

    let (status, body) = get(&app, "/workflows/status").await;
    assert_eq!(status, StatusCode::OK);
    let onboarding = body["workflows"]
        .as_array()
        .unwrap()
        .iter()
        .find(|w| w["name"] == "customer_onboarding")
        .unwrap();
    assert_eq!(onboarding["mode"], "graph");
    assert_eq!(onboarding["steps"][0], "collect");
    assert_eq!(onboarding["terminal_steps"], json!(["summarize"]));
    assert_eq!(onboarding["stats"]["last_outcome"], "failed");
}

/// Waits far longer than any test timeout, remembering its cancellation token
#[derive(Default)]
struct Stall {
    token: Mutex<Option<CancellationToken>>,
}

#[async_trait]
impl Tool for Stall {
    fn name(&self) -> &str {
        "stall"
    }

    fn description(&self) -> &str {
        "Never finishes in time"
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn invoke(&self, _input: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        *self.token.lock().unwrap() = Some(ctx.cancellation.clone());
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(json!({}))
    }
}

struct Denied;

#[async_trait]
impl Tool for Denied {
    fn name(&self) -> &str {
        "denied"
    }

    fn description(&self) -> &str {
        "Always fails fatally"
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn invoke(&self, _input: Value, _ctx: &ToolContext) -> Result<Value, ToolError> {
        Err(ToolError::fatal("denied", "credentials rejected"))
    }
}

fn custom_app(stall: Arc<Stall>, timeout: Duration) -> Router {
    let mut config = RuntimeConfig::new();
    config.tools.push(ToolConfig::new("stall"));
    config.tools.push(ToolConfig::new("denied"));
    config.agents.push(AgentConfig::new("sleeper").with_tools(["stall"]));
    config.agents.push(AgentConfig::new("locked_out").with_tools(["denied"]));
    config.workflows.push(WorkflowConfig {
        name: "gated".into(),
        description: String::new(),
        steps: vec![
            StepConfig::new("first", "sleeper").after(Vec::<String>::new()),
            StepConfig::new("second", "locked_out"),
        ],
    });

    let catalog = ToolCatalog::new().with(stall).with(Arc::new(Denied));
    let runtime = Runtime::builder(config).catalog(catalog).build().unwrap();
    create_router(Arc::new(AppState::new(runtime).with_request_timeout(timeout)))
}

#[tokio::test]
async fn timeout_is_504_and_cancels_the_request() {
    let stall = Arc::new(Stall::default());
    let app = custom_app(Arc::clone(&stall), Duration::from_millis(100));

    let started = Instant::now();
    let (status, body) = post(&app, "/generate", json!({"agent": "sleeper", "input": {}})).await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["error"]["kind"], "timeout");
    assert!(started.elapsed() < Duration::from_secs(10));

    let token = stall.token.lock().unwrap().clone().unwrap();
    assert!(token.is_cancelled());
}

#[tokio::test]
async fn fatal_tool_failure_is_502() {
    let app = custom_app(Arc::new(Stall::default()), Duration::from_secs(30));

    let (status, body) = post(&app, "/generate", json!({"agent": "locked_out", "input": {}})).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["tool"], "denied");
    assert_eq!(body["error"]["recoverable"], false);
}

#[tokio::test]
async fn failed_step_aborts_its_siblings() {
    let stall = Arc::new(Stall::default());
    let app = custom_app(Arc::clone(&stall), Duration::from_secs(30));

    let started = Instant::now();
    let (status, body) = post(&app, "/workflow/gated", json!({})).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(body["error"]["kind"], "workflow_error");
    assert_eq!(body["error"]["step"], "second");
    assert_eq!(body["error"]["step_index"], 1);
    assert_eq!(body["error"]["cause"]["kind"], "tool_error");
    assert!(body["error"]["trace"].as_array().is_some());
}
