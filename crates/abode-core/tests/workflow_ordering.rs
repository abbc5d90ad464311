//! Step ordering and concurrency, observed through an instrumented tool

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use abode_core::{
    AgentConfig, InputBinding, Runtime, RuntimeConfig, StepConfig, Tool, ToolCatalog, ToolConfig,
    ToolContext, ToolError, WorkflowConfig,
};
use async_trait::async_trait;
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy)]
struct Span {
    start: Instant,
    end: Instant,
}

/// Sleeps briefly and records when each labelled call started and ended
#[derive(Default)]
struct Probe {
    spans: Mutex<Vec<(String, Span)>>,
}

impl Probe {
    fn span(&self, label: &str) -> Span {
        self.spans
            .lock()
            .unwrap()
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, s)| *s)
            .unwrap_or_else(|| panic!("{} never ran", label))
    }
}

#[async_trait]
impl Tool for Probe {
    fn name(&self) -> &str {
        "probe"
    }

    fn description(&self) -> &str {
        "Records its start and end instants"
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {"label": {"type": "string"}}, "required": ["label"]})
    }

    async fn invoke(&self, input: Value, _ctx: &ToolContext) -> Result<Value, ToolError> {
        let label = input["label"].as_str().unwrap_or_default().to_string();
        let start = Instant::now();
        tokio::time::sleep(Duration::from_millis(60)).await;
        let end = Instant::now();
        self.spans
            .lock()
            .unwrap()
            .push((label.clone(), Span { start, end }));
        Ok(json!({ "label": label }))
    }
}

fn step(id: &str, after: &[&str]) -> StepConfig {
    StepConfig::new(id, "prober")
        .after(after.iter().copied())
        .input("label", InputBinding::path(format!("input.{}", id)))
}

fn runtime(probe: Arc<Probe>, max_parallel_steps: usize) -> Runtime {
    let mut config = RuntimeConfig::new();
    config.runtime.max_parallel_steps = max_parallel_steps;
    config.tools.push(ToolConfig::new("probe"));
    config
        .agents
        .push(AgentConfig::new("prober").with_tools(["probe"]));
    config.workflows.push(WorkflowConfig {
        name: "diamond".into(),
        description: "a -> (b, c) -> d".into(),
        steps: vec![
            step("d", &["b", "c"]),
            step("b", &["a"]),
            step("c", &["a"]),
            step("a", &[]),
        ],
    });

    Runtime::builder(config)
        .catalog(ToolCatalog::new().with(probe))
        .build()
        .unwrap()
}

fn payload() -> Value {
    json!({"a": "a", "b": "b", "c": "c", "d": "d"})
}

#[tokio::test]
async fn dependencies_finish_before_dependents_start() {
    let probe = Arc::new(Probe::default());
    let runtime = runtime(Arc::clone(&probe), 4);

    let out = runtime.engine().run("diamond", payload()).await.unwrap();
    assert_eq!(out.outputs.len(), 1);
    assert_eq!(out.outputs["d"]["results"]["probe"]["label"], "d");

    let (a, b, c, d) = (probe.span("a"), probe.span("b"), probe.span("c"), probe.span("d"));
    assert!(b.start >= a.end);
    assert!(c.start >= a.end);
    assert!(d.start >= b.end);
    assert!(d.start >= c.end);

    // b and c are independent and overlap.
    assert!(b.start < c.end && c.start < b.end);
}

#[tokio::test]
async fn parallelism_limit_of_one_serializes_independent_steps() {
    let probe = Arc::new(Probe::default());
    let runtime = runtime(Arc::clone(&probe), 1);

    runtime.engine().run("diamond", payload()).await.unwrap();

    let (b, c) = (probe.span("b"), probe.span("c"));
    // Declared order breaks the tie: b before c.
    assert!(c.start >= b.end);
}
