//! Execution traces
//!
//! A trace is the append-only record of a single agent or workflow run:
//! every decision, tool call, observation and step transition, in order.
//! Traces are owned by the request that produced them and are never shared
//! between requests. Workflow runs give each step its own trace and merge it
//! into the run trace once the step has finished.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One recorded entry of a trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    /// Position in the trace, starting at 1
    pub sequence: u64,
    /// When the entry was recorded
    pub timestamp: DateTime<Utc>,
    /// Workflow step that produced the entry, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// What happened
    #[serde(flatten)]
    pub kind: TraceKind,
}

/// The kinds of things a trace records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceKind {
    RunStarted {
        target: String,
        input: Value,
    },
    Decision {
        iteration: u32,
        thought: String,
    },
    ToolCall {
        iteration: u32,
        tool: String,
        input: Value,
    },
    Observation {
        iteration: u32,
        tool: String,
        output: Value,
    },
    ToolFailed {
        iteration: u32,
        tool: String,
        error: String,
        recoverable: bool,
    },
    FinalAnswer {
        iteration: u32,
        output: Value,
    },
    StepStarted {
        step: String,
        agent: String,
    },
    StepCompleted {
        step: String,
        iterations: u32,
    },
    StepFailed {
        step: String,
        error: String,
    },
    RunFailed {
        error: String,
    },
}

impl TraceKind {
    /// Short human-readable description, used in logs
    pub fn description(&self) -> String {
        match self {
            TraceKind::RunStarted { target, .. } => format!("run started for {}", target),
            TraceKind::Decision { iteration, thought } => {
                format!("iteration {}: {}", iteration, thought)
            }
            TraceKind::ToolCall {
                iteration, tool, ..
            } => format!("iteration {}: calling {}", iteration, tool),
            TraceKind::Observation {
                iteration, tool, ..
            } => format!("iteration {}: {} returned", iteration, tool),
            TraceKind::ToolFailed {
                iteration,
                tool,
                error,
                recoverable,
            } => format!(
                "iteration {}: {} failed ({}): {}",
                iteration,
                tool,
                if *recoverable { "recoverable" } else { "fatal" },
                error
            ),
            TraceKind::FinalAnswer { iteration, .. } => {
                format!("iteration {}: final answer", iteration)
            }
            TraceKind::StepStarted { step, agent } => {
                format!("step {} started on agent {}", step, agent)
            }
            TraceKind::StepCompleted { step, iterations } => {
                format!("step {} completed after {} iterations", step, iterations)
            }
            TraceKind::StepFailed { step, error } => format!("step {} failed: {}", step, error),
            TraceKind::RunFailed { error } => format!("run failed: {}", error),
        }
    }
}

/// Append-only record of one execution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionTrace {
    entries: Vec<TraceEntry>,
}

impl ExecutionTrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry and return its sequence number
    pub fn record(&mut self, kind: TraceKind) -> u64 {
        tracing::trace!("{}", kind.description());
        self.push(None, kind, Utc::now())
    }

    /// Append an entry attributed to a workflow step
    pub fn record_scoped(&mut self, scope: &str, kind: TraceKind) -> u64 {
        tracing::trace!(scope, "{}", kind.description());
        self.push(Some(scope.to_string()), kind, Utc::now())
    }

    /// Merge a finished child trace into this one
    ///
    /// Child entries keep their timestamps, are renumbered to follow the
    /// current tail, and are attributed to `scope` unless already scoped.
    pub fn absorb(&mut self, scope: &str, child: ExecutionTrace) {
        for entry in child.entries {
            let entry_scope = entry.scope.or_else(|| Some(scope.to_string()));
            self.push(entry_scope, entry.kind, entry.timestamp);
        }
    }

    fn push(&mut self, scope: Option<String>, kind: TraceKind, timestamp: DateTime<Utc>) -> u64 {
        let sequence = self.entries.len() as u64 + 1;
        self.entries.push(TraceEntry {
            sequence,
            timestamp,
            scope,
            kind,
        });
        sequence
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&TraceEntry> {
        self.entries.last()
    }

    /// Number of tool invocations recorded
    pub fn tool_calls(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.kind, TraceKind::ToolCall { .. }))
            .count()
    }

    /// Entries attributed to a workflow step
    pub fn for_scope<'a>(&'a self, scope: &'a str) -> impl Iterator<Item = &'a TraceEntry> {
        self.entries
            .iter()
            .filter(move |e| e.scope.as_deref() == Some(scope))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sequence_numbers_increase() {
        let mut trace = ExecutionTrace::new();
        assert_eq!(
            trace.record(TraceKind::RunStarted {
                target: "a".into(),
                input: json!("q"),
            }),
            1
        );
        assert_eq!(
            trace.record(TraceKind::Decision {
                iteration: 1,
                thought: "think".into(),
            }),
            2
        );
        assert_eq!(trace.len(), 2);
    }

    #[test]
    fn test_absorb_scopes_and_renumbers() {
        let mut parent = ExecutionTrace::new();
        parent.record_scoped(
            "collect",
            TraceKind::StepStarted {
                step: "collect".into(),
                agent: "analyst".into(),
            },
        );

        let mut child = ExecutionTrace::new();
        child.record(TraceKind::ToolCall {
            iteration: 1,
            tool: "extract_requirements".into(),
            input: json!({}),
        });
        child.record(TraceKind::FinalAnswer {
            iteration: 2,
            output: json!({"ok": true}),
        });

        parent.absorb("collect", child);
        assert_eq!(parent.len(), 3);
        assert_eq!(parent.entries()[2].sequence, 3);
        assert_eq!(parent.for_scope("collect").count(), 3);
        assert_eq!(parent.tool_calls(), 1);
    }

    #[test]
    fn test_entry_serializes_flat() {
        let mut trace = ExecutionTrace::new();
        trace.record(TraceKind::ToolFailed {
            iteration: 2,
            tool: "web_search".into(),
            error: "timeout".into(),
            recoverable: true,
        });

        let value = serde_json::to_value(&trace).unwrap();
        let entry = &value[0];
        assert_eq!(entry["kind"], "tool_failed");
        assert_eq!(entry["tool"], "web_search");
        assert_eq!(entry["sequence"], 1);
        assert!(entry.get("scope").is_none());
    }

    #[test]
    fn test_description_summarizes_entry() {
        let failed = TraceKind::ToolFailed {
            iteration: 2,
            tool: "web_search".into(),
            error: "timeout".into(),
            recoverable: true,
        };
        assert_eq!(failed.description(), "iteration 2: web_search failed (recoverable): timeout");

        let completed = TraceKind::StepCompleted {
            step: "collect".into(),
            iterations: 3,
        };
        assert_eq!(completed.description(), "step collect completed after 3 iterations");
    }
}
