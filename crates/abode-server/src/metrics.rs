//! Request and run counters
//!
//! The per-agent and per-workflow counter maps are built once from the
//! loaded runtime and never change shape afterwards, so recording is a few
//! relaxed atomic updates and needs no lock.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicU8, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

use abode_core::runtime::Runtime;

const NEVER: u8 = 0;
const SUCCEEDED: u8 = 1;
const FAILED: u8 = 2;

/// Counters for one kind of run
#[derive(Debug, Default)]
pub struct RunCounters {
    runs: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    total_millis: AtomicU64,
    last_run_millis: AtomicI64,
    last_outcome: AtomicU8,
}

impl RunCounters {
    pub fn record(&self, succeeded: bool, elapsed: Duration, at: DateTime<Utc>) {
        self.runs.fetch_add(1, Ordering::Relaxed);
        if succeeded {
            self.successes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
        let millis = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self.total_millis.fetch_add(millis, Ordering::Relaxed);
        self.last_run_millis.store(at.timestamp_millis(), Ordering::Relaxed);
        self.last_outcome
            .store(if succeeded { SUCCEEDED } else { FAILED }, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RunStats {
        let runs = self.runs.load(Ordering::Relaxed);
        let total_millis = self.total_millis.load(Ordering::Relaxed);
        let last_outcome = match self.last_outcome.load(Ordering::Relaxed) {
            SUCCEEDED => Some("succeeded"),
            FAILED => Some("failed"),
            _ => None,
        };
        let last_run_at = match last_outcome {
            Some(_) => Utc
                .timestamp_millis_opt(self.last_run_millis.load(Ordering::Relaxed))
                .single(),
            None => None,
        };

        RunStats {
            runs,
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            average_duration_ms: if runs == 0 {
                0.0
            } else {
                total_millis as f64 / runs as f64
            },
            last_run_at,
            last_outcome,
        }
    }
}

/// Point-in-time view of a [`RunCounters`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStats {
    pub runs: u64,
    pub successes: u64,
    pub failures: u64,
    pub average_duration_ms: f64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_outcome: Option<&'static str>,
}

/// Server-wide metrics
#[derive(Debug)]
pub struct Metrics {
    started_at: DateTime<Utc>,
    generate: RunCounters,
    workflow: RunCounters,
    agents: HashMap<String, RunCounters>,
    workflows: HashMap<String, RunCounters>,
}

impl Metrics {
    pub fn new<'a>(
        agents: impl IntoIterator<Item = &'a str>,
        workflows: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        Self {
            started_at: Utc::now(),
            generate: RunCounters::default(),
            workflow: RunCounters::default(),
            agents: agents
                .into_iter()
                .map(|name| (name.to_string(), RunCounters::default()))
                .collect(),
            workflows: workflows
                .into_iter()
                .map(|name| (name.to_string(), RunCounters::default()))
                .collect(),
        }
    }

    pub fn for_runtime(runtime: &Runtime) -> Self {
        Self::new(
            runtime.agents().all().map(|a| a.name.as_str()),
            runtime.workflows().names(),
        )
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn uptime(&self) -> Duration {
        (Utc::now() - self.started_at).to_std().unwrap_or_default()
    }

    /// Record a `/generate` request; unknown agents only count toward the total
    pub fn record_generate(&self, agent: &str, succeeded: bool, elapsed: Duration) {
        let now = Utc::now();
        self.generate.record(succeeded, elapsed, now);
        if let Some(counters) = self.agents.get(agent) {
            counters.record(succeeded, elapsed, now);
        }
    }

    /// Record a `/workflow/{name}` request
    pub fn record_workflow(&self, workflow: &str, succeeded: bool, elapsed: Duration) {
        let now = Utc::now();
        self.workflow.record(succeeded, elapsed, now);
        if let Some(counters) = self.workflows.get(workflow) {
            counters.record(succeeded, elapsed, now);
        }
    }

    pub fn workflow_stats(&self, workflow: &str) -> Option<RunStats> {
        self.workflows.get(workflow).map(RunCounters::snapshot)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            started_at: self.started_at,
            uptime_secs: self.uptime().as_secs(),
            generate: self.generate.snapshot(),
            workflow: self.workflow.snapshot(),
            agents: self
                .agents
                .iter()
                .map(|(name, counters)| (name.clone(), counters.snapshot()))
                .collect(),
            workflows: self
                .workflows
                .iter()
                .map(|(name, counters)| (name.clone(), counters.snapshot()))
                .collect(),
        }
    }
}

/// Body of `GET /metrics`
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
    pub generate: RunStats,
    pub workflow: RunStats,
    pub agents: BTreeMap<String, RunStats>,
    pub workflows: BTreeMap<String, RunStats>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_known_and_unknown_targets() {
        let metrics = Metrics::new(["property_researcher"], ["customer_onboarding"]);

        metrics.record_generate("property_researcher", true, Duration::from_millis(10));
        metrics.record_generate("ghost", false, Duration::from_millis(2));
        metrics.record_workflow("customer_onboarding", false, Duration::from_millis(30));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.generate.runs, 2);
        assert_eq!(snapshot.generate.failures, 1);
        assert_eq!(snapshot.agents["property_researcher"].successes, 1);
        assert!(!snapshot.agents.contains_key("ghost"));
        assert_eq!(snapshot.workflows["customer_onboarding"].last_outcome, Some("failed"));
        assert_eq!(snapshot.workflow.average_duration_ms, 30.0);
    }

    #[test]
    fn test_idle_counters() {
        let stats = RunCounters::default().snapshot();
        assert_eq!(stats.runs, 0);
        assert_eq!(stats.average_duration_ms, 0.0);
        assert!(stats.last_run_at.is_none());
        assert!(stats.last_outcome.is_none());
    }
}
