//! Step and run outcomes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::action::Action;
use super::scenario::Scenario;

/// Free-form evaluator details
pub type Details = serde_json::Map<String, serde_json::Value>;

/// Why a scenario run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// Placeholder held while the control loop is still running
    Pending,
    Done,
    MaxSteps,
    Timeout,
    Error,
}

impl TerminationReason {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TerminationReason::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::Pending => "pending",
            TerminationReason::Done => "done",
            TerminationReason::MaxSteps => "max_steps",
            TerminationReason::Timeout => "timeout",
            TerminationReason::Error => "error",
        }
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The outcome of a single decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_index: usize,
    pub action: Action,
    #[serde(default)]
    pub reasoning: String,
    pub latency_ms: f64,
    pub cost_usd: f64,
}

/// Score produced by one evaluator invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalScore {
    pub name: String,
    pub score: f64,
    pub passed: bool,
    #[serde(default)]
    pub details: Details,
}

impl EvalScore {
    pub fn new(name: impl Into<String>, score: f64, passed: bool) -> Self {
        Self {
            name: name.into(),
            score,
            passed,
            details: Details::new(),
        }
    }

    /// Add a detail entry
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Split into the stored record, keeping the name
    pub fn into_record(self) -> (String, EvalRecord) {
        (
            self.name,
            EvalRecord {
                score: self.score,
                passed: self.passed,
                details: self.details,
            },
        )
    }
}

/// Evaluator outcome as stored in [`RunResult::eval_scores`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalRecord {
    pub score: f64,
    pub passed: bool,
    #[serde(default)]
    pub details: Details,
}

/// Complete result of running a scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: Uuid,
    pub scenario: Scenario,
    pub steps: Vec<StepResult>,
    pub termination_reason: TerminationReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub eval_scores: BTreeMap<String, EvalRecord>,
    pub total_latency_ms: f64,
    pub total_cost_usd: f64,
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration of the control loop and cleanup
    pub duration_ms: f64,
}

impl RunResult {
    /// Fresh result for a run that has not started its loop yet
    pub fn new(scenario: Scenario) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            scenario,
            steps: Vec::new(),
            termination_reason: TerminationReason::Pending,
            error: None,
            eval_scores: BTreeMap::new(),
            total_latency_ms: 0.0,
            total_cost_usd: 0.0,
            started_at: Utc::now(),
            duration_ms: 0.0,
        }
    }

    /// Ordered actions taken so far
    pub fn actions(&self) -> Vec<Action> {
        self.steps.iter().map(|s| s.action.clone()).collect()
    }

    /// Whether the run passed.
    ///
    /// Without evaluator scores a run passes only when the policy signalled done;
    /// otherwise every recorded score must pass.
    pub fn passed(&self) -> bool {
        if self.eval_scores.is_empty() {
            return self.termination_reason == TerminationReason::Done;
        }
        self.eval_scores.values().all(|s| s.passed)
    }

    /// Append a step and fold its latency and cost into the totals
    pub(crate) fn record_step(&mut self, step: StepResult) {
        self.total_latency_ms += step.latency_ms;
        self.total_cost_usd += step.cost_usd;
        self.steps.push(step);
    }

    /// Set the termination reason once; `Error` always overrides
    pub(crate) fn terminate(&mut self, reason: TerminationReason) {
        if !self.termination_reason.is_terminal() || reason == TerminationReason::Error {
            self.termination_reason = reason;
        }
    }

    /// Record a control-loop failure
    pub(crate) fn fail(&mut self, message: impl Into<String>) {
        self.terminate(TerminationReason::Error);
        self.error = Some(message.into());
    }

    pub(crate) fn record_score(&mut self, score: EvalScore) {
        let (name, record) = score.into_record();
        self.eval_scores.insert(name, record);
    }
}
