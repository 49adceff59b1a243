//! Aggregate run results across scenarios

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;
use crate::model::{EvalRecord, RunResult, TerminationReason};

/// Per-run summary row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub name: String,
    pub passed: bool,
    pub termination_reason: TerminationReason,
    pub steps: usize,
    pub total_latency_ms: f64,
    pub total_cost_usd: f64,
    pub eval_scores: BTreeMap<String, EvalRecord>,
    #[serde(default)]
    pub error: Option<String>,
}

impl From<&RunResult> for RunSummary {
    fn from(result: &RunResult) -> Self {
        Self {
            name: result.scenario.name.clone(),
            passed: result.passed(),
            termination_reason: result.termination_reason,
            steps: result.steps.len(),
            total_latency_ms: result.total_latency_ms,
            total_cost_usd: result.total_cost_usd,
            eval_scores: result.eval_scores.clone(),
            error: result.error.clone(),
        }
    }
}

/// Results of a suite of runs, in the order they were added
#[derive(Debug, Clone, Default)]
pub struct Report {
    results: Vec<RunResult>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, result: RunResult) {
        self.results.push(result);
    }

    pub fn results(&self) -> &[RunResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// True when every run passed (vacuously true for an empty report)
    pub fn all_passed(&self) -> bool {
        self.results.iter().all(RunResult::passed)
    }

    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.passed()).count()
    }

    pub fn summary(&self) -> Vec<RunSummary> {
        self.results.iter().map(RunSummary::from).collect()
    }

    /// Pretty JSON array of run summaries
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.summary())?)
    }
}

impl Extend<RunResult> for Report {
    fn extend<I: IntoIterator<Item = RunResult>>(&mut self, iter: I) {
        self.results.extend(iter);
    }
}

impl FromIterator<RunResult> for Report {
    fn from_iter<I: IntoIterator<Item = RunResult>>(iter: I) -> Self {
        Self {
            results: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Action, EvalScore, Scenario, StepResult};

    fn result(name: &str, reason: TerminationReason) -> RunResult {
        let scenario = Scenario::builder(name, "prompt").build().unwrap();
        let mut result = RunResult::new(scenario);
        result.record_step(StepResult {
            step_index: 0,
            action: Action::done(),
            reasoning: "finished".to_string(),
            latency_ms: 40.0,
            cost_usd: 0.01,
        });
        result.terminate(reason);
        result
    }

    #[test]
    fn test_empty_report_passes() {
        let report = Report::new();
        assert!(report.all_passed());
        assert_eq!(report.passed_count(), 0);
        assert!(report.is_empty());
    }

    #[test]
    fn test_pass_counts() {
        let mut report = Report::new();
        report.add(result("ok", TerminationReason::Done));
        report.add(result("slow", TerminationReason::Timeout));

        assert_eq!(report.len(), 2);
        assert_eq!(report.passed_count(), 1);
        assert!(!report.all_passed());
    }

    #[test]
    fn test_eval_scores_decide_pass() {
        let mut failing = result("scored", TerminationReason::Done);
        failing.record_score(EvalScore::new("exact_path", 0.5, false));

        let report: Report = vec![failing].into_iter().collect();
        assert!(!report.all_passed());
    }

    #[test]
    fn test_summary_json_shape() {
        let mut errored = result("broken", TerminationReason::Done);
        errored.fail("connection refused");
        let report: Report = vec![result("ok", TerminationReason::Done), errored]
            .into_iter()
            .collect();

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        let rows = json.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], "ok");
        assert_eq!(rows[0]["termination_reason"], "done");
        assert_eq!(rows[0]["steps"], 1);
        assert_eq!(rows[0].get("error"), Some(&serde_json::Value::Null));
        assert_eq!(rows[1]["termination_reason"], "error");
        assert_eq!(rows[1]["error"], "connection refused");
        assert_eq!(rows[1]["passed"], false);
    }
}
