//! Exact action-sequence match

use async_trait::async_trait;
use serde_json::{Value, json};

use super::Evaluator;
use crate::error::Result;
use crate::model::{Action, EvalScore, RunResult, Scenario};

/// Compares the run's actions against the scenario's expected actions, step by step.
///
/// Sequences of different length score 0.0. Otherwise the score is the
/// fraction of positions whose names (and, by default, parameters) agree, and
/// the run passes only on a full match.
#[derive(Debug, Clone)]
pub struct ExactPathEvaluator {
    check_parameters: bool,
}

impl ExactPathEvaluator {
    pub fn new() -> Self {
        Self {
            check_parameters: true,
        }
    }

    /// Compare action names only
    pub fn names_only(mut self) -> Self {
        self.check_parameters = false;
        self
    }

    pub fn check_parameters(mut self, check: bool) -> Self {
        self.check_parameters = check;
        self
    }

    fn matches(&self, expected: &Action, actual: &Action) -> bool {
        if expected.name != actual.name {
            return false;
        }
        !self.check_parameters
            || values_equal(
                &Value::Object(expected.parameters.clone()),
                &Value::Object(actual.parameters.clone()),
            )
    }

    /// Score two action sequences
    pub fn score_paths(&self, expected: &[Action], actual: &[Action]) -> EvalScore {
        if expected.len() != actual.len() {
            return EvalScore::new(self.name(), 0.0, false)
                .with_detail("reason", "length_mismatch")
                .with_detail("expected_count", expected.len())
                .with_detail("actual_count", actual.len());
        }

        let mut matched = 0usize;
        let mut mismatches = Vec::new();
        for (step, (exp, act)) in expected.iter().zip(actual).enumerate() {
            if self.matches(exp, act) {
                matched += 1;
            } else {
                mismatches.push(json!({
                    "step": step,
                    "expected": {"name": exp.name, "parameters": exp.parameters},
                    "actual": {"name": act.name, "parameters": act.parameters},
                }));
            }
        }

        let score = if expected.is_empty() {
            1.0
        } else {
            matched as f64 / expected.len() as f64
        };

        EvalScore::new(self.name(), score, score == 1.0).with_detail("mismatches", mismatches)
    }
}

impl Default for ExactPathEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Evaluator for ExactPathEvaluator {
    fn name(&self) -> &str {
        "exact_path"
    }

    async fn evaluate(&self, scenario: &Scenario, result: &RunResult) -> Result<EvalScore> {
        Ok(self.score_paths(&scenario.expected_actions, &result.actions()))
    }
}

/// Structural equality with numbers compared by value, so `1` equals `1.0`
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                return x == y;
            }
            if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
                return x == y;
            }
            match (x.as_f64(), y.as_f64()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            }
        }
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(key, xv)| y.get(key).is_some_and(|yv| values_equal(xv, yv)))
        }
        _ => a == b,
    }
}
