//! Closure-backed evaluator

use async_trait::async_trait;

use super::Evaluator;
use crate::error::Result;
use crate::model::{EvalScore, RunResult, Scenario};

/// Function-based evaluator for ad-hoc checks
pub struct FunctionEvaluator<F>
where
    F: Fn(&Scenario, &RunResult) -> Result<EvalScore> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FunctionEvaluator<F>
where
    F: Fn(&Scenario, &RunResult) -> Result<EvalScore> + Send + Sync,
{
    /// Create a new function evaluator
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

#[async_trait]
impl<F> Evaluator for FunctionEvaluator<F>
where
    F: Fn(&Scenario, &RunResult) -> Result<EvalScore> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate(&self, scenario: &Scenario, result: &RunResult) -> Result<EvalScore> {
        let mut score = (self.func)(scenario, result)?;
        score.name.clone_from(&self.name);
        Ok(score)
    }
}
