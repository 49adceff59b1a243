//! Combine evaluators with AND / OR / threshold logic

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::Evaluator;
use crate::error::Result;
use crate::model::{EvalScore, RunResult, Scenario};

/// Default pass threshold for [`CombineMode::Threshold`]
pub const DEFAULT_THRESHOLD: f64 = 0.7;

/// How sub-scores combine into a pass/fail verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombineMode {
    /// Every sub-evaluator passed
    And,
    /// At least one sub-evaluator passed
    Or,
    /// Mean score reached the threshold
    Threshold,
}

impl CombineMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CombineMode::And => "and",
            CombineMode::Or => "or",
            CombineMode::Threshold => "threshold",
        }
    }
}

/// Runs sub-evaluators in order and combines their scores.
///
/// The composite score is always the mean of the sub-scores; the mode only
/// decides `passed`. Any sub-evaluator failure fails the composite.
pub struct CompositeEvaluator {
    evaluators: Vec<Box<dyn Evaluator>>,
    mode: CombineMode,
    threshold: f64,
}

impl CompositeEvaluator {
    pub fn new(mode: CombineMode) -> Self {
        Self {
            evaluators: Vec::new(),
            mode,
            threshold: DEFAULT_THRESHOLD,
        }
    }

    /// Append a sub-evaluator
    pub fn with(mut self, evaluator: impl Evaluator + 'static) -> Self {
        self.evaluators.push(Box::new(evaluator));
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn mode(&self) -> CombineMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.evaluators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.evaluators.is_empty()
    }

    /// Combine already computed sub-scores
    pub fn combine(&self, sub_scores: &[EvalScore]) -> EvalScore {
        let summary: Vec<_> = sub_scores
            .iter()
            .map(|s| json!({"name": s.name, "score": s.score, "passed": s.passed}))
            .collect();

        if sub_scores.is_empty() {
            return EvalScore::new(self.name(), 1.0, true)
                .with_detail("mode", self.mode.as_str())
                .with_detail("sub_scores", summary);
        }

        let avg_score = sub_scores.iter().map(|s| s.score).sum::<f64>() / sub_scores.len() as f64;
        let passed = match self.mode {
            CombineMode::And => sub_scores.iter().all(|s| s.passed),
            CombineMode::Or => sub_scores.iter().any(|s| s.passed),
            CombineMode::Threshold => avg_score >= self.threshold,
        };

        let mut score = EvalScore::new(self.name(), avg_score, passed)
            .with_detail("mode", self.mode.as_str())
            .with_detail("sub_scores", summary);
        if self.mode == CombineMode::Threshold {
            score = score.with_detail("threshold", self.threshold);
        }
        score
    }
}

#[async_trait]
impl Evaluator for CompositeEvaluator {
    fn name(&self) -> &str {
        "composite"
    }

    async fn evaluate(&self, scenario: &Scenario, result: &RunResult) -> Result<EvalScore> {
        let mut sub_scores = Vec::with_capacity(self.evaluators.len());
        for evaluator in &self.evaluators {
            sub_scores.push(evaluator.evaluate(scenario, result).await?);
        }
        Ok(self.combine(&sub_scores))
    }
}
