//! LLM-as-judge evaluators

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use super::{DEFAULT_THRESHOLD, Evaluator, numbered_actions};
use crate::error::{ConstructError, Result};
use crate::llm::{LLMProvider, LLMRequest, generate_structured_output};
use crate::model::{EvalScore, RunResult, Scenario};

const SEMANTIC_PROMPT: &str = "You are evaluating whether a robot's action sequence is \
semantically equivalent to the expected sequence for a given task.

Task: {task}

Expected actions:
{expected}

Actual actions:
{actual}

Score from 0.0 to 1.0 how semantically similar the actual path is to the expected path. \
Consider action intent, ordering, and overall task completion.

Respond with ONLY a JSON object: {\"score\": <float>, \"reasoning\": \"<brief explanation>\"}";

const OUTCOME_PROMPT: &str = "You are evaluating whether a robot successfully completed a \
task based on the actions it took.

Task: {task}
Success criteria: {criteria}

Actions taken:
{actions}

Termination reason: {termination}

Did the robot successfully complete the task? Score from 0.0 to 1.0.

Respond with ONLY a JSON object: {\"score\": <float>, \"reasoning\": \"<brief explanation>\"}";

#[derive(Debug, Deserialize)]
struct Verdict {
    score: f64,
    #[serde(default)]
    reasoning: String,
}

/// Substitute `{key}` placeholders in one pass; inserted text is never rescanned
/// and unknown braces are kept.
fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start + 1..];
        let hit = values
            .iter()
            .find(|(key, _)| tail.starts_with(key) && tail[key.len()..].starts_with('}'));
        match hit {
            Some((key, value)) => {
                out.push_str(value);
                rest = &tail[key.len() + 1..];
            }
            None => {
                out.push('{');
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Shared judge plumbing: one deterministic call, one verdict
struct Judge {
    provider: Arc<dyn LLMProvider>,
    threshold: f64,
}

impl Judge {
    async fn score(&self, name: &str, prompt: String) -> Result<EvalScore> {
        let request = LLMRequest::from_prompt(prompt).temperature(0.0).max_tokens(256);
        let verdict: Verdict = generate_structured_output(self.provider.as_ref(), &request)
            .await
            .map_err(|e| ConstructError::evaluator(name, e.to_string()))?;

        if !verdict.score.is_finite() {
            return Err(ConstructError::evaluator(
                name,
                format!("judge returned non-finite score {}", verdict.score),
            ));
        }
        let score = verdict.score.clamp(0.0, 1.0);

        Ok(EvalScore::new(name, score, score >= self.threshold)
            .with_detail("reasoning", verdict.reasoning)
            .with_detail("threshold", self.threshold))
    }
}

/// Judges how closely the actual path matches the expected one in intent
pub struct SemanticEvaluator {
    judge: Judge,
}

impl SemanticEvaluator {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            judge: Judge {
                provider,
                threshold: DEFAULT_THRESHOLD,
            },
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.judge.threshold = threshold;
        self
    }

    fn prompt(scenario: &Scenario, result: &RunResult) -> String {
        let expected = numbered_actions(&scenario.expected_actions, "(none specified)");
        let actual = numbered_actions(&result.actions(), "(none)");

        fill(
            SEMANTIC_PROMPT,
            &[
                ("task", scenario.prompt.as_str()),
                ("expected", expected.as_str()),
                ("actual", actual.as_str()),
            ],
        )
    }
}

#[async_trait]
impl Evaluator for SemanticEvaluator {
    fn name(&self) -> &str {
        "semantic"
    }

    async fn evaluate(&self, scenario: &Scenario, result: &RunResult) -> Result<EvalScore> {
        self.judge
            .score(self.name(), Self::prompt(scenario, result))
            .await
    }
}

/// Judges whether the run satisfied the scenario's success criteria
pub struct OutcomeEvaluator {
    judge: Judge,
}

impl OutcomeEvaluator {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            judge: Judge {
                provider,
                threshold: DEFAULT_THRESHOLD,
            },
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.judge.threshold = threshold;
        self
    }

    fn prompt(scenario: &Scenario, result: &RunResult) -> String {
        let criteria = if scenario.success_criteria.trim().is_empty() {
            "(not specified)"
        } else {
            scenario.success_criteria.as_str()
        };

        let actions = numbered_actions(&result.actions(), "(none)");

        fill(
            OUTCOME_PROMPT,
            &[
                ("task", scenario.prompt.as_str()),
                ("criteria", criteria),
                ("actions", actions.as_str()),
                ("termination", result.termination_reason.as_str()),
            ],
        )
    }
}

#[async_trait]
impl Evaluator for OutcomeEvaluator {
    fn name(&self) -> &str {
        "outcome"
    }

    async fn evaluate(&self, scenario: &Scenario, result: &RunResult) -> Result<EvalScore> {
        self.judge
            .score(self.name(), Self::prompt(scenario, result))
            .await
    }
}
