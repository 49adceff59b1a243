//! LLM-backed oracle and judges against a scripted chat model

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use construct_core::llm::{LLMRequest, LLMResponse, MessageRole, ModelInfo, TokenUsage};
use construct_core::oracle::UNKNOWN_ACTION;
use construct_core::prelude::*;
use construct_core::stub::StubEnvironment;

/// Answers policy turns from a queue and judge prompts with fixed verdicts
struct ScriptedModel {
    turns: Mutex<VecDeque<String>>,
    semantic_verdict: String,
    outcome_verdict: String,
    requests: Mutex<Vec<LLMRequest>>,
}

impl ScriptedModel {
    fn new(turns: &[&str], semantic_verdict: &str, outcome_verdict: &str) -> Arc<Self> {
        Arc::new(Self {
            turns: Mutex::new(turns.iter().map(|t| t.to_string()).collect()),
            semantic_verdict: semantic_verdict.to_string(),
            outcome_verdict: outcome_verdict.to_string(),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn policy_requests(&self) -> Vec<LLMRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.messages.first().map(|m| m.role) == Some(MessageRole::System))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl LLMProvider for ScriptedModel {
    async fn generate_request(&self, request: &LLMRequest) -> Result<LLMResponse> {
        self.requests.lock().unwrap().push(request.clone());

        let prompt = request
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let content = if prompt.contains("semantically equivalent") {
            self.semantic_verdict.clone()
        } else if prompt.contains("successfully completed") {
            self.outcome_verdict.clone()
        } else {
            self.turns
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| ConstructError::Llm("no scripted reply left".to_string()))?
        };

        Ok(LLMResponse {
            content,
            usage: Some(TokenUsage {
                prompt_tokens: 2_000,
                completion_tokens: 50,
                total_tokens: 2_050,
            }),
        })
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            provider: "openai".to_string(),
            model_name: "gpt-4o".to_string(),
        }
    }
}

fn fetch_cup() -> Scenario {
    Scenario::builder("fetch_cup", "Pick up the red cup")
        .expected_actions([
            Action::new("move_forward").with_parameter("distance", 1.0),
            Action::new("pick_up").with_parameter("object", "cup"),
            Action::done(),
        ])
        .success_criteria("The robot is holding the red cup")
        .max_steps(6)
        .build()
        .unwrap()
}

const TURNS: [&str; 3] = [
    r#"{"action": "move_forward", "parameters": {"distance": 1.0}, "reasoning": "cup is ahead"}"#,
    "Sure! ```json\n{\"action\": \"pick_up\", \"parameters\": {\"object\": \"cup\"}}\n```",
    r#"{"action": "done", "parameters": {}, "done": true, "reasoning": "holding the cup"}"#,
];

#[tokio::test(start_paused = true)]
async fn model_driven_run_is_scored_by_every_evaluator() {
    let model = ScriptedModel::new(
        &TURNS,
        r#"{"score": 0.95, "reasoning": "same intent"}"#,
        r#"{"score": 0.9, "reasoning": "cup was picked up"}"#,
    );
    let provider: Arc<dyn LLMProvider> = model.clone();

    let mut runner = ScenarioRunner::builder(StubEnvironment::new(), LlmOracle::new(provider.clone()))
        .evaluator(ExactPathEvaluator::new())
        .evaluator(
            CompositeEvaluator::new(CombineMode::And)
                .with(SemanticEvaluator::new(provider.clone()))
                .with(OutcomeEvaluator::new(provider)),
        )
        .build();

    let result = runner.run(&fetch_cup()).await.unwrap();

    assert_eq!(result.termination_reason, TerminationReason::Done);
    assert_eq!(result.actions(), fetch_cup().expected_actions);
    assert!(result.passed(), "scores: {:?}", result.eval_scores);
    assert_eq!(result.eval_scores["exact_path"].score, 1.0);
    assert!(result.eval_scores["composite"].passed);

    assert!(result.total_cost_usd > 0.0);
    let cost: f64 = result.steps.iter().map(|s| s.cost_usd).sum();
    assert!((result.total_cost_usd - cost).abs() < 1e-12);

    // every policy turn replays the conversation so far
    let turns = model.policy_requests();
    assert_eq!(turns.len(), 3);
    assert_eq!(turns[0].messages.len(), 2);
    assert_eq!(turns[2].messages.len(), 6);
    assert!(turns[0].messages[1].content.starts_with("Task: Pick up the red cup"));

    // the policy sees the frame rendered after each command
    let shown: Vec<_> = turns
        .iter()
        .map(|t| t.messages.last().and_then(|m| m.images.first()).and_then(|f| f.pixel(0, 0)))
        .collect();
    assert_eq!(shown, vec![Some([0, 0, 0]), Some([1, 0, 0]), Some([2, 0, 0])]);
}

#[tokio::test(start_paused = true)]
async fn unusable_reply_is_recorded_and_sent_verbatim() {
    let model = ScriptedModel::new(
        &["I would rather look around first.", TURNS[2]],
        r#"{"score": 0.1}"#,
        r#"{"score": 0.0}"#,
    );
    let env = StubEnvironment::new();
    let mut runner = ScenarioRunner::builder(env.clone(), LlmOracle::new(model)).build();

    let result = runner.run(&fetch_cup()).await.unwrap();

    assert_eq!(result.termination_reason, TerminationReason::Done);
    assert_eq!(result.steps[0].action.name, UNKNOWN_ACTION);
    assert_eq!(
        env.stats().commands,
        vec!["I would rather look around first.".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn failing_judge_leaves_other_scores() {
    let model = ScriptedModel::new(&TURNS, "no verdict today", r#"{"score": 0.8}"#);
    let provider: Arc<dyn LLMProvider> = model;

    let mut runner = ScenarioRunner::builder(StubEnvironment::new(), LlmOracle::new(provider.clone()))
        .evaluator(SemanticEvaluator::new(provider.clone()))
        .evaluator(OutcomeEvaluator::new(provider))
        .build();

    let result = runner.run(&fetch_cup()).await.unwrap();

    assert!(!result.eval_scores.contains_key("semantic"));
    assert!(result.eval_scores["outcome"].passed);
}

#[tokio::test(start_paused = true)]
async fn model_failure_fails_the_run() {
    let model = ScriptedModel::new(&[TURNS[0]], "{}", "{}");
    let mut runner = ScenarioRunner::builder(StubEnvironment::new(), LlmOracle::new(model)).build();

    let result = runner.run(&fetch_cup()).await.unwrap();

    assert_eq!(result.termination_reason, TerminationReason::Error);
    assert_eq!(result.steps.len(), 1);
    assert!(result.error.as_deref().unwrap_or_default().contains("no scripted reply left"));
}
