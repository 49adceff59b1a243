//! LLM-backed decision oracle
//!
//! Keeps a multi-turn conversation with a vision chat model. Every turn carries
//! the current frame as an image and asks for the next robot action as a JSON
//! object.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::time::Instant;

use super::{Decision, DecisionOracle, DecisionRequest};
use crate::error::Result;
use crate::llm::{LLMCostCalculator, LLMProvider, LLMRequest, Message};
use crate::model::{Action, Frame, Parameters, Scenario, ToolSpec};

const DEFAULT_SYSTEM_PROMPT: &str = "You control a robot in a simulated environment. \
Each turn you receive the current camera frame. Choose exactly one \
action from the available tools. Call `done` once the task is complete.";

/// Name given to replies that did not contain a usable action
pub const UNKNOWN_ACTION: &str = "unknown";

/// Built-in robot vocabulary used when a scenario supplies no tools
pub fn default_tools() -> Vec<ToolSpec> {
    vec![
        ToolSpec::new(
            "move_forward",
            "Move the robot forward by a specified distance.",
            json!({
                "type": "object",
                "properties": {
                    "distance": {"type": "number", "description": "Distance in meters"}
                }
            }),
        ),
        ToolSpec::new(
            "turn",
            "Turn the robot by a specified angle.",
            json!({
                "type": "object",
                "properties": {
                    "angle": {
                        "type": "number",
                        "description": "Angle in degrees (positive=left, negative=right)"
                    }
                }
            }),
        ),
        ToolSpec::new(
            "pick_up",
            "Pick up an object.",
            json!({
                "type": "object",
                "properties": {
                    "object": {"type": "string", "description": "Name of the object to pick up"}
                }
            }),
        ),
        ToolSpec::new(
            "place",
            "Place the held object at a location.",
            json!({
                "type": "object",
                "properties": {
                    "location": {"type": "string", "description": "Where to place the object"}
                }
            }),
        ),
        ToolSpec::new(
            "done",
            "Signal that the task is complete.",
            json!({"type": "object", "properties": {}}),
        ),
    ]
}

#[derive(Debug, Deserialize)]
struct ActionReply {
    action: String,
    #[serde(default)]
    parameters: Parameters,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    reasoning: String,
}

/// Decision oracle that asks a chat model for each action
pub struct LlmOracle {
    provider: Arc<dyn LLMProvider>,
    costs: LLMCostCalculator,
    temperature: f32,
    max_tokens: usize,
    conversation: Vec<Message>,
}

impl LlmOracle {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            provider,
            costs: LLMCostCalculator::new(),
            temperature: 0.0,
            max_tokens: 512,
            conversation: Vec::new(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature.clamp(0.0, 2.0);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_cost_calculator(mut self, costs: LLMCostCalculator) -> Self {
        self.costs = costs;
        self
    }

    /// Messages exchanged so far in the current run
    pub fn conversation(&self) -> &[Message] {
        &self.conversation
    }

    fn system_prompt(scenario: &Scenario) -> String {
        let tools = scenario.tools.clone().unwrap_or_else(default_tools);
        let mut prompt = scenario
            .system_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());

        prompt.push_str("\n\nAvailable tools:\n");
        for tool in &tools {
            let params = tool
                .parameters
                .get("properties")
                .cloned()
                .unwrap_or_else(|| json!({}));
            prompt.push_str(&format!(
                "- {}: {} Parameters: {}\n",
                tool.name, tool.description, params
            ));
        }

        prompt.push_str(
            "\nRespond with ONLY a JSON object of the form \
             {\"action\": \"<tool name>\", \"parameters\": {...}, \"done\": false, \
             \"reasoning\": \"<one sentence>\"}",
        );
        prompt
    }

    fn turn_message(request: &DecisionRequest<'_>) -> String {
        let scene = describe_frame(request.frame);
        if request.step_index == 0 {
            format!(
                "Task: {}\n{}\nObserve the scene and decide the next robot action.",
                request.scenario.prompt, scene
            )
        } else {
            let last = request
                .history
                .last()
                .map(|a| a.describe())
                .unwrap_or_else(|| "none".to_string());
            format!(
                "{}\nPrevious action: {}\nObserve the updated scene and decide the next robot action.",
                scene, last
            )
        }
    }
}

/// Parse a model reply into a decision; unusable replies become `unknown`
fn parse_decision(content: &str) -> Decision {
    match crate::reply::parse_reply::<ActionReply>(content) {
        Ok(reply) if !reply.action.trim().is_empty() => {
            let action = Action::new(reply.action.trim()).with_parameters(reply.parameters);
            let done = reply.done || action.is_done();
            Decision::new(action)
                .with_done(done)
                .with_reasoning(reply.reasoning)
        }
        _ => {
            tracing::debug!("Model reply had no action; recording it as text");
            Decision::new(Action::new(UNKNOWN_ACTION).with_raw_text(content))
                .with_reasoning(content)
        }
    }
}

fn describe_frame(frame: &Frame) -> String {
    let pixels = (frame.width() as usize * frame.height() as usize).max(1);
    let mut sums = [0u64; 3];
    for px in frame.data().chunks_exact(Frame::CHANNELS) {
        for (sum, value) in sums.iter_mut().zip(px) {
            *sum += u64::from(*value);
        }
    }
    let [r, g, b] = sums.map(|s| s / pixels as u64);
    format!(
        "Frame: {}x{} RGB, mean colour ({}, {}, {})",
        frame.width(),
        frame.height(),
        r,
        g,
        b
    )
}

#[async_trait]
impl DecisionOracle for LlmOracle {
    async fn decide(&mut self, request: DecisionRequest<'_>) -> Result<Decision> {
        let user = Message::user(Self::turn_message(&request)).with_image(request.frame.clone());

        let mut messages = Vec::with_capacity(self.conversation.len() + 2);
        messages.push(Message::system(Self::system_prompt(request.scenario)));
        messages.extend(self.conversation.iter().cloned());
        messages.push(user.clone());

        let llm_request = LLMRequest {
            messages,
            ..Default::default()
        }
        .temperature(self.temperature)
        .max_tokens(self.max_tokens);

        let started = Instant::now();
        let response = self.provider.generate_request(&llm_request).await?;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        let cost_usd = self
            .costs
            .cost_of(&self.provider.model_info(), response.usage.as_ref());

        self.conversation.push(user);
        self.conversation.push(Message::assistant(response.content.clone()));

        let decision = parse_decision(&response.content)
            .with_latency(latency_ms)
            .with_cost(cost_usd);

        tracing::debug!(
            step = request.step_index,
            action = %decision.action.name,
            done = decision.done,
            "Model decided"
        );

        Ok(decision)
    }

    fn reset(&mut self) {
        self.conversation.clear();
    }
}
