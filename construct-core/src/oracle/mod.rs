//! Decision oracle: the policy under test

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{Action, Frame, Scenario};

mod llm;

pub use llm::{LlmOracle, UNKNOWN_ACTION, default_tools};

/// Everything the policy sees when asked for its next move
#[derive(Debug, Clone, Copy)]
pub struct DecisionRequest<'a> {
    /// Latest fresh frame
    pub frame: &'a Frame,
    /// Zero-based index of this decision within the run
    pub step_index: usize,
    pub scenario: &'a Scenario,
    /// Actions already taken in this run, oldest first
    pub history: &'a [Action],
}

/// The policy's answer for one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action: Action,
    /// The policy considers the task complete
    pub done: bool,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub cost_usd: f64,
    #[serde(default)]
    pub latency_ms: f64,
}

impl Decision {
    /// Decision for `action`; `done` follows the action name
    pub fn new(action: Action) -> Self {
        let done = action.is_done();
        Self {
            action,
            done,
            reasoning: String::new(),
            cost_usd: 0.0,
            latency_ms: 0.0,
        }
    }

    /// Terminal decision with the `done` action
    pub fn finished() -> Self {
        Self::new(Action::done())
    }

    pub fn with_done(mut self, done: bool) -> Self {
        self.done = done;
        self
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }

    pub fn with_cost(mut self, cost_usd: f64) -> Self {
        self.cost_usd = cost_usd;
        self
    }

    pub fn with_latency(mut self, latency_ms: f64) -> Self {
        self.latency_ms = latency_ms;
        self
    }
}

/// A decision-making policy driven by the scenario runner.
///
/// Oracles may keep conversational state between steps of one run. The runner
/// calls [`reset`](DecisionOracle::reset) before every run so that state never
/// leaks from one scenario into the next.
#[async_trait]
pub trait DecisionOracle: Send {
    /// Decide the next action for the given frame.
    ///
    /// # Errors
    ///
    /// Returns `Decision` (or any other error) when no decision can be made;
    /// the runner records the run as failed.
    async fn decide(&mut self, request: DecisionRequest<'_>) -> Result<Decision>;

    /// Forget per-run state
    fn reset(&mut self) {}

    /// Release held resources
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl<T: DecisionOracle + ?Sized> DecisionOracle for Box<T> {
    async fn decide(&mut self, request: DecisionRequest<'_>) -> Result<Decision> {
        (**self).decide(request).await
    }

    fn reset(&mut self) {
        (**self).reset()
    }

    async fn close(&mut self) -> Result<()> {
        (**self).close().await
    }
}
