//! Evaluators that score finished runs
//!
//! An evaluator reads a [`Scenario`] and its [`RunResult`] and returns an
//! [`EvalScore`]. The runner stores each score under the evaluator's name;
//! evaluators never touch the result themselves.
//!
//! # Example
//!
//! ```rust,no_run
//! use construct_core::eval::{CombineMode, CompositeEvaluator, ExactPathEvaluator};
//!
//! let strict = CompositeEvaluator::new(CombineMode::And)
//!     .with(ExactPathEvaluator::new())
//!     .with(ExactPathEvaluator::new().names_only());
//! ```

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::model::{EvalScore, RunResult, Scenario};

mod composite;
mod exact;
mod function;
mod judge;

pub use composite::{CombineMode, CompositeEvaluator, DEFAULT_THRESHOLD};
pub use exact::ExactPathEvaluator;
pub use function::FunctionEvaluator;
pub use judge::{OutcomeEvaluator, SemanticEvaluator};

/// Scores a finished run
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Key under which the score is stored
    fn name(&self) -> &str;

    /// Score `result`, a run of `scenario`
    async fn evaluate(&self, scenario: &Scenario, result: &RunResult) -> Result<EvalScore>;
}

#[async_trait]
impl<T: Evaluator + ?Sized> Evaluator for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn evaluate(&self, scenario: &Scenario, result: &RunResult) -> Result<EvalScore> {
        (**self).evaluate(scenario, result).await
    }
}

#[async_trait]
impl<T: Evaluator + ?Sized> Evaluator for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn evaluate(&self, scenario: &Scenario, result: &RunResult) -> Result<EvalScore> {
        (**self).evaluate(scenario, result).await
    }
}

/// Numbered `name({params})` lines used in judge prompts
pub(crate) fn numbered_actions(actions: &[crate::model::Action], empty: &str) -> String {
    if actions.is_empty() {
        return format!("  {}", empty);
    }
    actions
        .iter()
        .enumerate()
        .map(|(i, a)| format!("  {}. {}", i + 1, a.describe()))
        .collect::<Vec<_>>()
        .join("\n")
}
