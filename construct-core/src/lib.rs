//! # Construct - scenario-driven testing for embodied decision policies
//!
//! Construct checks whether a decision-making policy (the *oracle*) correctly
//! controls a robot inside a simulated or remote environment:
//! - Declarative scenarios with step and wall-clock budgets
//! - A closed observe → decide → act loop with a fresh-frame guarantee
//! - Guaranteed environment cleanup on every exit path, including cancellation
//! - Pluggable evaluators (exact path, LLM judges, composites)
//! - Suite reports with JSON summaries
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use construct_core::prelude::*;
//! use construct_core::stub::{ScriptedOracle, StubEnvironment};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let scenario = Scenario::builder("fetch_cup", "Pick up the red cup")
//!         .expected_actions([
//!             Action::new("move_forward").with_parameter("distance", 1.0),
//!             Action::new("pick_up").with_parameter("object", "cup"),
//!             Action::done(),
//!         ])
//!         .max_steps(5)
//!         .build()?;
//!
//!     let oracle = ScriptedOracle::from_actions(scenario.expected_actions.clone());
//!     let mut runner = ScenarioRunner::builder(StubEnvironment::new(), oracle)
//!         .evaluator(ExactPathEvaluator::new())
//!         .build();
//!
//!     let result = runner.run(&scenario).await?;
//!     assert_eq!(result.termination_reason, TerminationReason::Done);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! - `llm-openai`: OpenAI-compatible chat provider (OpenAI, Gemini) for the
//!   LLM oracle and judges

pub mod config;
pub mod error;
pub mod eval;
pub mod llm;
pub mod model;
pub mod oracle;
pub mod reply;
pub mod report;
pub mod runner;
pub mod session;
pub mod stub;
pub mod telemetry;

/// Current library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{ConstructConfig, LLMProviderConfig, ScenarioDefaults};
    pub use crate::error::{ConstructError, Result};
    pub use crate::eval::{
        CombineMode, CompositeEvaluator, Evaluator, ExactPathEvaluator, FunctionEvaluator,
        OutcomeEvaluator, SemanticEvaluator,
    };
    pub use crate::llm::{LLMProvider, LLMProviderFactory};
    pub use crate::model::{
        Action, EvalScore, Frame, ImageSource, RunResult, Scenario, StepResult, TerminationReason,
        ToolSpec,
    };
    pub use crate::oracle::{Decision, DecisionOracle, DecisionRequest, LlmOracle};
    pub use crate::report::{Report, RunSummary};
    pub use crate::runner::{ScenarioRunner, accumulate_prompt, interact_command};
    pub use crate::session::{
        EnvironmentClient, EnvironmentProvider, EnvironmentSession, FrameSink, StreamRequest,
    };
}
