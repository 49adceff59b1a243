//! Core data model: actions, scenarios, frames and run results

mod action;
mod frame;
mod result;
mod scenario;

pub use action::{Action, DONE_ACTION, Parameters};
pub use frame::Frame;
pub use result::{Details, EvalRecord, EvalScore, RunResult, StepResult, TerminationReason};
pub use scenario::{
    DEFAULT_MAX_STEPS, DEFAULT_TIMEOUT_S, ImageSource, Scenario, ScenarioBuilder, ToolSpec,
};
