//! Scenario runner: the observe → decide → act control loop
//!
//! A run moves through `STARTING → RUNNING(step) → {DONE | MAX_STEPS |
//! TIMEOUT | ERROR}`. Every suspension point (connect, stream start, frame
//! waits, oracle calls, interactions) is bounded by one deadline fixed when the
//! run starts. The environment session is closed on every exit path before
//! evaluators score the run.

mod budget;
mod command;

pub use command::{CommandBuilder, accumulate_prompt, interact_command};

use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::error::{ConstructError, Result};
use crate::eval::Evaluator;
use crate::model::{Frame, RunResult, Scenario, StepResult, TerminationReason};
use crate::oracle::{DecisionOracle, DecisionRequest};
use crate::report::Report;
use crate::session::{EnvironmentProvider, EnvironmentSession, StreamRequest};
use budget::Budget;

/// Called synchronously after every recorded step; an error fails the run
pub type StepObserver = Box<dyn FnMut(usize, &StepResult, &Frame) -> Result<()> + Send>;

/// Time allowed for ending the stream and disconnecting once a run finished
pub const DEFAULT_CLEANUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Drives scenarios against an environment with a decision oracle
pub struct ScenarioRunner {
    environment: Box<dyn EnvironmentProvider>,
    oracle: Box<dyn DecisionOracle>,
    evaluators: Vec<Box<dyn Evaluator>>,
    observer: Option<StepObserver>,
    commands: Box<dyn CommandBuilder>,
    cleanup_timeout: Duration,
}

impl ScenarioRunner {
    pub fn builder(
        environment: impl EnvironmentProvider + 'static,
        oracle: impl DecisionOracle + 'static,
    ) -> ScenarioRunnerBuilder {
        ScenarioRunnerBuilder::new(environment, oracle)
    }

    /// Run one scenario to completion.
    ///
    /// Control-loop failures are recorded in the returned [`RunResult`].
    ///
    /// # Errors
    ///
    /// Returns `InvalidScenario` before any session is opened when the
    /// scenario fails validation.
    pub async fn run(&mut self, scenario: &Scenario) -> Result<RunResult> {
        self.run_with_cancellation(scenario, CancellationToken::new())
            .await
    }

    /// Run one scenario, stopping early when `cancel` fires.
    ///
    /// A cancelled run still closes its session and runs evaluators; it is
    /// recorded as `Error` with the message "run cancelled".
    pub async fn run_with_cancellation(
        &mut self,
        scenario: &Scenario,
        cancel: CancellationToken,
    ) -> Result<RunResult> {
        scenario.validate()?;
        let span = tracing::info_span!("scenario", name = %scenario.name);
        self.execute(scenario, cancel).instrument(span).await
    }

    /// Run scenarios one after another and collect the results
    pub async fn run_all<'a>(
        &mut self,
        scenarios: impl IntoIterator<Item = &'a Scenario>,
    ) -> Result<Report> {
        let mut report = Report::new();
        for scenario in scenarios {
            report.add(self.run(scenario).await?);
        }
        Ok(report)
    }

    /// Release the oracle's resources
    pub async fn close(&mut self) -> Result<()> {
        self.oracle.close().await
    }

    async fn execute(&mut self, scenario: &Scenario, cancel: CancellationToken) -> Result<RunResult> {
        let started = Instant::now();
        let budget = Budget::new(started, scenario.timeout());
        let mut result = RunResult::new(scenario.clone());

        tracing::info!(
            scenario = %scenario.name,
            run_id = %result.run_id,
            max_steps = scenario.max_steps,
            timeout_s = scenario.timeout_s,
            "Starting scenario"
        );

        self.oracle.reset();

        if scenario.max_steps == 0 {
            result.terminate(TerminationReason::MaxSteps);
        } else {
            match self.environment.new_client() {
                Ok(client) => {
                    let mut session = EnvironmentSession::new(client);
                    let outcome = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => Err(ConstructError::Cancelled),
                        outcome = drive(
                            &mut session,
                            self.oracle.as_mut(),
                            &mut self.observer,
                            self.commands.as_ref(),
                            scenario,
                            budget,
                            &mut result,
                        ) => outcome,
                    };
                    settle(&mut result, outcome);
                    cleanup(&mut session, self.cleanup_timeout, &mut result).await;
                }
                Err(e) => settle(&mut result, Err(e)),
            }
        }

        result.duration_ms = started.elapsed().as_secs_f64() * 1000.0;

        evaluate(&self.evaluators, scenario, &mut result).await;

        tracing::info!(
            scenario = %scenario.name,
            termination = %result.termination_reason,
            steps = result.steps.len(),
            passed = result.passed(),
            duration_ms = result.duration_ms,
            "Scenario finished"
        );

        Ok(result)
    }
}

/// Close the session within `timeout`; a failure fails a run that had not already errored
async fn cleanup(session: &mut EnvironmentSession, timeout: Duration, result: &mut RunResult) {
    let closed = match tokio::time::timeout(timeout, session.close()).await {
        Ok(closed) => closed,
        Err(_) => Err(ConstructError::Timeout(format!(
            "session close exceeded {:?}",
            timeout
        ))),
    };

    if let Err(e) = closed {
        tracing::warn!(scenario = %result.scenario.name, error = %e, "Session cleanup failed");
        if result.termination_reason != TerminationReason::Error {
            result.fail(format!("session close failed: {}", e));
        }
    }
}

/// Run evaluators in order; a failing evaluator is logged and skipped
async fn evaluate(evaluators: &[Box<dyn Evaluator>], scenario: &Scenario, result: &mut RunResult) {
    for evaluator in evaluators {
        match evaluator.evaluate(scenario, result).await {
            Ok(score) => {
                tracing::debug!(
                    evaluator = %evaluator.name(),
                    score = score.score,
                    passed = score.passed,
                    "Evaluator scored run"
                );
                result.record_score(score);
            }
            Err(e) => {
                tracing::warn!(
                    scenario = %scenario.name,
                    evaluator = %evaluator.name(),
                    error = %e,
                    "Evaluator failed"
                );
            }
        }
    }
}

/// Fold the control loop outcome into the result
fn settle(result: &mut RunResult, outcome: Result<TerminationReason>) {
    match outcome {
        Ok(reason) => result.terminate(reason),
        Err(e) if e.is_timeout() => {
            tracing::info!(scenario = %result.scenario.name, "Time budget exhausted");
            result.terminate(TerminationReason::Timeout);
        }
        Err(ConstructError::Cancelled) => {
            tracing::warn!(scenario = %result.scenario.name, "Run cancelled");
            result.fail("run cancelled");
        }
        Err(e) => {
            tracing::error!(scenario = %result.scenario.name, error = %e, "Scenario failed");
            result.fail(e.to_string());
        }
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

async fn drive(
    session: &mut EnvironmentSession,
    oracle: &mut dyn DecisionOracle,
    observer: &mut Option<StepObserver>,
    commands: &dyn CommandBuilder,
    scenario: &Scenario,
    budget: Budget,
    result: &mut RunResult,
) -> Result<TerminationReason> {
    budget.bound(session.connect()).await?;

    let stream = StreamRequest::new(scenario.prompt.clone())
        .portrait(scenario.portrait)
        .image(scenario.image.clone());
    budget.bound(session.start_stream(&stream)).await?;

    let mut frame = session.wait_for_frame_until(budget.deadline()).await?;
    let mut history = Vec::with_capacity(scenario.max_steps.min(64));
    let mut command = scenario.prompt.clone();

    for step_index in 0..scenario.max_steps {
        if budget.is_exhausted() {
            return Ok(TerminationReason::Timeout);
        }

        let decision = budget
            .bound(oracle.decide(DecisionRequest {
                frame: &frame,
                step_index,
                scenario,
                history: &history,
            }))
            .await?;

        tracing::debug!(
            step = step_index,
            action = %decision.action.name,
            done = decision.done,
            latency_ms = decision.latency_ms,
            "Step decided"
        );

        let done = decision.done;
        result.record_step(StepResult {
            step_index,
            action: decision.action.clone(),
            reasoning: decision.reasoning,
            latency_ms: non_negative(decision.latency_ms),
            cost_usd: non_negative(decision.cost_usd),
        });

        if let (Some(observer), Some(step)) = (observer.as_mut(), result.steps.last()) {
            observer(step_index, step, &frame)?;
        }

        if done {
            return Ok(TerminationReason::Done);
        }

        command = commands.next_command(&command, &decision.action);
        history.push(decision.action);

        budget.bound(session.interact(&command)).await?;
        frame = session.wait_for_frame_until(budget.deadline()).await?;
    }

    Ok(TerminationReason::MaxSteps)
}

/// Builder for [`ScenarioRunner`]
pub struct ScenarioRunnerBuilder {
    environment: Box<dyn EnvironmentProvider>,
    oracle: Box<dyn DecisionOracle>,
    evaluators: Vec<Box<dyn Evaluator>>,
    observer: Option<StepObserver>,
    commands: Box<dyn CommandBuilder>,
    cleanup_timeout: Duration,
}

impl ScenarioRunnerBuilder {
    fn new(
        environment: impl EnvironmentProvider + 'static,
        oracle: impl DecisionOracle + 'static,
    ) -> Self {
        Self {
            environment: Box::new(environment),
            oracle: Box::new(oracle),
            evaluators: Vec::new(),
            observer: None,
            commands: Box::new(interact_command),
            cleanup_timeout: DEFAULT_CLEANUP_TIMEOUT,
        }
    }

    /// Append an evaluator; evaluators run in the order added
    pub fn evaluator(mut self, evaluator: impl Evaluator + 'static) -> Self {
        self.evaluators.push(Box::new(evaluator));
        self
    }

    pub fn evaluators(mut self, evaluators: impl IntoIterator<Item = Box<dyn Evaluator>>) -> Self {
        self.evaluators.extend(evaluators);
        self
    }

    pub fn observer(
        mut self,
        observer: impl FnMut(usize, &StepResult, &Frame) -> Result<()> + Send + 'static,
    ) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Replace the default [`interact_command`] translation
    pub fn command_builder(mut self, commands: impl CommandBuilder + 'static) -> Self {
        self.commands = Box::new(commands);
        self
    }

    pub fn cleanup_timeout(mut self, timeout: Duration) -> Self {
        self.cleanup_timeout = timeout;
        self
    }

    pub fn build(self) -> ScenarioRunner {
        ScenarioRunner {
            environment: self.environment,
            oracle: self.oracle,
            evaluators: self.evaluators,
            observer: self.observer,
            commands: self.commands,
            cleanup_timeout: self.cleanup_timeout,
        }
    }
}
