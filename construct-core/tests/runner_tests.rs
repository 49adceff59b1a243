//! Control loop behaviour of the scenario runner

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use construct_core::eval::FunctionEvaluator;
use construct_core::prelude::*;
use construct_core::stub::{ScriptedOracle, StubEnvironment};

fn fetch_cup_path() -> Vec<Action> {
    vec![
        Action::new("move_forward").with_parameter("distance", 1),
        Action::new("pick_up").with_parameter("object", "cup"),
        Action::done(),
    ]
}

fn fetch_cup() -> Scenario {
    Scenario::builder("fetch_cup", "Pick up the red cup")
        .expected_actions(fetch_cup_path())
        .max_steps(10)
        .timeout_s(30.0)
        .build()
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn scripted_path_finishes_done_in_three_steps() {
    let env = StubEnvironment::new();
    let oracle = ScriptedOracle::from_actions(fetch_cup_path());
    let mut runner = ScenarioRunner::builder(env.clone(), oracle.clone())
        .evaluator(ExactPathEvaluator::new())
        .build();

    let result = runner.run(&fetch_cup()).await.unwrap();

    assert_eq!(result.termination_reason, TerminationReason::Done);
    assert_eq!(result.steps.len(), 3);
    assert!(result.error.is_none());
    assert_eq!(result.actions(), fetch_cup_path());
    assert!(result.passed());

    let exact = &result.eval_scores["exact_path"];
    assert_eq!(exact.score, 1.0);
    assert!(exact.passed);

    let stats = env.stats();
    assert_eq!(stats.clients_created, 1);
    assert_eq!(
        stats.commands,
        vec!["move_forward distance=1".to_string(), "pick_up object=cup".to_string()]
    );
    assert_eq!(stats.end_stream_calls, 1);
    assert_eq!(stats.disconnect_calls, 1);

    assert_eq!(oracle.inspect(|p| p.calls().to_vec()), vec![(0, 0), (1, 1), (2, 2)]);
    assert_eq!(oracle.inspect(|p| p.resets()), 1);
}

#[tokio::test(start_paused = true)]
async fn stream_request_follows_scenario() {
    let env = StubEnvironment::new();
    let scenario = Scenario::builder("landscape", "Walk to the door")
        .portrait(false)
        .image(ImageSource::Url("https://example.com/room.png".to_string()))
        .max_steps(1)
        .build()
        .unwrap();
    let mut runner = ScenarioRunner::builder(env.clone(), ScriptedOracle::repeating(Action::new("wait"))).build();

    runner.run(&scenario).await.unwrap();

    let request = &env.stats().stream_requests[0];
    assert_eq!(request.prompt, "Walk to the door");
    assert!(!request.portrait);
    assert_eq!(
        request.image,
        Some(ImageSource::Url("https://example.com/room.png".to_string()))
    );
}

#[tokio::test(start_paused = true)]
async fn never_done_stops_at_max_steps() {
    let env = StubEnvironment::new();
    let scenario = Scenario::builder("wander", "Explore").max_steps(3).build().unwrap();
    let mut runner =
        ScenarioRunner::builder(env.clone(), ScriptedOracle::repeating(Action::new("turn"))).build();

    let result = runner.run(&scenario).await.unwrap();

    assert_eq!(result.termination_reason, TerminationReason::MaxSteps);
    assert_eq!(result.steps.len(), 3);
    assert!(!result.passed());
    assert_eq!(env.stats().commands.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn zero_max_steps_opens_no_session() {
    let env = StubEnvironment::new();
    let oracle = ScriptedOracle::repeating(Action::new("turn"));
    let scenario = Scenario::builder("empty", "Nothing").max_steps(0).build().unwrap();
    let mut runner = ScenarioRunner::builder(env.clone(), oracle.clone()).build();

    let result = runner.run(&scenario).await.unwrap();

    assert_eq!(result.termination_reason, TerminationReason::MaxSteps);
    assert!(result.steps.is_empty());
    assert_eq!(env.stats().clients_created, 0);
    assert_eq!(oracle.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn zero_timeout_times_out_before_first_decision() {
    let oracle = ScriptedOracle::repeating(Action::new("turn"));
    let scenario = Scenario::builder("instant", "Hurry").timeout_s(0.0).build().unwrap();
    let mut runner = ScenarioRunner::builder(StubEnvironment::new(), oracle.clone()).build();

    let result = runner.run(&scenario).await.unwrap();

    assert_eq!(result.termination_reason, TerminationReason::Timeout);
    assert!(result.steps.is_empty());
    assert_eq!(oracle.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn slow_oracle_runs_out_of_time() {
    let env = StubEnvironment::new();
    let oracle = ScriptedOracle::repeating(Action::new("turn")).with_delay(Duration::from_millis(400));
    let scenario = Scenario::builder("slow", "Think hard")
        .max_steps(10)
        .timeout_s(1.0)
        .build()
        .unwrap();
    let mut runner = ScenarioRunner::builder(env.clone(), oracle).build();

    let result = runner.run(&scenario).await.unwrap();

    assert_eq!(result.termination_reason, TerminationReason::Timeout);
    assert_eq!(result.steps.len(), 2);
    assert!(result.steps.len() < scenario.max_steps);
    assert!(result.error.is_none());
    assert_eq!(env.stats().disconnect_calls, 1);
}

struct BlockingDoneOracle {
    block: Duration,
}

#[async_trait]
impl DecisionOracle for BlockingDoneOracle {
    async fn decide(&mut self, _request: DecisionRequest<'_>) -> Result<Decision> {
        // Returns without yielding, after the deadline has already passed
        std::thread::sleep(self.block);
        Ok(Decision::finished())
    }
}

#[tokio::test]
async fn done_wins_when_the_call_returns_after_the_deadline() {
    let scenario = Scenario::builder("late_done", "Finish").timeout_s(0.05).build().unwrap();
    let oracle = BlockingDoneOracle {
        block: Duration::from_millis(120),
    };
    let mut runner = ScenarioRunner::builder(StubEnvironment::new(), oracle).build();

    let result = runner.run(&scenario).await.unwrap();

    assert_eq!(result.termination_reason, TerminationReason::Done);
    assert_eq!(result.steps.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn totals_equal_sum_of_steps() {
    let oracle = ScriptedOracle::new()
        .then(Decision::new(Action::new("turn")).with_latency(120.0).with_cost(0.002))
        .then(Decision::new(Action::new("turn")).with_latency(80.5).with_cost(0.001))
        .then(Decision::new(Action::new("turn")).with_latency(-5.0).with_cost(f64::NAN))
        .then(Decision::finished().with_latency(10.0).with_cost(0.0005));
    let mut runner = ScenarioRunner::builder(StubEnvironment::new(), oracle).build();

    let result = runner.run(&fetch_cup()).await.unwrap();

    assert_eq!(result.steps.len(), 4);
    assert_eq!(result.steps[2].latency_ms, 0.0);
    assert_eq!(result.steps[2].cost_usd, 0.0);

    let latency: f64 = result.steps.iter().map(|s| s.latency_ms).sum();
    let cost: f64 = result.steps.iter().map(|s| s.cost_usd).sum();
    assert!((result.total_latency_ms - latency).abs() < 1e-9);
    assert!((result.total_cost_usd - cost).abs() < 1e-12);
    assert!((result.total_latency_ms - 210.5).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn failing_stream_start_is_an_error_with_no_steps() {
    let env = StubEnvironment::new().fail_start_stream("no capacity");
    let oracle = ScriptedOracle::from_actions(fetch_cup_path());
    let mut runner = ScenarioRunner::builder(env.clone(), oracle.clone()).build();

    let result = runner.run(&fetch_cup()).await.unwrap();

    assert_eq!(result.termination_reason, TerminationReason::Error);
    let message = result.error.as_deref().unwrap_or_default();
    assert!(message.contains("no capacity"), "unexpected error: {message}");
    assert!(result.steps.is_empty());
    assert_eq!(oracle.call_count(), 0);

    let stats = env.stats();
    assert_eq!(stats.end_stream_calls, 0);
    assert_eq!(stats.disconnect_calls, 1);
}

#[tokio::test(start_paused = true)]
async fn failing_connect_is_an_error() {
    let env = StubEnvironment::new().fail_connect("refused");
    let mut runner = ScenarioRunner::builder(env.clone(), ScriptedOracle::new()).build();

    let result = runner.run(&fetch_cup()).await.unwrap();

    assert_eq!(result.termination_reason, TerminationReason::Error);
    assert!(result.error.as_deref().unwrap_or_default().contains("refused"));
    assert_eq!(env.stats().disconnect_calls, 0);
}

#[tokio::test(start_paused = true)]
async fn failing_environment_provider_is_an_error() {
    let provider = || -> Result<Arc<dyn EnvironmentClient>> {
        Err(ConstructError::Configuration("ODYSSEY_API_KEY not set".to_string()))
    };
    let mut runner = ScenarioRunner::builder(provider, ScriptedOracle::new()).build();

    let result = runner.run(&fetch_cup()).await.unwrap();

    assert_eq!(result.termination_reason, TerminationReason::Error);
    assert!(result.error.as_deref().unwrap_or_default().contains("ODYSSEY_API_KEY"));
    assert!(result.steps.is_empty());
}

#[tokio::test(start_paused = true)]
async fn oracle_failure_is_an_error_after_recorded_steps() {
    let oracle = ScriptedOracle::new()
        .then_action(Action::new("turn"))
        .then_fail("model overloaded");
    let mut runner = ScenarioRunner::builder(StubEnvironment::new(), oracle).build();

    let result = runner.run(&fetch_cup()).await.unwrap();

    assert_eq!(result.termination_reason, TerminationReason::Error);
    assert_eq!(result.steps.len(), 1);
    assert!(result.error.as_deref().unwrap_or_default().contains("model overloaded"));
}

struct TimingOutOracle;

#[async_trait]
impl DecisionOracle for TimingOutOracle {
    async fn decide(&mut self, _request: DecisionRequest<'_>) -> Result<Decision> {
        Err(ConstructError::Timeout("upstream deadline".to_string()))
    }
}

#[tokio::test(start_paused = true)]
async fn oracle_timeout_maps_to_timeout() {
    let mut runner = ScenarioRunner::builder(StubEnvironment::new(), TimingOutOracle).build();

    let result = runner.run(&fetch_cup()).await.unwrap();

    assert_eq!(result.termination_reason, TerminationReason::Timeout);
    assert!(result.steps.is_empty());
}

#[tokio::test(start_paused = true)]
async fn interact_failure_is_an_error() {
    let env = StubEnvironment::new().fail_interact("stream closed by peer");
    let mut runner =
        ScenarioRunner::builder(env.clone(), ScriptedOracle::from_actions(fetch_cup_path())).build();

    let result = runner.run(&fetch_cup()).await.unwrap();

    assert_eq!(result.termination_reason, TerminationReason::Error);
    assert_eq!(result.steps.len(), 1);
    assert_eq!(env.stats().end_stream_calls, 1);
    assert_eq!(env.stats().disconnect_calls, 1);
}

#[tokio::test(start_paused = true)]
async fn observer_sees_every_step() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let mut runner = ScenarioRunner::builder(
        StubEnvironment::new().with_frame_size(3, 2),
        ScriptedOracle::from_actions(fetch_cup_path()),
    )
    .observer(move |index, step, frame| {
        sink.lock()
            .unwrap()
            .push((index, step.action.name.clone(), frame.width()));
        Ok(())
    })
    .build();

    runner.run(&fetch_cup()).await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(
        *seen,
        vec![
            (0, "move_forward".to_string(), 3),
            (1, "pick_up".to_string(), 3),
            (2, "done".to_string(), 3),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn observer_error_fails_the_run() {
    let env = StubEnvironment::new();
    let mut runner = ScenarioRunner::builder(env.clone(), ScriptedOracle::from_actions(fetch_cup_path()))
        .observer(|index, _, _| {
            if index == 1 {
                Err(ConstructError::Other("frame sink full".to_string()))
            } else {
                Ok(())
            }
        })
        .build();

    let result = runner.run(&fetch_cup()).await.unwrap();

    assert_eq!(result.termination_reason, TerminationReason::Error);
    assert_eq!(result.steps.len(), 2);
    assert_eq!(result.error.as_deref(), Some("frame sink full"));
    assert_eq!(env.stats().disconnect_calls, 1);
}

#[tokio::test(start_paused = true)]
async fn failing_evaluator_is_skipped() {
    let mut runner = ScenarioRunner::builder(
        StubEnvironment::new(),
        ScriptedOracle::from_actions(fetch_cup_path()),
    )
    .evaluator(FunctionEvaluator::new("broken", |_, _| {
        Err(ConstructError::evaluator("broken", "judge offline"))
    }))
    .evaluator(ExactPathEvaluator::new())
    .build();

    let result = runner.run(&fetch_cup()).await.unwrap();

    assert_eq!(result.termination_reason, TerminationReason::Done);
    assert_eq!(result.eval_scores.len(), 1);
    assert!(result.eval_scores.contains_key("exact_path"));
    assert!(result.passed());
}

#[tokio::test(start_paused = true)]
async fn close_failure_turns_success_into_error() {
    let env = StubEnvironment::new().fail_disconnect("socket reset");
    let mut runner =
        ScenarioRunner::builder(env.clone(), ScriptedOracle::from_actions(fetch_cup_path())).build();

    let result = runner.run(&fetch_cup()).await.unwrap();

    assert_eq!(result.termination_reason, TerminationReason::Error);
    assert_eq!(result.steps.len(), 3);
    let message = result.error.as_deref().unwrap_or_default();
    assert!(message.starts_with("session close failed"), "unexpected error: {message}");
}

#[tokio::test(start_paused = true)]
async fn close_failure_keeps_the_original_error() {
    let env = StubEnvironment::new()
        .fail_start_stream("no capacity")
        .fail_disconnect("socket reset");
    let mut runner = ScenarioRunner::builder(env, ScriptedOracle::new()).build();

    let result = runner.run(&fetch_cup()).await.unwrap();

    assert_eq!(result.termination_reason, TerminationReason::Error);
    assert!(result.error.as_deref().unwrap_or_default().contains("no capacity"));
}

#[tokio::test(start_paused = true)]
async fn invalid_scenario_is_rejected_before_any_session() {
    let env = StubEnvironment::new();
    let mut scenario = fetch_cup();
    scenario.timeout_s = -1.0;
    let mut runner = ScenarioRunner::builder(env.clone(), ScriptedOracle::new()).build();

    let err = runner.run(&scenario).await.unwrap_err();

    assert!(matches!(err, ConstructError::InvalidScenario(_)));
    assert_eq!(env.stats().clients_created, 0);
}

#[tokio::test(start_paused = true)]
async fn accumulate_prompt_chains_commands() {
    let env = StubEnvironment::new();
    let mut runner = ScenarioRunner::builder(env.clone(), ScriptedOracle::from_actions(fetch_cup_path()))
        .command_builder(accumulate_prompt)
        .build();

    runner.run(&fetch_cup()).await.unwrap();

    let commands = env.stats().commands;
    assert_eq!(commands[0], "Pick up the red cup\n\nmove_forward distance=1");
    assert_eq!(
        commands[1],
        "Pick up the red cup\n\nmove_forward distance=1\n\npick_up object=cup"
    );
}

#[tokio::test(start_paused = true)]
async fn consecutive_runs_reset_the_oracle() {
    let env = StubEnvironment::new();
    let oracle = ScriptedOracle::from_actions(fetch_cup_path());
    let mut runner = ScenarioRunner::builder(env.clone(), oracle.clone())
        .evaluator(ExactPathEvaluator::new())
        .build();

    let scenarios = [fetch_cup(), fetch_cup()];
    let report = runner.run_all(&scenarios).await.unwrap();

    assert_eq!(report.len(), 2);
    assert!(report.all_passed());
    assert_ne!(report.results()[0].run_id, report.results()[1].run_id);
    assert_eq!(oracle.inspect(|p| p.resets()), 2);
    assert_eq!(env.stats().clients_created, 2);

    runner.close().await.unwrap();
    assert_eq!(oracle.inspect(|p| p.closes()), 1);
}
