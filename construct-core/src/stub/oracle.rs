//! Scripted decision oracle

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::lock;
use crate::error::{ConstructError, Result};
use crate::model::Action;
use crate::oracle::{Decision, DecisionOracle, DecisionRequest};

#[derive(Debug, Clone)]
enum ScriptStep {
    Decide(Decision),
    Fail(String),
}

/// What a [`ScriptedOracle`] was asked, shared with its clones
#[derive(Debug, Default)]
pub struct OracleRecord {
    calls: Vec<(usize, usize)>,
    resets: usize,
    closes: usize,
}

impl OracleRecord {
    /// `(step_index, history_len)` of every decide call, in order
    pub fn calls(&self) -> &[(usize, usize)] {
        &self.calls
    }

    pub fn resets(&self) -> usize {
        self.resets
    }

    pub fn closes(&self) -> usize {
        self.closes
    }
}

/// Oracle replaying a fixed script of decisions.
///
/// Once the script is exhausted the oracle repeats its fallback decision, or
/// fails with `Decision` when none is set. `reset` rewinds the script, so one
/// oracle replays the same script for every run.
#[derive(Clone)]
pub struct ScriptedOracle {
    script: Vec<ScriptStep>,
    fallback: Option<Decision>,
    delay: Option<Duration>,
    cursor: usize,
    record: Arc<Mutex<OracleRecord>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self {
            script: Vec::new(),
            fallback: None,
            delay: None,
            cursor: 0,
            record: Arc::new(Mutex::new(OracleRecord::default())),
        }
    }

    /// Script that takes `actions` in order; a `done` action ends the run
    pub fn from_actions(actions: impl IntoIterator<Item = Action>) -> Self {
        actions
            .into_iter()
            .fold(Self::new(), |oracle, action| oracle.then_action(action))
    }

    /// Oracle that never finishes
    pub fn repeating(action: Action) -> Self {
        Self::new().otherwise(Decision::new(action).with_done(false))
    }

    pub fn then(mut self, decision: Decision) -> Self {
        self.script.push(ScriptStep::Decide(decision));
        self
    }

    pub fn then_action(self, action: Action) -> Self {
        self.then(Decision::new(action))
    }

    pub fn then_fail(mut self, message: impl Into<String>) -> Self {
        self.script.push(ScriptStep::Fail(message.into()));
        self
    }

    /// Decision returned after the script runs out
    pub fn otherwise(mut self, decision: Decision) -> Self {
        self.fallback = Some(decision);
        self
    }

    /// Sleep this long inside every decide call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Inspect the calls made so far
    pub fn inspect<R>(&self, f: impl FnOnce(&OracleRecord) -> R) -> R {
        f(&lock(&self.record))
    }

    pub fn call_count(&self) -> usize {
        self.inspect(|p| p.calls.len())
    }
}

impl Default for ScriptedOracle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DecisionOracle for ScriptedOracle {
    async fn decide(&mut self, request: DecisionRequest<'_>) -> Result<Decision> {
        lock(&self.record)
            .calls
            .push((request.step_index, request.history.len()));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let step = self.script.get(self.cursor).cloned();
        self.cursor += 1;

        match step {
            Some(ScriptStep::Decide(decision)) => Ok(decision),
            Some(ScriptStep::Fail(message)) => Err(ConstructError::Decision(message)),
            None => self.fallback.clone().ok_or_else(|| {
                ConstructError::Decision(format!(
                    "script exhausted after {} decisions",
                    self.script.len()
                ))
            }),
        }
    }

    fn reset(&mut self) {
        self.cursor = 0;
        lock(&self.record).resets += 1;
    }

    async fn close(&mut self) -> Result<()> {
        lock(&self.record).closes += 1;
        Ok(())
    }
}
