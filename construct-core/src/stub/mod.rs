//! Deterministic doubles for offline runs
//!
//! [`StubEnvironment`] renders synthetic frames and records every lifecycle
//! call. [`ScriptedOracle`] replays a fixed list of decisions. Both hand out
//! cloneable handles so a test can keep inspecting them after giving one to a
//! [`ScenarioRunner`](crate::runner::ScenarioRunner).

mod environment;
mod oracle;

pub use environment::{FrameDelivery, StubEnvironment, StubStats};
pub use oracle::{OracleRecord, ScriptedOracle};

/// Lock a std mutex, recovering the data if a panicking holder poisoned it
pub(crate) fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
