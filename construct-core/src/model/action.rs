//! Discrete commands issued to the environment

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Action name a policy uses to signal task completion
pub const DONE_ACTION: &str = "done";

/// Ordered action parameters (insertion order is preserved)
pub type Parameters = serde_json::Map<String, Value>;

/// A single robot action (tool call)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Action {
    /// Action name, e.g. `move_forward`
    pub name: String,

    /// Scalar parameters in the order the policy produced them
    #[serde(default)]
    pub parameters: Parameters,

    /// Literal command text; overrides the canonical form when non-empty
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub raw_text: String,
}

impl Action {
    /// Create an action without parameters
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Parameters::new(),
            raw_text: String::new(),
        }
    }

    /// The completion action
    pub fn done() -> Self {
        Self::new(DONE_ACTION)
    }

    /// Add a parameter
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Replace all parameters
    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// Set the literal command text
    pub fn with_raw_text(mut self, raw_text: impl Into<String>) -> Self {
        self.raw_text = raw_text.into();
        self
    }

    /// Whether this is the completion action
    pub fn is_done(&self) -> bool {
        self.name == DONE_ACTION
    }

    /// Command text sent to the environment.
    ///
    /// Uses `raw_text` verbatim when set, otherwise `name k1=v1 k2=v2`.
    pub fn to_command(&self) -> String {
        if !self.raw_text.is_empty() {
            return self.raw_text.clone();
        }

        let mut parts = Vec::with_capacity(self.parameters.len() + 1);
        parts.push(self.name.clone());
        for (key, value) in &self.parameters {
            parts.push(format!("{}={}", key, scalar_text(value)));
        }
        parts.join(" ")
    }

    /// Compact `name({...})` rendering used in judge prompts
    pub fn describe(&self) -> String {
        format!("{}({})", self.name, Value::Object(self.parameters.clone()))
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
