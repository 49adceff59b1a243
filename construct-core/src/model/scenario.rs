//! Declarative test scenarios

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use super::action::Action;
use super::frame::Frame;
use crate::config::ScenarioDefaults;
use crate::error::{ConstructError, Result};

/// Default step budget
pub const DEFAULT_MAX_STEPS: usize = 20;

/// Default wall-clock budget in seconds
pub const DEFAULT_TIMEOUT_S: f64 = 120.0;

/// Initial image used to seed the environment episode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageSource {
    /// Remote image location
    Url(String),
    /// Local image file
    Path(PathBuf),
    /// Encoded image bytes (PNG, JPEG, ...)
    Bytes(Vec<u8>),
    /// Raw RGB frame
    Frame(Frame),
}

/// Tool the policy may call, described for LLM-backed oracles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the tool parameters
    #[serde(default)]
    pub parameters: serde_json::Value,
}

impl ToolSpec {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// A test scenario describing an expected robot behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Unique scenario name
    pub name: String,

    /// Natural-language task given to the environment and the policy
    pub prompt: String,

    /// Reference action sequence
    #[serde(default)]
    pub expected_actions: Vec<Action>,

    /// Free-text success criteria for outcome judges
    #[serde(default)]
    pub success_criteria: String,

    /// Optional seed image for the episode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageSource>,

    /// Portrait (true) or landscape stream
    #[serde(default = "default_portrait")]
    pub portrait: bool,

    /// Maximum number of decisions
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    /// Wall-clock budget for the whole run, in seconds
    #[serde(default = "default_timeout_s")]
    pub timeout_s: f64,

    /// System prompt override for the policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    #[serde(default)]
    pub tags: BTreeSet<String>,

    /// Tool vocabulary override for the policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolSpec>>,
}

fn default_portrait() -> bool {
    true
}

fn default_max_steps() -> usize {
    DEFAULT_MAX_STEPS
}

fn default_timeout_s() -> f64 {
    DEFAULT_TIMEOUT_S
}

impl Scenario {
    /// Start building a scenario with the built-in defaults
    pub fn builder(name: impl Into<String>, prompt: impl Into<String>) -> ScenarioBuilder {
        ScenarioBuilder::new(name, prompt)
    }

    /// Start building a scenario with configured defaults
    pub fn builder_with_defaults(
        name: impl Into<String>,
        prompt: impl Into<String>,
        defaults: &ScenarioDefaults,
    ) -> ScenarioBuilder {
        ScenarioBuilder::new(name, prompt)
            .max_steps(defaults.max_steps)
            .timeout(defaults.timeout)
            .portrait(defaults.portrait)
    }

    /// Check construction invariants.
    ///
    /// # Errors
    ///
    /// Returns `InvalidScenario` for an empty name or a negative/non-finite timeout.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ConstructError::InvalidScenario(
                "scenario name must not be empty".to_string(),
            ));
        }
        if !self.timeout_s.is_finite() || self.timeout_s < 0.0 {
            return Err(ConstructError::InvalidScenario(format!(
                "scenario '{}' has invalid timeout_s {}",
                self.name, self.timeout_s
            )));
        }
        Duration::try_from_secs_f64(self.timeout_s).map_err(|e| {
            ConstructError::InvalidScenario(format!(
                "scenario '{}' timeout_s out of range: {}",
                self.name, e
            ))
        })?;
        Ok(())
    }

    /// Wall-clock budget; zero if the scenario failed validation
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_s).unwrap_or(Duration::ZERO)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

/// Builder for [`Scenario`]
#[derive(Debug, Clone)]
pub struct ScenarioBuilder {
    scenario: Scenario,
}

impl ScenarioBuilder {
    fn new(name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            scenario: Scenario {
                name: name.into(),
                prompt: prompt.into(),
                expected_actions: Vec::new(),
                success_criteria: String::new(),
                image: None,
                portrait: default_portrait(),
                max_steps: DEFAULT_MAX_STEPS,
                timeout_s: DEFAULT_TIMEOUT_S,
                system_prompt: None,
                tags: BTreeSet::new(),
                tools: None,
            },
        }
    }

    pub fn expected_action(mut self, action: Action) -> Self {
        self.scenario.expected_actions.push(action);
        self
    }

    pub fn expected_actions(mut self, actions: impl IntoIterator<Item = Action>) -> Self {
        self.scenario.expected_actions.extend(actions);
        self
    }

    pub fn success_criteria(mut self, criteria: impl Into<String>) -> Self {
        self.scenario.success_criteria = criteria.into();
        self
    }

    pub fn image(mut self, image: ImageSource) -> Self {
        self.scenario.image = Some(image);
        self
    }

    pub fn portrait(mut self, portrait: bool) -> Self {
        self.scenario.portrait = portrait;
        self
    }

    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.scenario.max_steps = max_steps;
        self
    }

    pub fn timeout_s(mut self, timeout_s: f64) -> Self {
        self.scenario.timeout_s = timeout_s;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.scenario.timeout_s = timeout.as_secs_f64();
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.scenario.system_prompt = Some(prompt.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.scenario.tags.insert(tag.into());
        self
    }

    pub fn tool(mut self, tool: ToolSpec) -> Self {
        self.scenario.tools.get_or_insert_with(Vec::new).push(tool);
        self
    }

    /// Validate and build the scenario
    pub fn build(self) -> Result<Scenario> {
        self.scenario.validate()?;
        Ok(self.scenario)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let scenario = Scenario::builder("basic", "pick up the cup").build().unwrap();

        assert_eq!(scenario.max_steps, 20);
        assert_eq!(scenario.timeout_s, 120.0);
        assert!(scenario.portrait);
        assert!(scenario.expected_actions.is_empty());
        assert_eq!(scenario.timeout(), Duration::from_secs(120));
    }

    #[test]
    fn test_builder_rejects_empty_name() {
        let err = Scenario::builder("  ", "prompt").build().unwrap_err();
        assert!(matches!(err, ConstructError::InvalidScenario(_)));
    }

    #[test]
    fn test_builder_rejects_bad_timeout() {
        assert!(Scenario::builder("a", "p").timeout_s(-1.0).build().is_err());
        assert!(Scenario::builder("a", "p").timeout_s(f64::NAN).build().is_err());
        assert!(Scenario::builder("a", "p").timeout_s(f64::INFINITY).build().is_err());
        assert!(Scenario::builder("a", "p").timeout_s(0.0).build().is_ok());
    }

    #[test]
    fn test_tags_are_a_set() {
        let scenario = Scenario::builder("tagged", "p")
            .tag("smoke")
            .tag("smoke")
            .tag("kitchen")
            .build()
            .unwrap();

        assert_eq!(scenario.tags.len(), 2);
        assert!(scenario.has_tag("kitchen"));
    }

    #[test]
    fn test_deserialize_applies_defaults() {
        let scenario: Scenario =
            serde_json::from_str(r#"{"name": "json", "prompt": "walk to the door"}"#).unwrap();

        assert_eq!(scenario.max_steps, DEFAULT_MAX_STEPS);
        assert_eq!(scenario.timeout_s, DEFAULT_TIMEOUT_S);
        assert!(scenario.portrait);
        assert!(scenario.tools.is_none());
    }

    #[test]
    fn test_builder_with_configured_defaults() {
        let defaults = ScenarioDefaults {
            max_steps: 5,
            timeout: Duration::from_secs(30),
            portrait: false,
        };
        let scenario = Scenario::builder_with_defaults("cfg", "p", &defaults)
            .build()
            .unwrap();

        assert_eq!(scenario.max_steps, 5);
        assert_eq!(scenario.timeout_s, 30.0);
        assert!(!scenario.portrait);
    }
}
