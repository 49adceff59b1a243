//! Error types for Construct operations

/// Result type for Construct operations
pub type Result<T> = std::result::Result<T, ConstructError>;

/// Error types for the Construct harness
#[derive(Debug, thiserror::Error)]
pub enum ConstructError {
    /// Environment transport could not be established
    #[error("Connection error: {0}")]
    Connection(String),

    /// An environment session operation failed
    #[error("Session error: {0}")]
    Session(String),

    /// A wait or decision call exceeded the remaining time budget
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The decision oracle failed to produce a decision
    #[error("Decision failure: {0}")]
    Decision(String),

    /// An evaluator failed while scoring a run
    #[error("Evaluator '{name}' failed: {message}")]
    Evaluator {
        /// Evaluator name
        name: String,
        /// Failure description
        message: String,
    },

    /// Scenario construction was invalid
    #[error("Invalid scenario: {0}")]
    InvalidScenario(String),

    /// Frame buffer did not match its declared dimensions
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// LLM provider error
    #[error("LLM error: {0}")]
    Llm(String),

    /// Model output could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The run was cancelled by the host
    #[error("Run cancelled")]
    Cancelled,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl ConstructError {
    /// Build an evaluator failure
    pub fn evaluator(name: impl Into<String>, message: impl Into<String>) -> Self {
        ConstructError::Evaluator {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Whether this error is a time budget expiry rather than a failure
    pub fn is_timeout(&self) -> bool {
        matches!(self, ConstructError::Timeout(_))
    }
}

impl From<tokio::time::error::Elapsed> for ConstructError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        ConstructError::Timeout("time budget exhausted".to_string())
    }
}

impl From<String> for ConstructError {
    fn from(s: String) -> Self {
        ConstructError::Other(s)
    }
}

impl From<&str> for ConstructError {
    fn from(s: &str) -> Self {
        ConstructError::Other(s.to_string())
    }
}

impl From<anyhow::Error> for ConstructError {
    fn from(err: anyhow::Error) -> Self {
        ConstructError::Other(err.to_string())
    }
}
