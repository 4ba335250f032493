//! Error handling

use thiserror::Error;

pub type DefenseResult<T> = Result<T, DefenseError>;

#[derive(Error, Debug)]
pub enum DefenseError {
    // Resource errors
    #[error("Response rule not found: {0}")]
    RuleNotFound(String),

    #[error("Replay scenario not found: {0}")]
    ScenarioNotFound(String),

    #[error("Recorded event not found: {0}")]
    EventNotFound(String),

    #[error("Replay execution not found: {0}")]
    ReplayNotFound(String),

    #[error("Learning rule not found: {0}")]
    LearningRuleNotFound(String),

    // Validation errors
    #[error("Invalid scenario: {0}")]
    InvalidScenario(String),

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Unknown threshold: {0}")]
    UnknownThreshold(String),

    // Replay / learning
    #[error("Replay {execution_id} failed: {reason}")]
    ReplayFailed { execution_id: String, reason: String },

    #[error("No replay executions available for training")]
    NoTrainingData,

    #[error("Job '{0}' is already running")]
    JobAlreadyRunning(String),

    // Infrastructure
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Alert channel error: {0}")]
    Channel(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DefenseError {
    /// Whether the error refers to an unknown id
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DefenseError::RuleNotFound(_)
                | DefenseError::ScenarioNotFound(_)
                | DefenseError::EventNotFound(_)
                | DefenseError::ReplayNotFound(_)
                | DefenseError::LearningRuleNotFound(_)
        )
    }
}
