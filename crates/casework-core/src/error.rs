use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaseworkError {
    #[error("not initialized: run 'casework init'")]
    NotInitialized,

    #[error("invalid execution context: {0}")]
    InvalidContext(String),

    #[error("invalid retry input: {0}")]
    InvalidRetryInput(String),

    #[error("invalid review input: {0}")]
    InvalidReviewInput(String),

    #[error("invalid stage: {0}")]
    InvalidStage(String),

    #[error("unknown specialist: {0}")]
    UnknownSpecialist(String),

    #[error("invalid investigation variant: {0}")]
    InvalidVariant(String),

    #[error("confidence {value} out of range [{min}, {max}]")]
    ConfidenceOutOfRange { value: f64, min: f64, max: f64 },

    #[error("invalid case id '{0}': must be alphanumeric with '-' or '_'")]
    InvalidCaseId(String),

    #[error("case not found: {0}")]
    CaseNotFound(String),

    #[error("case '{0}' already has a run in flight")]
    RunInFlight(String),

    #[error("malformed '{action_type}' action {id}: {reason}")]
    InvalidAction {
        id: String,
        action_type: String,
        reason: String,
    },

    #[error("rule load failed: {0}")]
    RuleLoad(String),

    #[error("capability '{capability}' failed: {reason}")]
    Capability { capability: String, reason: String },

    #[error("finding rejected by schema '{schema}': {errors}")]
    SchemaRejected { schema: String, errors: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CaseworkError>;

/// Reject confidence values outside `[min, max]` instead of clamping them.
pub fn check_range(value: f64, min: f64, max: f64) -> Result<f64> {
    if value.is_nan() || value < min || value > max {
        return Err(CaseworkError::ConfidenceOutOfRange { value, min, max });
    }
    Ok(value)
}
