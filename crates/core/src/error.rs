#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StepError {
    #[error("invalid geometry in step '{step}': {reason}")]
    InvalidGeometry { step: String, reason: String },

    #[error("branch set '{0}' has no branches")]
    EmptyBranchSet(String),

    #[error("surface error: {0}")]
    Surface(String),
}

#[derive(Debug, thiserror::Error)]
pub enum TimelineError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("visit at position {position} declares index {index}")]
    IndexMismatch { position: usize, index: usize },
}
