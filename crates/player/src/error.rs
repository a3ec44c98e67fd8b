use stepcast_core::{StepError, TimelineError};
use stepcast_runtime_config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    #[error("visit {index} failed: {source}")]
    Step {
        index: usize,
        #[source]
        source: StepError,
    },

    #[error("visit {index} is out of range (timeline has {len} visits)")]
    VisitOutOfRange { index: usize, len: usize },

    #[error("manual visits require interactive mode")]
    NotInteractive,

    #[error("timeline error: {0}")]
    Timeline(#[from] TimelineError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, PlayerError>;
