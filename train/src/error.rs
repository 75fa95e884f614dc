use network::NetworkError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TrainError>;

#[derive(Debug, Error)]
pub enum TrainError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("Invalid training configuration: {0}")]
    InvalidConfig(String),

    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Expected one shard per replica ({expected}), got {actual}")]
    ReplicaMismatch { expected: usize, actual: usize },

    #[error("Batch of {batch} does not split evenly across {replicas} replicas")]
    UnevenSplit { batch: usize, replicas: usize },

    #[error("Checkpoint not found: {0}")]
    CheckpointNotFound(String),

    #[error("Checkpoint error at {path}: {reason}")]
    Checkpoint { path: String, reason: String },
}

impl TrainError {
    pub(crate) fn checkpoint(path: impl AsRef<std::path::Path>, reason: impl ToString) -> Self {
        Self::Checkpoint {
            path: path.as_ref().display().to_string(),
            reason: reason.to_string(),
        }
    }
}
