use thiserror::Error;

pub type Result<T> = std::result::Result<T, NetworkError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NetworkError {
    #[error(
        "If layers per block is a list, its length must be dense_blocks + 1 (expected {expected}, got {actual})"
    )]
    InvalidLayerSchedule { expected: usize, actual: usize },

    #[error("Invalid network configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid input: expected {expected}, got {actual}")]
    InvalidInput { expected: String, actual: String },
}

impl NetworkError {
    pub(crate) fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig(reason.into())
    }

    pub(crate) fn invalid_input(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::InvalidInput {
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}
