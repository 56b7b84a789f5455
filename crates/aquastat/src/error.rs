use thiserror::Error;

#[derive(Debug, Error)]
pub enum StatError {
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Backend error: {0}")]
    BackendError(String),

    /// Nothing stored yet for the key. Expected for first-time keys.
    #[error("Metrics not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid observation: {0}")]
    InvalidObservation(String),
}

impl StatError {
    /// Whether this is the expected "nothing stored yet" case.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StatError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, StatError>;
