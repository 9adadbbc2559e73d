use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Transcription error: {0}")]
    Transcription(String),

    #[error("Synthesis error: {0}")]
    Synthesis(String),

    #[error("Completion error: {0}")]
    Completion(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RelayError {
    /// Whether the failure was caused by the caller rather than a downstream provider.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Authentication(_) | Self::InvalidPayload(_))
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
