//! Error types for the SDS data source

/// Result type alias
pub type Result<T> = std::result::Result<T, SdsError>;

/// Data source errors
#[derive(Debug, thiserror::Error)]
pub enum SdsError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("{status}: {status_text}")]
    HttpStatus { status: u16, status_text: String },

    #[error("Invalid stream path '{0}': {1}")]
    InvalidStreamPath(String, String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid option: {0}")]
    InvalidOption(String),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
}

impl From<reqwest::Error> for SdsError {
    fn from(err: reqwest::Error) -> Self {
        SdsError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for SdsError {
    fn from(err: serde_json::Error) -> Self {
        SdsError::Decode(err.to_string())
    }
}
