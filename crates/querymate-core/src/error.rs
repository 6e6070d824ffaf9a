use std::path::PathBuf;

/// Core error types for QueryMate.
#[derive(Debug, thiserror::Error)]
pub enum QueryMateError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Errors from a single model candidate, plus the exhaustion case.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Model call timed out after {0}ms")]
    Timeout(u64),

    #[error("No API key configured for provider")]
    NoApiKey,

    #[error("All model candidates failed: {0}")]
    AllModelsFailed(#[source] Box<ProviderError>),

    #[error("{0}")]
    Other(String),
}

impl ProviderError {
    /// True once the whole candidate list has been exhausted.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, ProviderError::AllModelsFailed(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Context collection is already complete")]
    AlreadyComplete,

    #[error("Session not found or not complete")]
    NotComplete,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to read record: {0}")]
    Read(String),

    #[error("Failed to write record: {0}")]
    Write(String),

    #[error("Record already exists: {0}")]
    Conflict(String),
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Password hashing failed: {0}")]
    Hash(String),
}

pub type Result<T> = std::result::Result<T, QueryMateError>;
