use thiserror::Error;

/// Errors returned by noises operations.
#[derive(Error, Debug)]
pub enum NoisesError {
    /// The backend returned a non-success HTTP status.
    #[error("Backend returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The backend rejected the request with a readable reason.
    #[error("{0}")]
    Rejected(String),

    /// The response from the backend was missing expected fields.
    #[error("{0}")]
    InvalidResponse(String),

    /// Network-level request failure with context.
    #[error("{context}: {source}")]
    Network {
        context: String,
        source: reqwest::Error,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Timed out waiting for the backend to answer a generation request.
    #[error("Generation timed out")]
    Timeout,

    /// The in-flight generation was cancelled by the user.
    #[error("Generation was cancelled")]
    Cancelled,

    /// Local key-value store failure.
    #[error("Store error: {0}")]
    Store(String),

    /// The audio artifact could not be opened or controlled.
    #[error("Playback error: {0}")]
    Playback(String),

    /// Reveal or drag export could not be handed to the host.
    #[error("Export error: {0}")]
    Export(String),

    #[error("{0}")]
    Other(String),
}

impl From<rusqlite::Error> for NoisesError {
    fn from(err: rusqlite::Error) -> Self {
        NoisesError::Store(err.to_string())
    }
}

impl From<anyhow::Error> for NoisesError {
    fn from(err: anyhow::Error) -> Self {
        NoisesError::Store(format!("{:#}", err))
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, NoisesError>;
