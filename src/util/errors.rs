use thiserror::Error;

/// Result alias used throughout the crate.
pub type ChatResult<T> = Result<T, ChatError>;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Session not found: {0}")]
    NotFound(String),

    /// A turn is exclusive per session; starting a second one is rejected.
    #[error("A turn is already in flight for session: {0}")]
    TurnInFlight(String),

    /// The channel to the backend could not be opened or was cut mid-stream.
    #[error("Failed to reach the research backend: {0}")]
    Transport(String),

    /// The backend sent an explicit `error` event; the message is verbatim.
    #[error("{0}")]
    Stream(String),

    /// The stream ended without the backend ever producing content.
    #[error("The backend returned no response. Try rephrasing your question or sending it again.")]
    EmptyResponse,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
