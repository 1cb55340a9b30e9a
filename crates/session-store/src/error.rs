//! Error types for session storage and session endpoints

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The server answered with a non-success status. `message` is the
    /// server's own explanation when the body carried one.
    #[error("session endpoint returned {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("invalid session response: {0}")]
    InvalidResponse(String),

    #[error("credential parse error: {0}")]
    CredentialParse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Result alias for session-store operations.
pub type Result<T> = std::result::Result<T, Error>;
