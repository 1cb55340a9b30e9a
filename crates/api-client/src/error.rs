//! Error types for the authenticated API client
//!
//! Three kinds of failure reach application code:
//! - `Domain`: the server explained the failure; show `message` verbatim
//! - `Status` / `Transport` / `Decode`: something broke below the API
//!   contract; show a generic fallback
//! - `RefreshFailed` / `RefreshCancelled`: the session could not be renewed;
//!   sign-out has already been requested by the time the caller sees it
//!
//! The enum is `Clone` because a single refresh outcome is delivered to every
//! request queued behind it.

#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("{message}")]
    Domain { status: u16, message: String },

    #[error("request failed with status {status}")]
    Status { status: u16, body: String },

    #[error("HTTP request failed: {0}")]
    Transport(String),

    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("token refresh cancelled")]
    RefreshCancelled,

    #[error("invalid response body: {0}")]
    Decode(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("credential store error: {0}")]
    Store(String),
}

impl Error {
    /// Whether the server supplied a message meant for the user.
    pub fn is_domain(&self) -> bool {
        matches!(self, Error::Domain { .. })
    }

    /// HTTP status of the failed response, if there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Domain { status, .. } | Error::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Text to show the user: the server's message, or `fallback`.
    pub fn user_message<'a>(&'a self, fallback: &'a str) -> &'a str {
        match self {
            Error::Domain { message, .. } => message,
            _ => fallback,
        }
    }
}

impl From<session_store::Error> for Error {
    fn from(err: session_store::Error) -> Self {
        match err {
            session_store::Error::Http(msg) => Error::Transport(msg),
            session_store::Error::Rejected { status, message } => {
                Error::Domain { status, message }
            }
            session_store::Error::InvalidResponse(msg) => Error::Decode(msg),
            other => Error::Store(other.to_string()),
        }
    }
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;
