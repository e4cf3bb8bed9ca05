use thiserror::Error;

/// Failures reported by the brokerage backend or the transport reaching it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Entity not found")]
    NotFound,

    #[error("Unauthorized")]
    Unauthorized,

    /// The backend refused the request, typically an illegal transition.
    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

pub type BackendResult<T> = Result<T, BackendError>;

impl BackendError {
    /// Maps a non-success HTTP status and its body.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            400 => BackendError::Rejected(body),
            401 | 403 => BackendError::Unauthorized,
            404 => BackendError::NotFound,
            _ => BackendError::Status { status, body },
        }
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::Decode(err.to_string())
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            BackendError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            BackendError::from_status(status.as_u16(), err.to_string())
        } else if err.is_connect() || err.is_timeout() || err.is_request() {
            BackendError::Transport(err.to_string())
        } else {
            BackendError::Unexpected(err.to_string())
        }
    }
}
