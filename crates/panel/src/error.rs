//! Panel client error types.

use thiserror::Error;

pub type PanelResult<T> = Result<T, PanelError>;

/// Errors from the panel control-plane API.
///
/// `Validation` is surfaced to the caller untouched (the registration
/// path shows it to the end user); everything else is recoverable
/// operator territory.
#[derive(Debug, Error)]
pub enum PanelError {
    #[error("panel configuration error: {0}")]
    Config(String),

    #[error("panel rejected the payload: {0}")]
    Validation(String),

    #[error("panel authentication failed (check PANEL_API_KEY)")]
    Auth,

    #[error("panel resource not found: {0}")]
    NotFound(String),

    #[error("panel request timed out")]
    Timeout,

    #[error("panel API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("malformed panel response: {0}")]
    MalformedResponse(String),

    #[error("panel transport error: {0}")]
    Transport(String),

    #[error("could not allocate a unique panel username for '{0}'")]
    UsernameExhausted(String),
}

impl From<reqwest::Error> for PanelError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            PanelError::Timeout
        } else if e.is_decode() {
            PanelError::MalformedResponse(e.to_string())
        } else {
            PanelError::Transport(e.to_string())
        }
    }
}
