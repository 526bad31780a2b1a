use thiserror::Error;

pub type CompletionResult<T> = Result<T, CompletionError>;

/// Failures of a completion request
///
/// `Display` is the text shown to the user in the error panel.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompletionError {
    /// Connectivity, DNS or request-level transport failure
    #[error("Network error. Please check your connection and try again.")]
    NetworkUnavailable,

    /// Endpoint answered with a non-success status
    #[error("API Error: {status} - {message}")]
    RequestFailed { status: u16, message: String },

    /// Success status but the body did not carry a reply
    #[error("Invalid response format from API")]
    MalformedResponse,

    /// Anything else; the detail only goes to the log
    #[error("An unexpected error occurred. Please try again.")]
    UnknownFailure(String),

    /// No credential in the environment
    #[error("API key not configured. Set OPENROUTER_API_KEY and restart.")]
    MissingApiKey,
}

impl CompletionError {
    pub fn is_network(&self) -> bool {
        matches!(self, CompletionError::NetworkUnavailable)
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            CompletionError::RequestFailed { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for CompletionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() || err.is_request() || err.is_body() {
            CompletionError::NetworkUnavailable
        } else {
            CompletionError::UnknownFailure(err.to_string())
        }
    }
}
