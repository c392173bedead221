use thiserror::Error;

/// Every failure the widget can surface to the user.
///
/// `Clone + PartialEq` so that an error can be stored in component state
/// and compared by Yew when deciding whether to re-render.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AssistantError {
    /// Transport failure, or every available transport was exhausted.
    #[error("{0}")]
    Network(String),

    /// Non-2xx response. `message` comes from the body when the server gave one.
    #[error("HTTP {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("{0}")]
    Upload(String),

    #[error("{0}")]
    JobCreation(String),

    #[error("{0}")]
    JobStatus(String),

    /// The backend reported the generation job as failed.
    #[error("{0}")]
    JobFailed(String),

    /// A single stream frame could not be decoded. Never fatal to the stream.
    #[error("Malformed stream frame: {0}")]
    StreamParse(String),

    #[error("Unrecognized response shape: {0}")]
    ResponseShape(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("Request cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for AssistantError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl From<serde_json::Error> for AssistantError {
    fn from(err: serde_json::Error) -> Self {
        Self::ResponseShape(err.to_string())
    }
}

impl AssistantError {
    /// The message without the status prefix, as shown in the UI.
    pub fn user_message(&self) -> String {
        match self {
            Self::HttpStatus { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

pub type Result<T, E = AssistantError> = std::result::Result<T, E>;
