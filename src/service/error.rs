use thiserror::Error;

/// Failures talking to the processing service
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ServiceError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("service rejected request ({status}): {}", describe(.message))]
    Rejected { status: u16, message: Option<String> },

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ServiceError {
    /// Message supplied by the service itself, if any.
    pub fn remote_message(&self) -> Option<&str> {
        match self {
            ServiceError::Rejected { message, .. } => message.as_deref(),
            ServiceError::NotFound(message) => Some(message),
            _ => None,
        }
    }

    /// Network-level failure, as opposed to an answer from the service.
    pub fn is_transport(&self) -> bool {
        matches!(self, ServiceError::Transport(_) | ServiceError::Timeout)
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            ServiceError::Timeout
        } else if value.is_decode() {
            ServiceError::Decode(value.to_string())
        } else {
            ServiceError::Transport(value.to_string())
        }
    }
}

fn describe(message: &Option<String>) -> &str {
    message.as_deref().unwrap_or("no details")
}
