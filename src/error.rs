//! Error type shared by every stage of a digest run.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DigestError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Invalid timestamp {value:?}: {reason}")]
    Timestamp { value: String, reason: String },

    #[error("Unreadable store {path}: {reason}")]
    Store { path: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl DigestError {
    /// Errors that only affect the conversation being delivered. The driver
    /// logs these and moves on; anything else aborts the run.
    pub fn is_delivery_recoverable(&self) -> bool {
        matches!(
            self,
            DigestError::Http(_)
                | DigestError::Status { .. }
                | DigestError::Json(_)
                | DigestError::MalformedResponse(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, DigestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_recoverable_split() {
        assert!(DigestError::Status { status: 502, body: String::new() }.is_delivery_recoverable());
        assert!(DigestError::MalformedResponse("list".to_string()).is_delivery_recoverable());
        assert!(!DigestError::Config("missing".to_string()).is_delivery_recoverable());
        assert!(!DigestError::Store {
            path: "data/processed_conversations.json".to_string(),
            reason: "EOF".to_string(),
        }
        .is_delivery_recoverable());
        assert!(!DigestError::Timestamp {
            value: "nope".to_string(),
            reason: "bad".to_string(),
        }
        .is_delivery_recoverable());
    }
}
