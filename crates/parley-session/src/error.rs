//! Error types for the session engine.
//!
//! Per-frame parse failures never surface here; the decoder and interpreter
//! drop them. These errors cover collaborator calls, the durable area, and
//! misuse of the controller.

use parley_store::StoreError;
use thiserror::Error;

use crate::lifecycle::Binding;

/// A result type using `SessionError`.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors that can occur while driving a chat session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A collaborator answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the error body.
        message: String,
    },

    /// A response body could not be parsed.
    #[error("failed to parse response: {0}")]
    Parse(String),

    /// The assistant stream broke mid-flight.
    #[error("stream transport failed: {0}")]
    Transport(String),

    /// The durable area failed.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// A pending intent could not be encoded.
    #[error("intent encoding error: {0}")]
    Intent(#[from] serde_json::Error),

    /// The requested binding transition is not valid.
    #[error("invalid binding transition: cannot go from {from:?} to {to:?}")]
    InvalidTransition {
        /// Current binding.
        from: Binding,
        /// Requested binding.
        to: Binding,
    },

    /// Nothing to send.
    #[error("message is empty")]
    EmptyContent,

    /// The operation needs a conversation binding.
    #[error("no conversation is bound")]
    NotBound,

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SessionError {
    /// Returns true if this error might be resolved by retrying.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Http(_) | Self::Transport(_) | Self::Store(_) => true,
            Self::Api { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Short text suitable for a status line.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Api { message, .. } => message.clone(),
            Self::Http(_) | Self::Transport(_) => "connection problem, please retry".to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retriable_errors() {
        assert!(SessionError::Transport("reset".into()).is_retriable());
        assert!(SessionError::Api {
            status: 503,
            message: "busy".into()
        }
        .is_retriable());
        assert!(!SessionError::Api {
            status: 404,
            message: "gone".into()
        }
        .is_retriable());
        assert!(!SessionError::EmptyContent.is_retriable());
    }

    #[test]
    fn api_user_message_is_the_body_message() {
        let err = SessionError::Api {
            status: 422,
            message: "title too long".into(),
        };
        assert_eq!(err.user_message(), "title too long");
    }
}
