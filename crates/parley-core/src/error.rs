//! Common error types for parley.

use crate::ids::ConversationId;
use thiserror::Error;

/// A result type using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur throughout parley.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A conversation with the specified ID was not found.
    #[error("conversation not found: {0}")]
    ConversationNotFound(ConversationId),

    /// An invalid identifier was provided.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] crate::ids::IdError),

    /// A side-payload category name was not recognized.
    #[error("unknown payload category: {0}")]
    UnknownCategory(String),

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}
