//! Collaborators the session controller talks to.
//!
//! These traits abstract the conversation store, the assistant stream and
//! navigation so that the controller can be driven by in-process fakes in
//! tests and by HTTP clients in the terminal client.

use async_trait::async_trait;
use futures::stream::BoxStream;
use parley_core::{ConversationId, DraftMessage, Message};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Opaque client-side flags forwarded with a send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlashCardFlags(pub Value);

/// Body of a stream request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamRequest {
    /// Text the user sent.
    pub content: String,
    /// Flags forwarded verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flash_card_flags: Option<FlashCardFlags>,
}

impl StreamRequest {
    /// Create a request without flags.
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            flash_card_flags: None,
        }
    }
}

/// Conversation header returned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    /// Conversation identity.
    pub id: ConversationId,
    /// Display title.
    #[serde(default)]
    pub title: String,
    /// Model the conversation was created with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// A conversation and its committed history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSnapshot {
    /// Conversation header.
    pub conversation: ConversationSummary,
    /// Committed turns in creation order.
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// Raw text chunks as they arrive from the network.
pub type ChunkStream = BoxStream<'static, Result<String>>;

/// Trait for the conversation store.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Create a conversation and return its identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the store rejects it.
    async fn create_conversation(&self, title: &str, model: &str) -> Result<ConversationId>;

    /// Fetch a conversation with its committed history.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the conversation does not exist.
    async fn get_conversation(&self, id: &ConversationId) -> Result<ConversationSnapshot>;

    /// Append turns to a conversation.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    async fn append_messages(&self, id: &ConversationId, messages: &[DraftMessage])
        -> Result<()>;
}

/// Trait for the assistant stream endpoint.
#[async_trait]
pub trait AssistantStream: Send + Sync {
    /// Start a response for `id` and return its body as text chunks.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream could not be opened. Failures after
    /// that point arrive as `Err` items on the returned stream.
    async fn open(&self, id: &ConversationId, request: StreamRequest) -> Result<ChunkStream>;
}

/// Moves the client to another conversation.
///
/// Navigation replaces the controller instance; the caller mounts a new one
/// for the target conversation.
pub trait Navigator: Send + Sync {
    /// Request navigation to `id`.
    fn navigate(&self, id: &ConversationId);
}
