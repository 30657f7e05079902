//! HTTP implementations of the collaborator traits.
//!
//! `HttpConversationStore` talks to the conversation store REST API;
//! `HttpAssistantStream` talks to the streaming relay and hands its body back
//! as UTF-8 text chunks.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use parley_core::{ConversationId, DraftMessage};
use serde::{Deserialize, Serialize};

use crate::collab::{
    AssistantStream, ChunkStream, ConversationSnapshot, ConversationStore, StreamRequest,
};
use crate::error::{Result, SessionError};

/// HTTP client for the conversation store.
#[derive(Debug, Clone)]
pub struct HttpConversationStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpConversationStore {
    /// Create a new store client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The base URL of the conversation store (e.g., "http://localhost:8081")
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Create a new store client with a custom reqwest client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: trim_base(base_url.into()),
        }
    }

    /// Get the base URL of the conversation store.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[derive(Debug, Serialize)]
struct CreateConversationRequest<'a> {
    title: &'a str,
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreateConversationResponse {
    id: ConversationId,
}

#[derive(Debug, Serialize)]
struct AppendMessagesRequest<'a> {
    messages: &'a [DraftMessage],
}

/// Error bodies come either flat or nested.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorResponse {
    Nested { error: ErrorDetail },
    Flat { error: String },
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl ErrorResponse {
    fn into_message(self) -> String {
        match self {
            Self::Nested { error } => error.message,
            Self::Flat { error } => error,
        }
    }
}

/// Turn a non-success response into `SessionError::Api`.
async fn api_error(response: reqwest::Response) -> SessionError {
    let status = response.status();
    let message = response
        .json::<ErrorResponse>()
        .await
        .map(ErrorResponse::into_message)
        .unwrap_or_else(|_| format!("request failed with status {status}"));
    SessionError::Api {
        status: status.as_u16(),
        message,
    }
}

fn trim_base(mut url: String) -> String {
    while url.ends_with('/') {
        url.pop();
    }
    url
}

#[async_trait]
impl ConversationStore for HttpConversationStore {
    async fn create_conversation(&self, title: &str, model: &str) -> Result<ConversationId> {
        let url = format!("{}/v1/conversations", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&CreateConversationRequest { title, model })
            .send()
            .await?;

        if !response.status().is_success() {
            let err = api_error(response).await;
            tracing::error!(error = %err, "Failed to create conversation");
            return Err(err);
        }

        let created = response
            .json::<CreateConversationResponse>()
            .await
            .map_err(|e| SessionError::Parse(e.to_string()))?;
        tracing::debug!(conversation_id = %created.id, "Created conversation");
        Ok(created.id)
    }

    async fn get_conversation(&self, id: &ConversationId) -> Result<ConversationSnapshot> {
        let url = format!("{}/v1/conversations/{id}", self.base_url);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let snapshot = response
            .json::<ConversationSnapshot>()
            .await
            .map_err(|e| SessionError::Parse(e.to_string()))?;
        tracing::debug!(
            conversation_id = %id,
            messages = snapshot.messages.len(),
            "Fetched conversation"
        );
        Ok(snapshot)
    }

    async fn append_messages(&self, id: &ConversationId, messages: &[DraftMessage]) -> Result<()> {
        let url = format!("{}/v1/conversations/{id}/messages", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&AppendMessagesRequest { messages })
            .send()
            .await?;

        if response.status().is_success() {
            tracing::debug!(conversation_id = %id, count = messages.len(), "Appended messages");
            Ok(())
        } else {
            Err(api_error(response).await)
        }
    }
}

/// HTTP client for the streaming relay.
#[derive(Debug, Clone)]
pub struct HttpAssistantStream {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAssistantStream {
    /// Create a new relay client.
    ///
    /// No overall timeout is set; responses stream for as long as the
    /// assistant keeps talking.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Create a new relay client with a custom reqwest client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: trim_base(base_url.into()),
        }
    }

    /// Get the base URL of the relay.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl AssistantStream for HttpAssistantStream {
    async fn open(&self, id: &ConversationId, request: StreamRequest) -> Result<ChunkStream> {
        let url = format!("{}/v1/conversations/{id}/stream", self.base_url);
        let response = self
            .client
            .post(&url)
            .header(reqwest::header::ACCEPT, "text/event-stream, application/x-ndjson, application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let err = api_error(response).await;
            tracing::warn!(conversation_id = %id, error = %err, "Stream request rejected");
            return Err(err);
        }

        tracing::debug!(conversation_id = %id, "Stream opened");
        let mut text = Utf8Chunker::default();
        let chunks = response
            .bytes_stream()
            .map(move |chunk| match chunk {
                Ok(bytes) => Ok(text.push(&bytes)),
                Err(e) => Err(SessionError::Transport(e.to_string())),
            })
            .filter(|chunk| futures::future::ready(!matches!(chunk, Ok(s) if s.is_empty())));
        Ok(chunks.boxed())
    }
}

/// Incremental UTF-8 decoding across network chunk boundaries.
///
/// A multi-byte character split between two chunks is held back until its
/// remaining bytes arrive. Invalid sequences become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Chunker {
    pending: Vec<u8>,
}

impl Utf8Chunker {
    /// Decode as much of `bytes` (plus held-back bytes) as is complete.
    pub fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(valid) => {
                    out.push_str(valid);
                    self.pending.clear();
                    return out;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        // incomplete tail
                        None => {
                            self.pending.drain(..valid);
                            return out;
                        }
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                    }
                }
            }
        }
    }

    /// Number of held-back bytes.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_multibyte_character_is_held_back() {
        let bytes = "prix: 12 €".as_bytes();
        let cut = bytes.len() - 2;

        let mut chunker = Utf8Chunker::default();
        assert_eq!(chunker.push(&bytes[..cut]), "prix: 12 ");
        assert_eq!(chunker.pending(), 1);
        assert_eq!(chunker.push(&bytes[cut..]), "€");
        assert_eq!(chunker.pending(), 0);
    }

    #[test]
    fn byte_by_byte_delivery() {
        let text = "Zürich → 東京";
        let mut chunker = Utf8Chunker::default();
        let out: String = text.as_bytes().iter().map(|b| chunker.push(&[*b])).collect();
        assert_eq!(out, text);
    }

    #[test]
    fn invalid_bytes_become_replacement() {
        let mut chunker = Utf8Chunker::default();
        assert_eq!(chunker.push(b"a\xffb"), "a\u{FFFD}b");
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let store = HttpConversationStore::with_client(reqwest::Client::new(), "http://x/");
        assert_eq!(store.base_url(), "http://x");
    }

    #[test]
    fn error_body_shapes() {
        let flat: ErrorResponse = serde_json::from_str(r#"{"error": "nope"}"#).unwrap();
        assert_eq!(flat.into_message(), "nope");
        let nested: ErrorResponse =
            serde_json::from_str(r#"{"error": {"code": "NOT_FOUND", "message": "gone"}}"#).unwrap();
        assert_eq!(nested.into_message(), "gone");
    }
}
