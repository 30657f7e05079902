//! Client for the assistant backend.

use parley_core::ConversationId;
use parley_session::StreamRequest;

use crate::config::GatewayConfig;
use crate::error::ApiError;

/// Opens streaming responses on the assistant backend.
#[derive(Debug, Clone)]
pub struct RelayClient {
    client: reqwest::Client,
    upstream_url: String,
    response_timeout: std::time::Duration,
}

impl RelayClient {
    /// Create a relay client from the gateway configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: &GatewayConfig) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.upstream_connect_timeout())
            .build()?;
        Ok(Self {
            client,
            upstream_url: config.upstream_url.trim_end_matches('/').to_string(),
            response_timeout: config.upstream_response_timeout(),
        })
    }

    /// Get the upstream base URL.
    #[must_use]
    pub fn upstream_url(&self) -> &str {
        &self.upstream_url
    }

    /// Start a response for `id` and return the upstream response with its
    /// body unread.
    ///
    /// # Errors
    ///
    /// Returns `UpstreamUnavailable` if the backend cannot be reached,
    /// `UpstreamTimeout` if it does not answer in time, and `UpstreamStatus`
    /// for a non-success status.
    pub async fn open(
        &self,
        id: &ConversationId,
        request: &StreamRequest,
    ) -> Result<reqwest::Response, ApiError> {
        let url = format!("{}/chat/{id}", self.upstream_url);
        let send = self.client.post(&url).json(request).send();

        let response = tokio::time::timeout(self.response_timeout, send)
            .await
            .map_err(|_| {
                tracing::warn!(conversation_id = %id, "Upstream did not answer in time");
                ApiError::UpstreamTimeout
            })??;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(conversation_id = %id, status = %status, "Upstream rejected stream");
            return Err(ApiError::UpstreamStatus(status.as_u16()));
        }

        tracing::debug!(conversation_id = %id, "Upstream stream opened");
        Ok(response)
    }
}
