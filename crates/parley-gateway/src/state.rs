//! Gateway application state.

use std::sync::Arc;

use crate::config::GatewayConfig;
use crate::relay::RelayClient;

/// Shared application state for the gateway.
#[derive(Clone)]
pub struct GatewayState {
    /// Client for the assistant backend.
    pub relay: Arc<RelayClient>,
    /// Gateway configuration.
    pub config: GatewayConfig,
}

impl GatewayState {
    /// Create a new gateway state.
    #[must_use]
    pub fn new(relay: Arc<RelayClient>, config: GatewayConfig) -> Self {
        Self { relay, config }
    }

    /// Build the state from configuration alone.
    ///
    /// # Errors
    ///
    /// Returns an error if the relay's HTTP client cannot be created.
    pub fn from_config(config: GatewayConfig) -> reqwest::Result<Self> {
        let relay = Arc::new(RelayClient::new(&config)?);
        Ok(Self::new(relay, config))
    }
}
