//! Gateway configuration types.

use std::time::Duration;

use serde::Deserialize;

/// Configuration for the relay service.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Listen address (e.g., "0.0.0.0:8080").
    #[serde(default = "GatewayConfig::default_listen_addr")]
    pub listen_addr: String,

    /// Base URL of the assistant backend.
    #[serde(default = "GatewayConfig::default_upstream_url")]
    pub upstream_url: String,

    /// Allowed CORS origins.
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    #[serde(default = "GatewayConfig::default_max_body")]
    pub max_body_bytes: usize,

    /// Time allowed for a request to produce response headers, in seconds.
    ///
    /// The streamed body is not bounded by this.
    #[serde(default = "GatewayConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Upstream connect timeout in seconds.
    #[serde(default = "GatewayConfig::default_connect_timeout")]
    pub upstream_connect_timeout_seconds: u64,

    /// Time the upstream has to answer with headers, in seconds.
    #[serde(default = "GatewayConfig::default_upstream_response_timeout")]
    pub upstream_response_timeout_seconds: u64,
}

impl GatewayConfig {
    fn default_listen_addr() -> String {
        "0.0.0.0:8080".to_string()
    }

    fn default_upstream_url() -> String {
        "http://127.0.0.1:9000".to_string()
    }

    const fn default_max_body() -> usize {
        256 * 1024 // 256 KB
    }

    const fn default_request_timeout() -> u64 {
        60
    }

    const fn default_connect_timeout() -> u64 {
        5
    }

    const fn default_upstream_response_timeout() -> u64 {
        30
    }

    /// Get the request timeout as a `Duration`.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Get the upstream connect timeout as a `Duration`.
    #[must_use]
    pub const fn upstream_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_connect_timeout_seconds)
    }

    /// Get the upstream response timeout as a `Duration`.
    #[must_use]
    pub const fn upstream_response_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_response_timeout_seconds)
    }

    /// Build a configuration from `LISTEN_ADDR`, `UPSTREAM_URL`, `CORS_ORIGINS`
    /// (comma separated) and `UPSTREAM_TIMEOUT_SECONDS`, falling back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(addr) = std::env::var("LISTEN_ADDR") {
            config.listen_addr = addr;
        }
        if let Ok(url) = std::env::var("UPSTREAM_URL") {
            config.upstream_url = url;
        }
        if let Ok(origins) = std::env::var("CORS_ORIGINS") {
            config.cors_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(secs) = std::env::var("UPSTREAM_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.upstream_response_timeout_seconds = secs;
        }
        config
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: Self::default_listen_addr(),
            upstream_url: Self::default_upstream_url(),
            cors_origins: vec!["*".to_string()],
            max_body_bytes: Self::default_max_body(),
            request_timeout_seconds: Self::default_request_timeout(),
            upstream_connect_timeout_seconds: Self::default_connect_timeout(),
            upstream_response_timeout_seconds: Self::default_upstream_response_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.cors_origins, vec!["*".to_string()]);
        assert_eq!(config.max_body_bytes, 256 * 1024);
    }

    #[test]
    fn timeout_durations() {
        let config = GatewayConfig::default();
        assert_eq!(config.request_timeout(), Duration::from_secs(60));
        assert_eq!(config.upstream_connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.upstream_response_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: GatewayConfig =
            serde_json::from_str(r#"{"upstream_url": "http://assistant:9000"}"#).unwrap();
        assert_eq!(config.upstream_url, "http://assistant:9000");
        assert_eq!(config.upstream_connect_timeout_seconds, 5);
        assert!(config.cors_origins.is_empty());
    }
}
