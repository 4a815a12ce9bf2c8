//! HTTP client configuration
//!
//! Resolution order for every field: explicit value, then environment
//! variable, then the built-in default. The base URL has no default.

use std::time::Duration;

use truststore_common::{Error, Result};

/// Environment variable holding the API base URL
pub const BASE_URL_ENV: &str = "TRUSTSTORE_BASE_URL";
/// Environment variable holding an optional bearer token
pub const TOKEN_ENV: &str = "TRUSTSTORE_TOKEN";
/// Environment variable holding the per-request timeout in seconds
pub const REQUEST_TIMEOUT_ENV: &str = "TRUSTSTORE_REQUEST_TIMEOUT_SECS";

/// Default per-request timeout (30 seconds)
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings for [`crate::HttpTrustStoreClient`]
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Scheme and host of the trust-store API (e.g. "https://api.example.com")
    pub base_url: String,
    /// Bearer token sent on every request
    pub token: Option<String>,
    /// Timeout applied to each HTTP request
    pub request_timeout: Duration,
    /// User-Agent header value
    pub user_agent: String,
}

impl ClientConfig {
    /// Configuration for the given base URL with default settings
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            user_agent: format!("truststore-caset/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Build configuration from the environment.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var(BASE_URL_ENV)
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::configuration(BASE_URL_ENV, "environment variable is not set"))?;

        let mut config = Self::new(base_url);
        config.token = std::env::var(TOKEN_ENV).ok().filter(|v| !v.is_empty());

        if let Ok(raw) = std::env::var(REQUEST_TIMEOUT_ENV) {
            let secs: u64 = raw.parse().map_err(|_| {
                Error::configuration(
                    REQUEST_TIMEOUT_ENV,
                    format!("expected whole seconds, got '{}'", raw),
                )
            })?;
            config.request_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// Set the bearer token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set the per-request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_config_uses_defaults() {
        let config = ClientConfig::new("https://truststore.example.com");
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert!(config.token.is_none());
        assert!(config.user_agent.starts_with("truststore-caset/"));
    }

    #[test]
    fn builders_override_fields() {
        let config = ClientConfig::new("https://truststore.example.com")
            .with_token("secret")
            .with_request_timeout(Duration::from_secs(5));
        assert_eq!(config.token.as_deref(), Some("secret"));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }
}
