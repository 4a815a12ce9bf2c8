//! CLI commands

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use truststore_caset::resource::parse_duration;
use truststore_caset::{ClientConfig, HttpTrustStoreClient, TrustStoreClient};
use truststore_common::types::Network;

use crate::{Error, GlobalArgs, Result};

pub mod activate;
pub mod associations;
pub mod delete;
pub mod status;
pub mod update_version;

/// Connected client plus the caller's budget and cancellation token
pub struct Session {
    pub client: Arc<dyn TrustStoreClient>,
    pub cancel: CancellationToken,
    pub timeout: Duration,
}

impl Session {
    /// Build an HTTP client from the global flags
    pub fn connect(global: &GlobalArgs, cancel: CancellationToken) -> Result<Self> {
        let base_url = global
            .base_url
            .clone()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| Error::validation("--base-url or TRUSTSTORE_BASE_URL is required"))?;

        let mut config = ClientConfig::new(base_url);
        if let Some(token) = &global.token {
            config = config.with_token(token.clone());
        }

        let client = HttpTrustStoreClient::new(config)?;
        Ok(Self {
            client: Arc::new(client),
            cancel,
            timeout: global.timeout,
        })
    }
}

/// Parse a `--timeout` value
pub fn parse_timeout(raw: &str) -> std::result::Result<Duration, String> {
    parse_duration(raw).map_err(|e| e.to_string())
}

/// Parse a `--network` value (case-insensitive)
pub fn parse_network(raw: &str) -> std::result::Result<Network, String> {
    raw.parse().map_err(|e: truststore_common::Error| e.to_string())
}

/// Print a value as pretty JSON on stdout
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_accepts_units_and_seconds() {
        assert_eq!(parse_timeout("45s").unwrap(), Duration::from_secs(45));
        assert_eq!(parse_timeout("120").unwrap(), Duration::from_secs(120));
        assert!(parse_timeout("soon").is_err());
        assert!(parse_timeout("99999999999999999h").is_err());
    }

    #[test]
    fn network_is_case_insensitive() {
        assert_eq!(parse_network("staging").unwrap(), Network::Staging);
        assert_eq!(parse_network("PRODUCTION").unwrap(), Network::Production);
        assert!(parse_network("qa").is_err());
    }

    #[test]
    fn missing_base_url_is_a_validation_error() {
        let global = GlobalArgs {
            base_url: None,
            token: None,
            json_logs: false,
            timeout: Duration::from_secs(60),
        };
        let err = Session::connect(&global, CancellationToken::new()).err().unwrap();
        assert!(matches!(err, Error::Validation { .. }));
    }
}
