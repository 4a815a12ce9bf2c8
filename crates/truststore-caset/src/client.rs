//! Trust-store API client
//!
//! Provides a trait-based abstraction over the remote trust-store service,
//! allowing tests to mock every call while production code talks HTTP.

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use truststore_common::types::{
    Activation, Associations, CaSet, CaSetVersion, CreateCaSetRequest, DeletionStatus, Network,
    VersionUpdate,
};
use truststore_common::{Error, ValidationFinding, API_BASE_PATH};

use crate::config::ClientConfig;

/// Trait abstracting trust-store operations
///
/// Every component receives an implementation through its constructor; there
/// is no process-wide client handle.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TrustStoreClient: Send + Sync {
    /// Create a CA set (without versions)
    async fn create_ca_set(&self, request: &CreateCaSetRequest) -> Result<CaSet, Error>;

    /// Fetch a CA set with its version pointers and status
    async fn get_ca_set(&self, ca_set_id: &str) -> Result<CaSet, Error>;

    /// Create a new version of a CA set
    async fn create_ca_set_version(
        &self,
        ca_set_id: &str,
        body: &VersionUpdate,
    ) -> Result<CaSetVersion, Error>;

    /// Fetch one version with its per-network statuses and certificates
    async fn get_ca_set_version(&self, ca_set_id: &str, version: i64)
        -> Result<CaSetVersion, Error>;

    /// Rewrite a version in place
    async fn update_ca_set_version(
        &self,
        ca_set_id: &str,
        version: i64,
        body: &VersionUpdate,
    ) -> Result<CaSetVersion, Error>;

    /// Copy a version into a new one; the CA set's latest pointer advances
    async fn clone_ca_set_version(
        &self,
        ca_set_id: &str,
        version: i64,
    ) -> Result<CaSetVersion, Error>;

    /// List activations of every version on every network
    async fn list_ca_set_activations(&self, ca_set_id: &str) -> Result<Vec<Activation>, Error>;

    /// List activations of a single version on every network
    async fn list_ca_set_version_activations(
        &self,
        ca_set_id: &str,
        version: i64,
    ) -> Result<Vec<Activation>, Error>;

    /// Start activating a version on a network
    async fn activate_ca_set_version(
        &self,
        ca_set_id: &str,
        version: i64,
        network: Network,
    ) -> Result<Activation, Error>;

    /// Start deactivating a version on a network
    async fn deactivate_ca_set_version(
        &self,
        ca_set_id: &str,
        version: i64,
        network: Network,
    ) -> Result<Activation, Error>;

    /// Fetch a single activation attempt
    async fn get_ca_set_version_activation(
        &self,
        ca_set_id: &str,
        version: i64,
        activation_id: i64,
    ) -> Result<Activation, Error>;

    /// Start asynchronous removal of a CA set from every network
    async fn delete_ca_set(&self, ca_set_id: &str) -> Result<(), Error>;

    /// Fetch the progress of a requested deletion
    async fn get_ca_set_deletion_status(&self, ca_set_id: &str) -> Result<DeletionStatus, Error>;

    /// List properties and enrollments referencing a CA set
    async fn list_ca_set_associations(&self, ca_set_id: &str) -> Result<Associations, Error>;
}

#[derive(Deserialize)]
struct ActivationList {
    #[serde(default)]
    activations: Vec<Activation>,
}

#[derive(Serialize)]
struct NetworkBody {
    network: Network,
}

/// RFC 7807 problem details returned on error
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProblemDetails {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    errors: Vec<ProblemEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProblemEntry {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    field: Option<String>,
    #[serde(default)]
    index: Option<usize>,
}

impl ProblemDetails {
    fn summary(&self) -> Option<String> {
        match (&self.title, &self.detail) {
            (Some(t), Some(d)) => Some(format!("{}: {}", t, d)),
            (Some(t), None) => Some(t.clone()),
            (None, Some(d)) => Some(d.clone()),
            (None, None) => None,
        }
    }
}

/// Extract the element index from a field path such as `certificates[2].certificatePem`
fn index_from_field(field: &str) -> Option<usize> {
    let start = field.find('[')?;
    let end = field[start..].find(']')? + start;
    field[start + 1..end].parse().ok()
}

/// Map a non-success response to the error taxonomy
fn error_from_response(status: StatusCode, body: &str, kind: &str, id: &str) -> Error {
    let problem: ProblemDetails = serde_json::from_str(body).unwrap_or_default();

    match status {
        StatusCode::NOT_FOUND => Error::not_found(kind, id),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY if !problem.errors.is_empty() => {
            let findings = problem
                .errors
                .iter()
                .map(|entry| ValidationFinding {
                    index: entry
                        .index
                        .or_else(|| entry.field.as_deref().and_then(index_from_field)),
                    field: entry.field.clone(),
                    message: entry
                        .detail
                        .clone()
                        .or_else(|| entry.title.clone())
                        .unwrap_or_else(|| "invalid value".to_string()),
                })
                .collect();
            Error::validation_findings(findings)
        }
        _ => {
            let message = problem.summary().unwrap_or_else(|| {
                if body.is_empty() {
                    status.to_string()
                } else {
                    body.chars().take(512).collect()
                }
            });
            Error::api(status.as_u16(), message)
        }
    }
}

/// Real client implementation over HTTP
pub struct HttpTrustStoreClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpTrustStoreClient {
    /// Create a client from configuration
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| {
                Error::internal_with_context("http_client", format!("failed to build: {}", e))
            })?;
        Ok(Self::with_client(http, config))
    }

    /// Create a client around a caller-supplied `reqwest::Client`
    pub fn with_client(http: reqwest::Client, config: ClientConfig) -> Self {
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, API_BASE_PATH, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .http
            .request(method, self.url(path))
            .header(reqwest::header::ACCEPT, "application/json");
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn execute(
        &self,
        builder: RequestBuilder,
        kind: &str,
        id: &str,
    ) -> Result<reqwest::Response, Error> {
        let response = builder
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        debug!(status = status.as_u16(), kind = %kind, id = %id, "Trust-store request failed");
        Err(error_from_response(status, &body, kind, id))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        kind: &str,
        id: &str,
    ) -> Result<T, Error> {
        let response = self.execute(builder, kind, id).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| {
            Error::serialization(format!("failed to decode {} {}: {}", kind, id, e))
        })
    }
}

fn version_id(ca_set_id: &str, version: i64) -> String {
    format!("{}/{}", ca_set_id, version)
}

#[async_trait]
impl TrustStoreClient for HttpTrustStoreClient {
    async fn create_ca_set(&self, request: &CreateCaSetRequest) -> Result<CaSet, Error> {
        let builder = self.request(Method::POST, "/ca-sets").json(request);
        self.send_json(builder, "CA set", &request.ca_set_name).await
    }

    async fn get_ca_set(&self, ca_set_id: &str) -> Result<CaSet, Error> {
        let builder = self.request(Method::GET, &format!("/ca-sets/{}", ca_set_id));
        self.send_json(builder, "CA set", ca_set_id).await
    }

    async fn create_ca_set_version(
        &self,
        ca_set_id: &str,
        body: &VersionUpdate,
    ) -> Result<CaSetVersion, Error> {
        let builder = self
            .request(Method::POST, &format!("/ca-sets/{}/versions", ca_set_id))
            .json(body);
        self.send_json(builder, "CA set", ca_set_id).await
    }

    async fn get_ca_set_version(
        &self,
        ca_set_id: &str,
        version: i64,
    ) -> Result<CaSetVersion, Error> {
        let builder = self.request(
            Method::GET,
            &format!("/ca-sets/{}/versions/{}", ca_set_id, version),
        );
        self.send_json(builder, "CA set version", &version_id(ca_set_id, version))
            .await
    }

    async fn update_ca_set_version(
        &self,
        ca_set_id: &str,
        version: i64,
        body: &VersionUpdate,
    ) -> Result<CaSetVersion, Error> {
        let builder = self
            .request(
                Method::PUT,
                &format!("/ca-sets/{}/versions/{}", ca_set_id, version),
            )
            .json(body);
        self.send_json(builder, "CA set version", &version_id(ca_set_id, version))
            .await
    }

    async fn clone_ca_set_version(
        &self,
        ca_set_id: &str,
        version: i64,
    ) -> Result<CaSetVersion, Error> {
        let builder = self.request(
            Method::POST,
            &format!("/ca-sets/{}/versions/{}/clone", ca_set_id, version),
        );
        self.send_json(builder, "CA set version", &version_id(ca_set_id, version))
            .await
    }

    async fn list_ca_set_activations(&self, ca_set_id: &str) -> Result<Vec<Activation>, Error> {
        let builder = self.request(Method::GET, &format!("/ca-sets/{}/activations", ca_set_id));
        let list: ActivationList = self.send_json(builder, "CA set", ca_set_id).await?;
        Ok(list.activations)
    }

    async fn list_ca_set_version_activations(
        &self,
        ca_set_id: &str,
        version: i64,
    ) -> Result<Vec<Activation>, Error> {
        let builder = self.request(
            Method::GET,
            &format!("/ca-sets/{}/versions/{}/activations", ca_set_id, version),
        );
        let list: ActivationList = self
            .send_json(builder, "CA set version", &version_id(ca_set_id, version))
            .await?;
        Ok(list.activations)
    }

    async fn activate_ca_set_version(
        &self,
        ca_set_id: &str,
        version: i64,
        network: Network,
    ) -> Result<Activation, Error> {
        let builder = self
            .request(
                Method::POST,
                &format!("/ca-sets/{}/versions/{}/activate", ca_set_id, version),
            )
            .json(&NetworkBody { network });
        self.send_json(builder, "CA set version", &version_id(ca_set_id, version))
            .await
    }

    async fn deactivate_ca_set_version(
        &self,
        ca_set_id: &str,
        version: i64,
        network: Network,
    ) -> Result<Activation, Error> {
        let builder = self
            .request(
                Method::POST,
                &format!("/ca-sets/{}/versions/{}/deactivate", ca_set_id, version),
            )
            .json(&NetworkBody { network });
        self.send_json(builder, "CA set version", &version_id(ca_set_id, version))
            .await
    }

    async fn get_ca_set_version_activation(
        &self,
        ca_set_id: &str,
        version: i64,
        activation_id: i64,
    ) -> Result<Activation, Error> {
        let builder = self.request(
            Method::GET,
            &format!(
                "/ca-sets/{}/versions/{}/activations/{}",
                ca_set_id, version, activation_id
            ),
        );
        self.send_json(builder, "activation", &activation_id.to_string())
            .await
    }

    async fn delete_ca_set(&self, ca_set_id: &str) -> Result<(), Error> {
        let builder = self.request(Method::DELETE, &format!("/ca-sets/{}", ca_set_id));
        self.execute(builder, "CA set", ca_set_id).await?;
        Ok(())
    }

    async fn get_ca_set_deletion_status(&self, ca_set_id: &str) -> Result<DeletionStatus, Error> {
        let builder = self.request(Method::GET, &format!("/ca-sets/{}/deletions", ca_set_id));
        self.send_json(builder, "CA set", ca_set_id).await
    }

    async fn list_ca_set_associations(&self, ca_set_id: &str) -> Result<Associations, Error> {
        let builder = self.request(Method::GET, &format!("/ca-sets/{}/associations", ca_set_id));
        self.send_json(builder, "CA set", ca_set_id).await
    }
}
