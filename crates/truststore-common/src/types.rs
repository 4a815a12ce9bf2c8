//! Remote data model for CA sets, versions, activations and deletions
//!
//! These types mirror the trust-store service's JSON payloads. The service
//! owns all of them; this crate only holds read projections.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;

/// Deployment target on which a version's activation state is tracked
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Network {
    /// Staging network
    Staging,
    /// Production network
    Production,
}

impl Network {
    /// Wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Staging => "STAGING",
            Network::Production => "PRODUCTION",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "STAGING" => Ok(Network::Staging),
            "PRODUCTION" => Ok(Network::Production),
            other => Err(Error::configuration(
                "network",
                format!("expected STAGING or PRODUCTION, got '{}'", other),
            )),
        }
    }
}

/// Kind of activation request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivationType {
    /// Make a version live on a network
    Activate,
    /// Take a version off a network
    Deactivate,
}

impl ActivationType {
    /// The type that undoes this one
    pub fn opposite(&self) -> Self {
        match self {
            ActivationType::Activate => ActivationType::Deactivate,
            ActivationType::Deactivate => ActivationType::Activate,
        }
    }

    /// Noun used in log and error messages ("activation", "deactivation")
    pub fn action_name(&self) -> &'static str {
        match self {
            ActivationType::Activate => "activation",
            ActivationType::Deactivate => "deactivation",
        }
    }
}

impl fmt::Display for ActivationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivationType::Activate => f.write_str("ACTIVATE"),
            ActivationType::Deactivate => f.write_str("DEACTIVATE"),
        }
    }
}

/// Progress of a single activation attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivationStatus {
    /// Still running remotely
    InProgress,
    /// Finished successfully
    Complete,
    /// Finished unsuccessfully
    Failed,
}

/// Per-network status of a CA set version
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VersionNetworkStatus {
    /// Version is live on the network
    Active,
    /// Version is not live on the network
    #[default]
    Inactive,
}

/// Lifecycle status of a CA set
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaSetStatus {
    /// Normal state
    #[default]
    NotDeleted,
    /// Asynchronous deletion has been requested
    Deleting,
    /// Deletion finished on every network
    Deleted,
}

/// Overall or per-network progress of a CA set deletion
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeletionState {
    /// Removal still running
    InProgress,
    /// Removal finished
    Complete,
    /// Removal failed and needs operator action
    Failed,
}

/// A named, versioned bundle of trust-anchor certificates
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaSet {
    /// Remote identifier
    pub ca_set_id: String,
    /// Unique name
    pub ca_set_name: String,
    /// Owning account
    #[serde(default)]
    pub account_id: Option<String>,
    /// Free-form description
    #[serde(default)]
    pub description: Option<String>,
    /// Most recently created version
    #[serde(default)]
    pub latest_version: Option<i64>,
    /// Version currently active on staging
    #[serde(default)]
    pub staging_version: Option<i64>,
    /// Version currently active on production
    #[serde(default)]
    pub production_version: Option<i64>,
    /// Lifecycle status
    #[serde(default)]
    pub ca_set_status: CaSetStatus,
    /// Who created the record
    #[serde(default)]
    pub created_by: Option<String>,
    /// When the record was created
    #[serde(default)]
    pub created_date: Option<DateTime<Utc>>,
}

impl CaSet {
    /// Version currently active on the given network, if any
    pub fn version_on(&self, network: Network) -> Option<i64> {
        match network {
            Network::Staging => self.staging_version,
            Network::Production => self.production_version,
        }
    }
}

/// Certificate as stored in a CA set version
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    /// PEM-encoded certificate
    pub certificate_pem: String,
    /// Free-form description
    #[serde(default)]
    pub description: Option<String>,
    /// Subject distinguished name
    #[serde(default)]
    pub subject: Option<String>,
    /// Issuer distinguished name
    #[serde(default)]
    pub issuer: Option<String>,
    /// Not-before timestamp
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    /// Not-after timestamp
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    /// SHA-256 fingerprint
    #[serde(default)]
    pub fingerprint: Option<String>,
    /// Serial number
    #[serde(default)]
    pub serial_number: Option<String>,
    /// Signature algorithm (e.g. "SHA256WITHRSA")
    #[serde(default)]
    pub signature_algorithm: Option<String>,
}

/// Certificate submitted in a version create/update body
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateInput {
    /// PEM-encoded certificate
    pub certificate_pem: String,
    /// Free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl From<&Certificate> for CertificateInput {
    fn from(cert: &Certificate) -> Self {
        Self {
            certificate_pem: cert.certificate_pem.clone(),
            description: cert.description.clone(),
        }
    }
}

/// One version of a CA set
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaSetVersion {
    /// Version number, assigned by the remote service
    pub version: i64,
    /// Free-form description
    #[serde(default)]
    pub description: Option<String>,
    /// Whether SHA-1 signed certificates are accepted
    #[serde(default, rename = "allowInsecureSha1")]
    pub allow_insecure_sha1: bool,
    /// Status on staging
    #[serde(default)]
    pub staging_status: VersionNetworkStatus,
    /// Status on production
    #[serde(default)]
    pub production_status: VersionNetworkStatus,
    /// Certificates in this version
    #[serde(default)]
    pub certificates: Vec<Certificate>,
    /// Who created the record
    #[serde(default)]
    pub created_by: Option<String>,
    /// When the record was created
    #[serde(default)]
    pub created_date: Option<DateTime<Utc>>,
    /// Who last modified the record
    #[serde(default)]
    pub modified_by: Option<String>,
    /// When the record was last modified
    #[serde(default)]
    pub modified_date: Option<DateTime<Utc>>,
}

impl CaSetVersion {
    /// Status of this version on the given network
    pub fn status_on(&self, network: Network) -> VersionNetworkStatus {
        match network {
            Network::Staging => self.staging_status,
            Network::Production => self.production_status,
        }
    }
}

/// Body for creating a CA set
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCaSetRequest {
    /// Unique name
    pub ca_set_name: String,
    /// Free-form description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Owning account (defaults to the caller's)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
}

/// Body for creating or updating a CA set version
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionUpdate {
    /// Free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether SHA-1 signed certificates are accepted
    #[serde(default, rename = "allowInsecureSha1")]
    pub allow_insecure_sha1: bool,
    /// Full certificate list for the version
    #[serde(default)]
    pub certificates: Vec<CertificateInput>,
}

impl From<&CaSetVersion> for VersionUpdate {
    fn from(version: &CaSetVersion) -> Self {
        Self {
            description: version.description.clone(),
            allow_insecure_sha1: version.allow_insecure_sha1,
            certificates: version.certificates.iter().map(Into::into).collect(),
        }
    }
}

/// A single activate-or-deactivate attempt
///
/// History per `(ca_set_id, network)` is append-only; the service guarantees
/// at most one `IN_PROGRESS` record per pair.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activation {
    /// Remote identifier
    pub activation_id: i64,
    /// CA set the activation belongs to
    pub ca_set_id: String,
    /// Version being activated or deactivated
    pub version: i64,
    /// Target network
    pub network: Network,
    /// Activate or deactivate
    #[serde(rename = "type")]
    pub activation_type: ActivationType,
    /// Current progress
    #[serde(rename = "status")]
    pub activation_status: ActivationStatus,
    /// Who created the record
    #[serde(default)]
    pub created_by: Option<String>,
    /// When the record was created
    #[serde(default)]
    pub created_date: Option<DateTime<Utc>>,
    /// Who last modified the record
    #[serde(default)]
    pub modified_by: Option<String>,
    /// When the record was last modified
    #[serde(default)]
    pub modified_date: Option<DateTime<Utc>>,
    /// Earliest time the service wants to be polled again
    #[serde(default)]
    pub retry_after: Option<DateTime<Utc>>,
}

impl Activation {
    /// Whether this record is a finished attempt of the given type on the network
    pub fn is_complete(&self, network: Network, activation_type: ActivationType) -> bool {
        self.network == network
            && self.activation_type == activation_type
            && self.activation_status == ActivationStatus::Complete
    }

    /// Whether this record is still running on the network
    pub fn is_in_progress_on(&self, network: Network) -> bool {
        self.network == network && self.activation_status == ActivationStatus::InProgress
    }
}

/// Most recent COMPLETE record of the given type on a network
///
/// Recency is decided by creation time, then by activation id for records
/// created in the same instant or missing a timestamp.
pub fn most_recent_complete<'a>(
    activations: &'a [Activation],
    version: i64,
    network: Network,
    activation_type: ActivationType,
) -> Option<&'a Activation> {
    activations
        .iter()
        .filter(|a| a.version == version && a.is_complete(network, activation_type))
        .max_by_key(|a| (a.created_date, a.activation_id))
}

/// Property referencing a CA set
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyAssociation {
    /// Property identifier
    pub property_id: String,
    /// Property name
    #[serde(default)]
    pub property_name: Option<String>,
    /// Asset identifier
    #[serde(default)]
    pub asset_id: Option<i64>,
    /// Group the property belongs to
    #[serde(default)]
    pub group_id: Option<i64>,
}

/// Certificate enrollment referencing a CA set
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentAssociation {
    /// Enrollment identifier
    pub enrollment_id: i64,
    /// Common name of the enrolled certificate
    #[serde(default)]
    pub cn: Option<String>,
    /// API link to the enrollment
    #[serde(default)]
    pub enrollment_link: Option<String>,
}

/// Snapshot of everything referencing a CA set
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Associations {
    /// Referencing properties
    #[serde(default)]
    pub properties: Vec<PropertyAssociation>,
    /// Referencing enrollments
    #[serde(default)]
    pub enrollments: Vec<EnrollmentAssociation>,
}

impl Associations {
    /// True when nothing references the CA set
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty() && self.enrollments.is_empty()
    }
}

/// Deletion progress on one network
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkDeletionStatus {
    /// Network being cleaned up
    pub network: Network,
    /// Progress on that network
    pub status: DeletionState,
    /// Completion percentage, when reported
    #[serde(default)]
    pub percent_complete: Option<u8>,
    /// Why removal failed on this network
    #[serde(default)]
    pub failure_reason: Option<String>,
}

/// Deletion progress across all networks
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionStatus {
    /// Overall progress
    pub status: DeletionState,
    /// Per-network progress
    #[serde(default)]
    pub deletions: Vec<NetworkDeletionStatus>,
    /// Earliest time the service wants to be polled again
    #[serde(default)]
    pub retry_after: Option<DateTime<Utc>>,
    /// Why removal failed
    #[serde(default)]
    pub failure_reason: Option<String>,
}

impl DeletionStatus {
    /// Failure reason from the overall status or, failing that, the first
    /// network that reported one
    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref().or_else(|| {
            self.deletions
                .iter()
                .find_map(|d| d.failure_reason.as_deref())
        })
    }
}
