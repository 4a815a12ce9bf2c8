//! Error types for trust-store CA set management
//!
//! Errors are structured with fields to aid debugging in production.
//! Variants carry the CA set, version and network the failure relates to so
//! callers can report actionable messages without re-deriving context.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// A single finding reported by the remote validator.
///
/// `index` identifies the offending element of the submitted list (for
/// example the third certificate is index 2) so callers can attribute the
/// failure to a specific input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationFinding {
    /// Index of the offending element, when the finding refers to one
    pub index: Option<usize>,
    /// Field path reported by the validator (e.g. "certificates[2].certificatePem")
    pub field: Option<String>,
    /// Human-readable description of the problem
    pub message: String,
}

impl fmt::Display for ValidationFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.field, self.index) {
            (Some(field), _) => write!(f, "{}: {}", field, self.message),
            (None, Some(index)) => write!(f, "[{}]: {}", index, self.message),
            (None, None) => f.write_str(&self.message),
        }
    }
}

fn join_findings(findings: &[ValidationFinding]) -> String {
    findings
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Main error type for CA set operations
#[derive(Debug, Error)]
pub enum Error {
    /// The CA set, version or activation does not exist remotely
    #[error("{kind} {id} not found")]
    NotFound {
        /// Kind of the missing object (e.g. "CA set", "CA set version")
        kind: String,
        /// Identifier of the missing object
        id: String,
    },

    /// Another operation on the same network is already in flight
    #[error("conflict for CA set {ca_set_id}: {message}")]
    Conflict {
        /// CA set the conflicting operation belongs to
        ca_set_id: String,
        /// Version targeted by the in-flight operation
        version: i64,
        /// Description of the conflict
        message: String,
    },

    /// The remote service reported a FAILED status
    #[error("{operation} failed for CA set {ca_set_id}: {message}")]
    RemoteFailure {
        /// Operation that failed (activation, deactivation, deletion)
        operation: String,
        /// CA set the operation targeted
        ca_set_id: String,
        /// Failure description, including the remote failure reason if any
        message: String,
        /// Whether an operator must act remotely before a retry can succeed
        manual_intervention: bool,
    },

    /// The local deadline elapsed or the caller cancelled while polling
    ///
    /// Does not imply the remote operation failed: it may still complete.
    #[error("timed out waiting for {operation} after {elapsed:?}: {message}")]
    Timeout {
        /// Operation being waited on
        operation: String,
        /// Time spent waiting before giving up
        elapsed: Duration,
        /// Why the wait ended (deadline or cancellation)
        message: String,
    },

    /// The remote validator rejected the submitted content
    #[error("validation failed: {}", join_findings(.findings))]
    Validation {
        /// One finding per offending element
        findings: Vec<ValidationFinding>,
    },

    /// The CA set is referenced by properties or enrollments
    #[error("CA set {ca_set_id} is in use: {listing}")]
    InUse {
        /// CA set being guarded
        ca_set_id: String,
        /// Human-readable listing of the referencing objects
        listing: String,
    },

    /// The remote service returned a state that contradicts the request
    #[error("protocol error for CA set {ca_set_id}: {message}")]
    Protocol {
        /// CA set the inconsistent record belongs to
        ca_set_id: String,
        /// Description of the inconsistency
        message: String,
    },

    /// Local activation record cannot be reconciled with remote history
    #[error("drift detected for CA set {ca_set_id}: {message}")]
    Drift {
        /// CA set being reconciled
        ca_set_id: String,
        /// Description of the mismatch
        message: String,
    },

    /// Non-success HTTP response without a more specific mapping
    #[error("trust-store API error (status {status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response detail or body excerpt
        message: String,
    },

    /// The request never produced a response
    #[error("transport error: {0}")]
    Transport(String),

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },

    /// Host-supplied configuration has an unexpected shape
    #[error("configuration error for {key}: {message}")]
    Configuration {
        /// Attribute key that failed to parse
        key: String,
        /// Description of what was expected
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred
        context: String,
    },
}

impl Error {
    /// Create a not-found error for the given object kind and identifier
    pub fn not_found(kind: impl Into<String>, id: impl fmt::Display) -> Self {
        Self::NotFound {
            kind: kind.into(),
            id: id.to_string(),
        }
    }

    /// Create a conflict error naming the version of the in-flight operation
    pub fn conflict(ca_set_id: impl Into<String>, version: i64, msg: impl Into<String>) -> Self {
        Self::Conflict {
            ca_set_id: ca_set_id.into(),
            version,
            message: msg.into(),
        }
    }

    /// Create a remote failure that a plain retry may resolve
    pub fn remote_failure(
        operation: impl Into<String>,
        ca_set_id: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::RemoteFailure {
            operation: operation.into(),
            ca_set_id: ca_set_id.into(),
            message: msg.into(),
            manual_intervention: false,
        }
    }

    /// Create a remote failure that requires operator action on the remote side
    pub fn remote_failure_manual(
        operation: impl Into<String>,
        ca_set_id: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::RemoteFailure {
            operation: operation.into(),
            ca_set_id: ca_set_id.into(),
            message: msg.into(),
            manual_intervention: true,
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, elapsed: Duration, msg: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed,
            message: msg.into(),
        }
    }

    /// Create a validation error with a single finding not tied to an element
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            findings: vec![ValidationFinding {
                index: None,
                field: None,
                message: msg.into(),
            }],
        }
    }

    /// Create a validation error from remote findings
    pub fn validation_findings(findings: Vec<ValidationFinding>) -> Self {
        Self::Validation { findings }
    }

    /// Create an in-use error
    pub fn in_use(ca_set_id: impl Into<String>, listing: impl Into<String>) -> Self {
        Self::InUse {
            ca_set_id: ca_set_id.into(),
            listing: listing.into(),
        }
    }

    /// Create a protocol error
    pub fn protocol(ca_set_id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Protocol {
            ca_set_id: ca_set_id.into(),
            message: msg.into(),
        }
    }

    /// Create a drift error
    pub fn drift(ca_set_id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Drift {
            ca_set_id: ca_set_id.into(),
            message: msg.into(),
        }
    }

    /// Create an API error from an HTTP status and message
    pub fn api(status: u16, msg: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: msg.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Create a configuration error for a host attribute
    pub fn configuration(key: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Configuration {
            key: key.into(),
            message: msg.into(),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Check whether the remote object is absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// Check if a later attempt at the same call could succeed without
    /// changing its inputs
    ///
    /// Conflicts, validation and configuration errors need a user change.
    /// Deletion failures tagged for manual intervention need an operator.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::NotFound { .. } => false,
            Error::Conflict { .. } => false,
            Error::RemoteFailure {
                manual_intervention,
                ..
            } => !manual_intervention,
            Error::Timeout { .. } => true,
            Error::Validation { .. } => false,
            Error::InUse { .. } => false,
            Error::Protocol { .. } => true,
            Error::Drift { .. } => false,
            Error::Api { status, .. } => *status == 429 || *status >= 500,
            Error::Transport(_) => true,
            Error::Serialization { .. } => false,
            Error::Configuration { .. } => false,
            Error::Internal { .. } => true,
        }
    }

    /// Look up the validation finding for a given element index
    pub fn finding_for_index(&self, index: usize) -> Option<&ValidationFinding> {
        match self {
            Error::Validation { findings } => findings.iter().find(|f| f.index == Some(index)),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::serialization(e.to_string())
    }
}
