//! Common types for trust-store CA set management: remote data model,
//! errors, polling and telemetry

#![deny(missing_docs)]

pub mod error;
pub mod polling;
pub mod telemetry;
pub mod types;

pub use error::{Error, ValidationFinding};
pub use polling::{Deadline, PollConfig, PollStep};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Base path of the trust-store API
pub const API_BASE_PATH: &str = "/mtls-edge-truststore/v2";
