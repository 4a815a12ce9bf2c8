//! CA set lifecycle orchestration crate
//!
//! This crate provides:
//! - TrustStoreClient trait and its HTTP implementation
//! - AssociationGuard and MutationGuard for destructive and version-editing operations
//! - ActivationOrchestrator for activating and deactivating versions per network
//! - DriftReconciler for re-deriving activation state from remote history
//! - DeletionCoordinator for driving CA set deletion to completion
//! - Host-facing lifecycle hooks over attribute bags

#![deny(missing_docs)]

pub mod activation;
pub mod association;
pub mod client;
pub mod config;
pub mod deletion;
pub mod drift;
pub mod mutation;
pub mod resource;

// Re-export client types
pub use client::{HttpTrustStoreClient, TrustStoreClient};
pub use config::ClientConfig;

#[cfg(test)]
pub use client::MockTrustStoreClient;

// Re-export orchestration components
pub use activation::{ActivationOrchestrator, ActivationOutcome, ActivationRequest};
pub use association::{describe_associations, AssociationGuard};
pub use deletion::DeletionCoordinator;
pub use drift::{DriftOutcome, DriftReconciler, ReadIntent};
pub use mutation::{decide_target, MutationGuard, VersionEdit, VersionTarget};

// Re-export lifecycle hooks
pub use resource::{
    AttributeBag, CaSetActivationResource, CaSetResource, OperationTimeouts, ResourceContext,
};
