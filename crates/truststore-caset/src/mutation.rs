//! Copy-on-write guard for CA set version edits
//!
//! A version that has ever completed an ACTIVATE on either network must never
//! be rewritten in place. Edits to such a version are applied to a fresh
//! clone instead, which also advances the CA set's latest-version pointer.

use std::sync::Arc;

use tracing::info;

use truststore_common::types::{Activation, ActivationStatus, ActivationType, CaSetVersion, VersionUpdate};
use truststore_common::Result;

use crate::client::TrustStoreClient;

/// Where a version edit must be written
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VersionTarget {
    /// Update this version in place
    Reuse(i64),
    /// Clone this version first and update the clone
    Clone(i64),
}

/// Decide whether `current_version` may be edited in place.
///
/// `history` is the version's activation history on every network. Any
/// COMPLETE ACTIVATE record, even one later undone by a deactivation, forces
/// a clone.
pub fn decide_target(current_version: i64, history: &[Activation]) -> VersionTarget {
    let ever_live = history.iter().any(|a| {
        a.version == current_version
            && a.activation_type == ActivationType::Activate
            && a.activation_status == ActivationStatus::Complete
    });

    if ever_live {
        VersionTarget::Clone(current_version)
    } else {
        VersionTarget::Reuse(current_version)
    }
}

/// Description written to a clone when the edit does not carry one
pub fn clone_description(source_version: i64) -> String {
    format!("Cloned from version {}", source_version)
}

/// Outcome of an applied edit
#[derive(Clone, Debug, PartialEq)]
pub struct VersionEdit {
    /// The version as stored after the edit
    pub version: CaSetVersion,
    /// Source version when the edit went to a clone
    pub cloned_from: Option<i64>,
}

/// Applies version edits, cloning when the current version has been live
#[derive(Clone)]
pub struct MutationGuard {
    client: Arc<dyn TrustStoreClient>,
}

impl MutationGuard {
    /// Create a guard using the given client
    pub fn new(client: Arc<dyn TrustStoreClient>) -> Self {
        Self { client }
    }

    /// Apply `edit` to the CA set's current version, or to a clone of it.
    ///
    /// Issues exactly one of: an update, or a clone followed by an update
    /// of the clone.
    pub async fn apply(
        &self,
        ca_set_id: &str,
        current_version: i64,
        edit: &VersionUpdate,
    ) -> Result<VersionEdit> {
        let history = self
            .client
            .list_ca_set_version_activations(ca_set_id, current_version)
            .await?;

        match decide_target(current_version, &history) {
            VersionTarget::Reuse(version) => {
                info!(ca_set_id = %ca_set_id, version, "Updating CA set version in place");
                let updated = self
                    .client
                    .update_ca_set_version(ca_set_id, version, edit)
                    .await?;
                Ok(VersionEdit {
                    version: updated,
                    cloned_from: None,
                })
            }
            VersionTarget::Clone(source) => {
                let clone = self.client.clone_ca_set_version(ca_set_id, source).await?;
                info!(
                    ca_set_id = %ca_set_id,
                    source_version = source,
                    new_version = clone.version,
                    "Version has been activated before, editing a clone"
                );

                let mut body = edit.clone();
                if body.description.is_none() {
                    body.description = Some(clone_description(source));
                }

                let updated = self
                    .client
                    .update_ca_set_version(ca_set_id, clone.version, &body)
                    .await?;
                Ok(VersionEdit {
                    version: updated,
                    cloned_from: Some(source),
                })
            }
        }
    }
}
