//! In-use guard for destructive operations
//!
//! A CA set referenced by a property or an enrollment must not be deleted or
//! deactivated. The guard is read-only: it lists associations and turns a
//! non-empty listing into [`Error::InUse`].

use std::sync::Arc;

use tracing::{debug, info};

use truststore_common::types::Associations;
use truststore_common::{Error, Result};

use crate::client::TrustStoreClient;

/// Render a human-readable listing of whatever references the CA set.
///
/// Enrollments take precedence over properties when both are present.
/// Returns `None` when nothing references the CA set.
pub fn describe_associations(associations: &Associations) -> Option<String> {
    if associations.is_empty() {
        return None;
    }

    if !associations.enrollments.is_empty() {
        let entries: Vec<String> = associations
            .enrollments
            .iter()
            .map(|e| match &e.cn {
                Some(cn) => format!("'{}' (enrollment {})", cn, e.enrollment_id),
                None => format!("enrollment {}", e.enrollment_id),
            })
            .collect();
        return Some(format!("used by enrollments: {}", entries.join(", ")));
    }

    let entries: Vec<String> = associations
        .properties
        .iter()
        .map(|p| match &p.property_name {
            Some(name) => format!("'{}' (property {})", name, p.property_id),
            None => format!("property {}", p.property_id),
        })
        .collect();
    Some(format!("used by properties: {}", entries.join(", ")))
}

/// Read-only guard over a CA set's associations
#[derive(Clone)]
pub struct AssociationGuard {
    client: Arc<dyn TrustStoreClient>,
}

impl AssociationGuard {
    /// Create a guard using the given client
    pub fn new(client: Arc<dyn TrustStoreClient>) -> Self {
        Self { client }
    }

    /// Fail with [`Error::InUse`] if anything references the CA set.
    ///
    /// A missing CA set surfaces as [`Error::NotFound`]; callers decide
    /// whether that means "already gone".
    pub async fn check_not_in_use(&self, ca_set_id: &str) -> Result<()> {
        let associations = self.client.list_ca_set_associations(ca_set_id).await?;

        match describe_associations(&associations) {
            Some(listing) => {
                info!(
                    ca_set_id = %ca_set_id,
                    properties = associations.properties.len(),
                    enrollments = associations.enrollments.len(),
                    "CA set is in use"
                );
                Err(Error::in_use(ca_set_id, listing))
            }
            None => {
                debug!(ca_set_id = %ca_set_id, "CA set has no associations");
                Ok(())
            }
        }
    }
}
