//! CA set deletion
//!
//! Deletion is asynchronous on the remote side: a single delete call starts
//! removal on every network and the coordinator polls the deletion status
//! until it settles. A CA set that is already absent counts as deleted.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use truststore_common::polling::poll_until_done;
use truststore_common::types::{CaSetStatus, DeletionState, DeletionStatus};
use truststore_common::{Deadline, Error, PollConfig, PollStep, Result};

use crate::association::AssociationGuard;
use crate::client::TrustStoreClient;

/// Whether a delete call was needed
enum Requested {
    Started,
    AlreadyGone,
}

/// Drives CA set deletion to completion
#[derive(Clone)]
pub struct DeletionCoordinator {
    client: Arc<dyn TrustStoreClient>,
    associations: AssociationGuard,
    poll: PollConfig,
}

impl DeletionCoordinator {
    /// Create a coordinator with the default deletion poll intervals
    pub fn new(client: Arc<dyn TrustStoreClient>) -> Self {
        Self {
            associations: AssociationGuard::new(client.clone()),
            client,
            poll: PollConfig::deletion(),
        }
    }

    /// Override the poll intervals
    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Delete `ca_set_id` and wait until removal finishes on every network.
    ///
    /// Fails with [`Error::InUse`] without deleting anything while the CA
    /// set is referenced. A FAILED deletion is returned as a
    /// [`Error::RemoteFailure`] flagged for manual intervention.
    pub async fn delete(
        &self,
        ca_set_id: &str,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<()> {
        let deadline = Deadline::new(format!("deletion of CA set {}", ca_set_id), timeout, cancel);

        let ca_set = match deadline.guard(self.client.get_ca_set(ca_set_id)).await {
            Ok(ca_set) => ca_set,
            Err(e) if e.is_not_found() => {
                info!(ca_set_id = %ca_set_id, "CA set already absent, nothing to delete");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        match ca_set.ca_set_status {
            CaSetStatus::Deleted => {
                info!(ca_set_id = %ca_set_id, "CA set already deleted");
                return Ok(());
            }
            CaSetStatus::Deleting => {
                info!(ca_set_id = %ca_set_id, "Deletion already in progress, waiting for it");
            }
            CaSetStatus::NotDeleted => {
                if let Requested::AlreadyGone = self.request_deletion(ca_set_id, &deadline).await? {
                    return Ok(());
                }
            }
        }

        match self.wait_for_deletion(ca_set_id, &deadline).await {
            Ok(()) => {
                info!(ca_set_id = %ca_set_id, elapsed_ms = deadline.elapsed().as_millis() as u64, "CA set deleted");
                Ok(())
            }
            Err(e) => {
                warn!(ca_set_id = %ca_set_id, error = %e, "CA set deletion did not complete");
                Err(e)
            }
        }
    }

    async fn request_deletion(&self, ca_set_id: &str, deadline: &Deadline) -> Result<Requested> {
        match deadline
            .guard(self.associations.check_not_in_use(ca_set_id))
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_not_found() => return Ok(Requested::AlreadyGone),
            Err(e) => return Err(e),
        }

        match deadline.guard(self.client.delete_ca_set(ca_set_id)).await {
            Ok(()) => {
                info!(ca_set_id = %ca_set_id, "Requested CA set deletion");
                Ok(Requested::Started)
            }
            Err(e) if e.is_not_found() => {
                info!(ca_set_id = %ca_set_id, "CA set vanished before delete call");
                Ok(Requested::AlreadyGone)
            }
            Err(e) => Err(e),
        }
    }

    async fn wait_for_deletion(&self, ca_set_id: &str, deadline: &Deadline) -> Result<()> {
        let client = &self.client;
        poll_until_done(deadline, &self.poll, move || async move {
            let status = match client.get_ca_set_deletion_status(ca_set_id).await {
                Ok(status) => status,
                Err(e) if e.is_not_found() => return Ok(PollStep::Done(())),
                Err(e) => return Err(e),
            };
            check_deletion(ca_set_id, status)
        })
        .await
    }
}

fn check_deletion(ca_set_id: &str, status: DeletionStatus) -> Result<PollStep<()>> {
    match status.status {
        DeletionState::Complete => Ok(PollStep::Done(())),
        DeletionState::InProgress => {
            for network in &status.deletions {
                debug!(
                    ca_set_id = %ca_set_id,
                    network = %network.network,
                    status = ?network.status,
                    percent_complete = ?network.percent_complete,
                    "Deletion progress"
                );
            }
            Ok(PollStep::Pending {
                retry_after: status.retry_after,
            })
        }
        DeletionState::Failed => {
            let reason = status.failure_reason().unwrap_or("no failure reason reported");
            Err(Error::remote_failure_manual(
                "deletion",
                ca_set_id,
                format!("{}; manual intervention is required on the trust-store service before retrying", reason),
            ))
        }
    }
}
