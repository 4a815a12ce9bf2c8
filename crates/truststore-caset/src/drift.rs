//! Read-side reconciliation of activation records
//!
//! The remote activation history is authoritative. On every read the locally
//! held activation is re-derived from it, which absorbs external
//! re-activations of the same version without any mutating call.

use std::sync::Arc;

use tracing::{debug, info};

use truststore_common::types::{most_recent_complete, Activation, ActivationType, CaSetStatus, Network};
use truststore_common::{Deadline, Error, Result};

use crate::client::TrustStoreClient;

/// Why the caller is reading
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReadIntent {
    /// Plain refresh of the held record
    #[default]
    Refresh,
    /// The held record is about to be replaced by an update
    PendingUpdate,
}

/// Result of reconciling a held activation against the remote history
#[derive(Clone, Debug, PartialEq)]
pub enum DriftOutcome {
    /// The desired version is live; the record carries authoritative fields
    Keep(Activation),
    /// Nothing is live for this CA set and network; drop the record
    Remove,
    /// Another version is live, and the caller is replacing its intent
    Superseded {
        /// Version currently active on the network
        active_version: i64,
    },
}

/// Re-derives activation state from remote history
#[derive(Clone)]
pub struct DriftReconciler {
    client: Arc<dyn TrustStoreClient>,
}

impl DriftReconciler {
    /// Create a reconciler using the given client
    pub fn new(client: Arc<dyn TrustStoreClient>) -> Self {
        Self { client }
    }

    /// Reconcile the belief that `desired_version` is live on `network`.
    ///
    /// Returns [`Error::Drift`] when the desired version is not live with a
    /// completed activation record and `intent` is [`ReadIntent::Refresh`].
    /// Both remote reads race `deadline`.
    pub async fn read(
        &self,
        ca_set_id: &str,
        desired_version: i64,
        network: Network,
        intent: ReadIntent,
        deadline: &Deadline,
    ) -> Result<DriftOutcome> {
        let ca_set = match deadline.guard(self.client.get_ca_set(ca_set_id)).await {
            Ok(ca_set) => ca_set,
            Err(e) if e.is_not_found() => {
                info!(ca_set_id = %ca_set_id, "CA set no longer exists, dropping activation");
                return Ok(DriftOutcome::Remove);
            }
            Err(e) => return Err(e),
        };

        if ca_set.ca_set_status == CaSetStatus::Deleted {
            info!(ca_set_id = %ca_set_id, "CA set is deleted, dropping activation");
            return Ok(DriftOutcome::Remove);
        }

        let Some(active_version) = ca_set.version_on(network) else {
            info!(
                ca_set_id = %ca_set_id,
                network = %network,
                "No version active on network, dropping activation"
            );
            return Ok(DriftOutcome::Remove);
        };

        let history = match deadline
            .guard(
                self.client
                    .list_ca_set_version_activations(ca_set_id, desired_version),
            )
            .await
        {
            Ok(history) => history,
            Err(e) if e.is_not_found() => {
                info!(
                    ca_set_id = %ca_set_id,
                    version = desired_version,
                    "CA set version no longer exists, dropping activation"
                );
                return Ok(DriftOutcome::Remove);
            }
            Err(e) => return Err(e),
        };

        let record = most_recent_complete(&history, desired_version, network, ActivationType::Activate);

        match record {
            Some(record) if active_version == desired_version => {
                debug!(
                    ca_set_id = %ca_set_id,
                    version = desired_version,
                    network = %network,
                    activation_id = record.activation_id,
                    "Activation matches remote state"
                );
                Ok(DriftOutcome::Keep(record.clone()))
            }
            _ => match intent {
                ReadIntent::PendingUpdate => {
                    debug!(
                        ca_set_id = %ca_set_id,
                        desired_version,
                        active_version,
                        "Activation superseded by pending update"
                    );
                    Ok(DriftOutcome::Superseded { active_version })
                }
                ReadIntent::Refresh => Err(Error::drift(
                    ca_set_id,
                    format!(
                        "version {} is not active on {} (active version is {})",
                        desired_version, network, active_version
                    ),
                )),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockTrustStoreClient;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;
    use truststore_common::types::{ActivationStatus, CaSet};

    fn ca_set(staging: Option<i64>, status: CaSetStatus) -> CaSet {
        CaSet {
            ca_set_id: "12345".to_string(),
            ca_set_name: "partner-roots".to_string(),
            staging_version: staging,
            ca_set_status: status,
            ..Default::default()
        }
    }

    fn completed(id: i64, version: i64, day: u32, modified_by: &str) -> Activation {
        Activation {
            activation_id: id,
            ca_set_id: "12345".to_string(),
            version,
            network: Network::Staging,
            activation_type: ActivationType::Activate,
            activation_status: ActivationStatus::Complete,
            created_by: Some("jdoe".to_string()),
            created_date: Some(Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap()),
            modified_by: Some(modified_by.to_string()),
            modified_date: Some(Utc.with_ymd_and_hms(2024, 3, day, 12, 5, 0).unwrap()),
            retry_after: None,
        }
    }

    fn reconciler(mock: MockTrustStoreClient) -> DriftReconciler {
        DriftReconciler::new(Arc::new(mock))
    }

    fn deadline() -> Deadline {
        Deadline::new("read of CA set 12345", Duration::from_secs(5), CancellationToken::new())
    }

    /// Story: someone re-activated the same version out of band; the read
    /// adopts the newer record and issues no mutating call
    #[tokio::test]
    async fn story_external_reactivation_is_absorbed() {
        let mut mock = MockTrustStoreClient::new();
        mock.expect_get_ca_set()
            .returning(|_| Ok(ca_set(Some(1), CaSetStatus::NotDeleted)));
        mock.expect_list_ca_set_version_activations()
            .times(1)
            .returning(|_, _| Ok(vec![completed(2, 1, 1, "jdoe"), completed(7, 1, 20, "ops")]));
        mock.expect_activate_ca_set_version().never();
        mock.expect_deactivate_ca_set_version().never();

        let outcome = reconciler(mock)
            .read("12345", 1, Network::Staging, ReadIntent::Refresh, &deadline())
            .await
            .unwrap();

        match outcome {
            DriftOutcome::Keep(record) => {
                assert_eq!(record.activation_id, 7);
                assert_eq!(record.modified_by.as_deref(), Some("ops"));
            }
            other => panic!("expected Keep, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_ca_set_removes_record() {
        let mut mock = MockTrustStoreClient::new();
        mock.expect_get_ca_set()
            .returning(|id| Err(Error::not_found("CA set", id)));
        mock.expect_list_ca_set_version_activations().never();

        let outcome = reconciler(mock)
            .read("12345", 1, Network::Staging, ReadIntent::Refresh, &deadline())
            .await
            .unwrap();
        assert_eq!(outcome, DriftOutcome::Remove);
    }

    #[tokio::test]
    async fn deleted_ca_set_removes_record() {
        let mut mock = MockTrustStoreClient::new();
        mock.expect_get_ca_set()
            .returning(|_| Ok(ca_set(Some(1), CaSetStatus::Deleted)));

        let outcome = reconciler(mock)
            .read("12345", 1, Network::Staging, ReadIntent::Refresh, &deadline())
            .await
            .unwrap();
        assert_eq!(outcome, DriftOutcome::Remove);
    }

    #[tokio::test]
    async fn nothing_active_on_network_removes_record() {
        let mut mock = MockTrustStoreClient::new();
        mock.expect_get_ca_set()
            .returning(|_| Ok(ca_set(None, CaSetStatus::NotDeleted)));
        mock.expect_list_ca_set_version_activations().never();

        let outcome = reconciler(mock)
            .read("12345", 1, Network::Staging, ReadIntent::Refresh, &deadline())
            .await
            .unwrap();
        assert_eq!(outcome, DriftOutcome::Remove);
    }

    #[tokio::test]
    async fn other_version_active_is_drift() {
        let mut mock = MockTrustStoreClient::new();
        mock.expect_get_ca_set()
            .returning(|_| Ok(ca_set(Some(2), CaSetStatus::NotDeleted)));
        mock.expect_list_ca_set_version_activations()
            .returning(|_, _| Ok(vec![completed(2, 1, 1, "jdoe")]));

        let err = reconciler(mock)
            .read("12345", 1, Network::Staging, ReadIntent::Refresh, &deadline())
            .await
            .unwrap_err();

        match err {
            Error::Drift { message, .. } => {
                assert!(message.contains("version 1 is not active on STAGING"));
                assert!(message.contains("active version is 2"));
            }
            other => panic!("expected Drift, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn active_version_without_completed_record_is_drift() {
        let mut mock = MockTrustStoreClient::new();
        mock.expect_get_ca_set()
            .returning(|_| Ok(ca_set(Some(1), CaSetStatus::NotDeleted)));
        mock.expect_list_ca_set_version_activations()
            .times(1)
            .returning(|_, _| Ok(vec![]));
        mock.expect_activate_ca_set_version().never();

        let err = reconciler(mock)
            .read("12345", 1, Network::Staging, ReadIntent::Refresh, &deadline())
            .await
            .unwrap_err();

        match err {
            Error::Drift { message, .. } => {
                assert!(message.contains("version 1 is not active on STAGING"));
                assert!(message.contains("active version is 1"));
            }
            other => panic!("expected Drift, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn cancelled_read_is_a_timeout() {
        let mut mock = MockTrustStoreClient::new();
        mock.expect_get_ca_set()
            .returning(|_| Ok(ca_set(Some(1), CaSetStatus::NotDeleted)));
        mock.expect_list_ca_set_version_activations().never();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let deadline = Deadline::new("read of CA set 12345", Duration::from_secs(5), cancel);

        let err = reconciler(mock)
            .read("12345", 1, Network::Staging, ReadIntent::Refresh, &deadline)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
    }

    #[tokio::test]
    async fn pending_update_supersedes_instead_of_failing() {
        let mut mock = MockTrustStoreClient::new();
        mock.expect_get_ca_set()
            .returning(|_| Ok(ca_set(Some(2), CaSetStatus::NotDeleted)));
        mock.expect_list_ca_set_version_activations()
            .returning(|_, _| Ok(vec![]));

        let outcome = reconciler(mock)
            .read("12345", 1, Network::Staging, ReadIntent::PendingUpdate, &deadline())
            .await
            .unwrap();
        assert_eq!(outcome, DriftOutcome::Superseded { active_version: 2 });
    }

    #[tokio::test]
    async fn transport_errors_are_surfaced() {
        let mut mock = MockTrustStoreClient::new();
        mock.expect_get_ca_set()
            .returning(|_| Err(Error::Transport("connection refused".to_string())));

        let err = reconciler(mock)
            .read("12345", 1, Network::Staging, ReadIntent::Refresh, &deadline())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }
}
