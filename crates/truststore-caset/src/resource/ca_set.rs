//! CA set lifecycle hooks
//!
//! A CA set resource covers the set itself plus its latest version. Version
//! edits go through the [`MutationGuard`], so a version that was ever live is
//! never rewritten.

use serde_json::{json, Value};
use tracing::{debug, info};

use truststore_common::types::{
    CaSet, CaSetStatus, CaSetVersion, Certificate, CertificateInput, CreateCaSetRequest,
    VersionUpdate,
};
use truststore_common::{Deadline, Error, Result};

use super::{
    carry_timeouts, optional_string, optional_time, AttributeBag, Attributes, OperationTimeouts,
    ResourceContext,
};
use crate::deletion::DeletionCoordinator;
use crate::mutation::MutationGuard;

/// Lifecycle hooks for a CA set and its latest version
#[derive(Clone)]
pub struct CaSetResource {
    ctx: ResourceContext,
    mutation: MutationGuard,
    deletion: DeletionCoordinator,
}

impl CaSetResource {
    /// Build the hooks over a shared context
    pub fn new(ctx: ResourceContext) -> Self {
        Self {
            mutation: MutationGuard::new(ctx.client.clone()),
            deletion: DeletionCoordinator::new(ctx.client.clone())
                .with_poll_config(ctx.deletion_poll.clone()),
            ctx,
        }
    }

    /// Create the CA set and its first version
    pub async fn create(&self, bag: &AttributeBag) -> Result<AttributeBag> {
        let attrs = Attributes::new(bag);
        let request = CreateCaSetRequest {
            ca_set_name: attrs.require_str("name")?.to_string(),
            description: attrs.get_str("description")?.map(str::to_string),
            account_id: attrs.get_str("account_id")?.map(str::to_string),
        };
        let body = version_update(&attrs)?;
        let timeouts = OperationTimeouts::from_bag(bag)?;
        let deadline = Deadline::new(
            format!("creation of CA set {}", request.ca_set_name),
            timeouts.create,
            self.ctx.cancel.clone(),
        );

        let created = deadline
            .guard(self.ctx.client.create_ca_set(&request))
            .await?;
        info!(ca_set_id = %created.ca_set_id, name = %created.ca_set_name, "Created CA set");

        let version = deadline
            .guard(
                self.ctx
                    .client
                    .create_ca_set_version(&created.ca_set_id, &body),
            )
            .await?;
        info!(
            ca_set_id = %created.ca_set_id,
            version = version.version,
            certificates = version.certificates.len(),
            "Created CA set version"
        );

        let ca_set = deadline
            .guard(self.ctx.client.get_ca_set(&created.ca_set_id))
            .await?;

        let mut state = to_bag(&ca_set, Some(&version));
        carry_timeouts(bag, &mut state);
        Ok(state)
    }

    /// Refresh from the remote state; `None` means the CA set is gone
    pub async fn read(&self, bag: &AttributeBag) -> Result<Option<AttributeBag>> {
        let id = Attributes::new(bag).require_str("id")?;
        let deadline = self.ctx.read_deadline(format!("read of CA set {}", id));

        let Some((ca_set, version)) = self.fetch(id, &deadline).await? else {
            return Ok(None);
        };

        let mut state = to_bag(&ca_set, version.as_ref());
        carry_timeouts(bag, &mut state);
        Ok(Some(state))
    }

    /// Apply changes from `previous` to `bag`.
    ///
    /// Certificate and version flag changes produce a version edit; the name
    /// and description of the set cannot change in place.
    pub async fn update(
        &self,
        bag: &AttributeBag,
        previous: &AttributeBag,
    ) -> Result<AttributeBag> {
        let attrs = Attributes::new(bag);
        let prev = Attributes::new(previous);
        let id = prev.require_str("id")?;

        for key in ["name", "description"] {
            if attrs.get_str(key)? != prev.get_str(key)? {
                return Err(Error::configuration(
                    key,
                    format!(
                        "cannot be changed in place for CA set {}; the CA set must be replaced",
                        id
                    ),
                ));
            }
        }

        let timeouts = OperationTimeouts::from_bag(bag)?;
        let deadline = Deadline::new(
            format!("update of CA set {}", id),
            timeouts.update,
            self.ctx.cancel.clone(),
        );

        let edit = version_update(&attrs)?;
        if edit == version_update(&prev)? {
            debug!(ca_set_id = %id, "No version changes to apply");
            let (ca_set, version) = self
                .fetch(id, &deadline)
                .await?
                .ok_or_else(|| Error::not_found("CA set", id))?;
            let mut state = to_bag(&ca_set, version.as_ref());
            carry_timeouts(bag, &mut state);
            return Ok(state);
        }

        let ca_set = deadline.guard(self.ctx.client.get_ca_set(id)).await?;
        let version = match ca_set.latest_version {
            Some(current) => {
                let edited = deadline.guard(self.mutation.apply(id, current, &edit)).await?;
                if let Some(source) = edited.cloned_from {
                    info!(
                        ca_set_id = %id,
                        source_version = source,
                        latest_version = edited.version.version,
                        "CA set latest version advanced"
                    );
                }
                edited.version
            }
            None => {
                deadline
                    .guard(self.ctx.client.create_ca_set_version(id, &edit))
                    .await?
            }
        };

        let ca_set = deadline.guard(self.ctx.client.get_ca_set(id)).await?;
        let mut state = to_bag(&ca_set, Some(&version));
        carry_timeouts(bag, &mut state);
        Ok(state)
    }

    /// Delete the CA set and wait for removal on every network
    pub async fn delete(&self, bag: &AttributeBag) -> Result<()> {
        let id = Attributes::new(bag).require_str("id")?;
        let timeouts = OperationTimeouts::from_bag(bag)?;
        self.deletion
            .delete(id, timeouts.delete, self.ctx.cancel.clone())
            .await
    }

    /// Build state for an existing CA set; a missing set is an error
    pub async fn import(&self, id: &str) -> Result<AttributeBag> {
        let deadline = self.ctx.read_deadline(format!("import of CA set {}", id));
        let (ca_set, version) = self
            .fetch(id, &deadline)
            .await?
            .ok_or_else(|| Error::not_found("CA set", id))?;
        Ok(to_bag(&ca_set, version.as_ref()))
    }

    async fn fetch(
        &self,
        id: &str,
        deadline: &Deadline,
    ) -> Result<Option<(CaSet, Option<CaSetVersion>)>> {
        let ca_set = match deadline.guard(self.ctx.client.get_ca_set(id)).await {
            Ok(ca_set) => ca_set,
            Err(e) if e.is_not_found() => {
                info!(ca_set_id = %id, "CA set not found, dropping from state");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if ca_set.ca_set_status == CaSetStatus::Deleted {
            info!(ca_set_id = %id, "CA set is deleted, dropping from state");
            return Ok(None);
        }

        let version = match ca_set.latest_version {
            Some(latest) => match deadline
                .guard(self.ctx.client.get_ca_set_version(id, latest))
                .await
            {
                Ok(version) => Some(version),
                Err(e) if e.is_not_found() => None,
                Err(e) => return Err(e),
            },
            None => None,
        };

        Ok(Some((ca_set, version)))
    }
}

/// Decode the version-level attributes of a bag
fn version_update(attrs: &Attributes<'_>) -> Result<VersionUpdate> {
    let certificates = attrs
        .get_objects("certificates")?
        .iter()
        .map(|cert| {
            Ok(CertificateInput {
                certificate_pem: cert.require_str("certificate_pem")?.trim().to_string(),
                description: cert.get_str("description")?.map(str::to_string),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(VersionUpdate {
        description: attrs.get_str("version_description")?.map(str::to_string),
        allow_insecure_sha1: attrs.get_bool("allow_insecure_sha1")?.unwrap_or(false),
        certificates,
    })
}

fn certificate_value(cert: &Certificate) -> Value {
    json!({
        "certificate_pem": cert.certificate_pem.trim(),
        "description": optional_string(cert.description.as_deref()),
        "subject": optional_string(cert.subject.as_deref()),
        "issuer": optional_string(cert.issuer.as_deref()),
        "start_date": optional_time(cert.start_date),
        "end_date": optional_time(cert.end_date),
        "fingerprint": optional_string(cert.fingerprint.as_deref()),
        "serial_number": optional_string(cert.serial_number.as_deref()),
        "signature_algorithm": optional_string(cert.signature_algorithm.as_deref()),
    })
}

/// Encode a CA set and (optionally) its latest version
fn to_bag(ca_set: &CaSet, version: Option<&CaSetVersion>) -> AttributeBag {
    let mut bag = AttributeBag::new();
    bag.insert("id".to_string(), json!(ca_set.ca_set_id));
    bag.insert("name".to_string(), json!(ca_set.ca_set_name));
    bag.insert(
        "description".to_string(),
        optional_string(ca_set.description.as_deref()),
    );
    bag.insert(
        "account_id".to_string(),
        optional_string(ca_set.account_id.as_deref()),
    );
    bag.insert("latest_version".to_string(), json!(ca_set.latest_version));
    bag.insert("staging_version".to_string(), json!(ca_set.staging_version));
    bag.insert(
        "production_version".to_string(),
        json!(ca_set.production_version),
    );
    bag.insert(
        "created_by".to_string(),
        optional_string(ca_set.created_by.as_deref()),
    );
    bag.insert("created_date".to_string(), optional_time(ca_set.created_date));

    if let Some(version) = version {
        bag.insert(
            "version_description".to_string(),
            optional_string(version.description.as_deref()),
        );
        bag.insert(
            "allow_insecure_sha1".to_string(),
            json!(version.allow_insecure_sha1),
        );
        bag.insert(
            "certificates".to_string(),
            Value::Array(version.certificates.iter().map(certificate_value).collect()),
        );
        bag.insert(
            "version_created_by".to_string(),
            optional_string(version.created_by.as_deref()),
        );
        bag.insert(
            "version_created_date".to_string(),
            optional_time(version.created_date),
        );
        bag.insert(
            "version_modified_by".to_string(),
            optional_string(version.modified_by.as_deref()),
        );
        bag.insert(
            "version_modified_date".to_string(),
            optional_time(version.modified_date),
        );
    }

    bag
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockTrustStoreClient;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use truststore_common::types::{
        Activation, ActivationStatus, ActivationType, Associations, Network,
    };
    use truststore_common::PollConfig;

    const PEM: &str = "-----BEGIN CERTIFICATE-----\nMIIBszCCAVmgAwIBAgIU\n-----END CERTIFICATE-----";

    fn bag(value: Value) -> AttributeBag {
        match value {
            Value::Object(map) => map,
            _ => panic!("test bag must be an object"),
        }
    }

    fn remote_set(latest: Option<i64>) -> CaSet {
        CaSet {
            ca_set_id: "12345".to_string(),
            ca_set_name: "partner-roots".to_string(),
            description: Some("partner CAs".to_string()),
            latest_version: latest,
            ..Default::default()
        }
    }

    fn remote_version(version: i64, description: Option<&str>) -> CaSetVersion {
        CaSetVersion {
            version,
            description: description.map(str::to_string),
            certificates: vec![Certificate {
                certificate_pem: PEM.to_string(),
                description: Some("root".to_string()),
                subject: Some("CN=Partner Root".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn config() -> AttributeBag {
        bag(json!({
            "name": "partner-roots",
            "description": "partner CAs",
            "version_description": "initial",
            "certificates": [{"certificate_pem": PEM, "description": "root"}],
            "timeouts": {"create": "30m"},
        }))
    }

    fn resource(mock: MockTrustStoreClient) -> CaSetResource {
        let fast = PollConfig::fixed(Duration::from_millis(1));
        CaSetResource::new(ResourceContext::new(Arc::new(mock)).with_poll_configs(fast.clone(), fast))
    }

    #[tokio::test]
    async fn create_makes_set_then_first_version() {
        let mut mock = MockTrustStoreClient::new();
        mock.expect_create_ca_set()
            .withf(|req| req.ca_set_name == "partner-roots")
            .times(1)
            .returning(|_| Ok(remote_set(None)));
        mock.expect_create_ca_set_version()
            .withf(|id, body| {
                id == "12345"
                    && body.certificates.len() == 1
                    && body.description.as_deref() == Some("initial")
            })
            .times(1)
            .returning(|_, body| Ok(remote_version(1, body.description.as_deref())));
        mock.expect_get_ca_set()
            .returning(|_| Ok(remote_set(Some(1))));

        let state = resource(mock).create(&config()).await.unwrap();

        assert_eq!(state["id"], json!("12345"));
        assert_eq!(state["latest_version"], json!(1));
        assert_eq!(state["certificates"][0]["subject"], json!("CN=Partner Root"));
        assert_eq!(state["timeouts"], json!({"create": "30m"}));
    }

    #[tokio::test]
    async fn malformed_certificates_fail_before_any_call() {
        let mut mock = MockTrustStoreClient::new();
        mock.expect_create_ca_set().never();

        let mut input = config();
        input.insert("certificates".to_string(), json!("not-a-list"));

        match resource(mock).create(&input).await {
            Err(Error::Configuration { key, .. }) => assert_eq!(key, "certificates"),
            other => panic!("expected Configuration error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn read_drops_missing_or_deleted_sets() {
        let mut mock = MockTrustStoreClient::new();
        mock.expect_get_ca_set()
            .times(1)
            .returning(|id| Err(Error::not_found("CA set", id)));
        let state = resource(mock).read(&bag(json!({"id": "12345"}))).await.unwrap();
        assert!(state.is_none());

        let mut mock = MockTrustStoreClient::new();
        mock.expect_get_ca_set().returning(|_| {
            Ok(CaSet {
                ca_set_status: CaSetStatus::Deleted,
                ..remote_set(Some(1))
            })
        });
        mock.expect_get_ca_set_version().never();
        let state = resource(mock).read(&bag(json!({"id": "12345"}))).await.unwrap();
        assert!(state.is_none());
    }

    #[tokio::test]
    async fn read_refreshes_latest_version() {
        let mut mock = MockTrustStoreClient::new();
        mock.expect_get_ca_set()
            .returning(|_| Ok(remote_set(Some(3))));
        mock.expect_get_ca_set_version()
            .with(mockall::predicate::eq("12345"), mockall::predicate::eq(3))
            .returning(|_, v| Ok(remote_version(v, Some("third"))));

        let state = resource(mock)
            .read(&bag(json!({"id": "12345", "timeouts": {"delete": "2h"}})))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(state["version_description"], json!("third"));
        assert_eq!(state["timeouts"], json!({"delete": "2h"}));
    }

    #[tokio::test]
    async fn renaming_is_rejected_without_remote_calls() {
        let mut mock = MockTrustStoreClient::new();
        mock.expect_get_ca_set().never();
        mock.expect_update_ca_set_version().never();

        let mut previous = config();
        previous.insert("id".to_string(), json!("12345"));
        let mut wanted = previous.clone();
        wanted.insert("name".to_string(), json!("renamed"));

        let err = resource(mock).update(&wanted, &previous).await.unwrap_err();
        assert!(err.to_string().contains("must be replaced"));
        match err {
            Error::Configuration { key, .. } => assert_eq!(key, "name"),
            other => panic!("expected Configuration error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn changing_description_is_rejected() {
        let mut mock = MockTrustStoreClient::new();
        mock.expect_get_ca_set().never();

        let mut previous = config();
        previous.insert("id".to_string(), json!("12345"));
        let mut wanted = previous.clone();
        wanted.insert("description".to_string(), json!("new words"));

        match resource(mock).update(&wanted, &previous).await.unwrap_err() {
            Error::Configuration { key, .. } => assert_eq!(key, "description"),
            other => panic!("expected Configuration error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unchanged_version_is_not_rewritten() {
        let mut mock = MockTrustStoreClient::new();
        mock.expect_get_ca_set()
            .returning(|_| Ok(remote_set(Some(1))));
        mock.expect_get_ca_set_version()
            .returning(|_, v| Ok(remote_version(v, Some("initial"))));
        mock.expect_list_ca_set_version_activations().never();
        mock.expect_update_ca_set_version().never();
        mock.expect_clone_ca_set_version().never();

        let mut previous = config();
        previous.insert("id".to_string(), json!("12345"));

        let state = resource(mock).update(&previous.clone(), &previous).await.unwrap();
        assert_eq!(state["latest_version"], json!(1));
    }

    /// Story: editing certificates of a version that was live goes to a
    /// clone and the latest version advances
    #[tokio::test]
    async fn story_editing_live_version_advances_latest() {
        let mut mock = MockTrustStoreClient::new();
        let reads = Arc::new(AtomicU32::new(0));
        let r = reads.clone();
        mock.expect_get_ca_set().times(2).returning(move |_| {
            let latest = if r.fetch_add(1, Ordering::SeqCst) == 0 { 1 } else { 2 };
            Ok(remote_set(Some(latest)))
        });
        mock.expect_list_ca_set_version_activations()
            .times(1)
            .returning(|_, v| {
                Ok(vec![Activation {
                    activation_id: 4,
                    ca_set_id: "12345".to_string(),
                    version: v,
                    network: Network::Production,
                    activation_type: ActivationType::Activate,
                    activation_status: ActivationStatus::Complete,
                    created_by: None,
                    created_date: None,
                    modified_by: None,
                    modified_date: None,
                    retry_after: None,
                }])
            });
        mock.expect_clone_ca_set_version()
            .times(1)
            .returning(|_, _| Ok(remote_version(2, Some("Cloned from version 1"))));
        mock.expect_update_ca_set_version()
            .withf(|_, version, body| *version == 2 && body.certificates.len() == 2)
            .times(1)
            .returning(|_, v, body| Ok(remote_version(v, body.description.as_deref())));

        let mut previous = config();
        previous.insert("id".to_string(), json!("12345"));
        let mut wanted = previous.clone();
        wanted.insert(
            "certificates".to_string(),
            json!([
                {"certificate_pem": PEM, "description": "root"},
                {"certificate_pem": PEM, "description": "intermediate"},
            ]),
        );

        let state = resource(mock).update(&wanted, &previous).await.unwrap();
        assert_eq!(state["latest_version"], json!(2));
    }

    #[tokio::test]
    async fn delete_is_gated_by_associations() {
        let mut mock = MockTrustStoreClient::new();
        mock.expect_get_ca_set()
            .returning(|_| Ok(remote_set(Some(1))));
        mock.expect_list_ca_set_associations().returning(|_| {
            Ok(Associations {
                properties: vec![truststore_common::types::PropertyAssociation {
                    property_id: "prp_9".to_string(),
                    property_name: Some("checkout".to_string()),
                    asset_id: None,
                    group_id: None,
                }],
                enrollments: vec![],
            })
        });
        mock.expect_delete_ca_set().never();

        let err = resource(mock)
            .delete(&bag(json!({"id": "12345"})))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InUse { .. }));
    }

    #[tokio::test]
    async fn import_of_unknown_set_is_an_error() {
        let mut mock = MockTrustStoreClient::new();
        mock.expect_get_ca_set()
            .returning(|id| Err(Error::not_found("CA set", id)));

        let err = resource(mock).import("99999").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
