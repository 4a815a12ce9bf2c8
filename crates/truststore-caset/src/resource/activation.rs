//! CA set activation lifecycle hooks
//!
//! An activation resource states "version V of CA set S is live on network
//! N". Reads go through the [`DriftReconciler`]; writes go through the
//! [`ActivationOrchestrator`].

use tracing::info;

use truststore_common::types::{Activation, Network, VersionNetworkStatus};
use truststore_common::{Deadline, Error, Result};

use super::{
    carry_timeouts, optional_string, optional_time, AttributeBag, Attributes, OperationTimeouts,
    ResourceContext,
};
use crate::activation::ActivationOrchestrator;
use crate::drift::{DriftOutcome, DriftReconciler, ReadIntent};

/// Identity of an activation resource
#[derive(Clone, Debug, PartialEq, Eq)]
struct Target {
    ca_set_id: String,
    version: i64,
    network: Network,
}

impl Target {
    fn from_bag(bag: &AttributeBag) -> Result<Self> {
        let attrs = Attributes::new(bag);
        Ok(Self {
            ca_set_id: attrs.require_str("ca_set_id")?.to_string(),
            version: attrs.require_i64("version")?,
            network: attrs.require_str("network")?.parse()?,
        })
    }
}

/// Lifecycle hooks for a CA set version activation
#[derive(Clone)]
pub struct CaSetActivationResource {
    ctx: ResourceContext,
    orchestrator: ActivationOrchestrator,
    drift: DriftReconciler,
}

impl CaSetActivationResource {
    /// Build the hooks over a shared context
    pub fn new(ctx: ResourceContext) -> Self {
        Self {
            orchestrator: ActivationOrchestrator::new(ctx.client.clone())
                .with_poll_config(ctx.activation_poll.clone()),
            drift: DriftReconciler::new(ctx.client.clone()),
            ctx,
        }
    }

    /// Activate the configured version and wait for it to go live
    pub async fn create(&self, bag: &AttributeBag) -> Result<AttributeBag> {
        let target = Target::from_bag(bag)?;
        let timeouts = OperationTimeouts::from_bag(bag)?;

        let outcome = self
            .orchestrator
            .activate(
                &target.ca_set_id,
                target.version,
                target.network,
                timeouts.create,
                self.ctx.cancel.clone(),
            )
            .await?;

        let mut state = to_bag(outcome.activation());
        carry_timeouts(bag, &mut state);
        Ok(state)
    }

    /// Reconcile against remote history; `None` means nothing is live
    pub async fn read(&self, bag: &AttributeBag) -> Result<Option<AttributeBag>> {
        self.reconcile(bag, ReadIntent::Refresh).await
    }

    /// Like [`Self::read`], but a different live version is tolerated
    /// because the caller is about to replace the desired version
    pub async fn read_for_update(&self, bag: &AttributeBag) -> Result<Option<AttributeBag>> {
        self.reconcile(bag, ReadIntent::PendingUpdate).await
    }

    async fn reconcile(
        &self,
        bag: &AttributeBag,
        intent: ReadIntent,
    ) -> Result<Option<AttributeBag>> {
        let target = Target::from_bag(bag)?;
        let deadline = self
            .ctx
            .read_deadline(format!("read of activation on {}", target.network));

        match self
            .drift
            .read(
                &target.ca_set_id,
                target.version,
                target.network,
                intent,
                &deadline,
            )
            .await?
        {
            DriftOutcome::Keep(record) => {
                let mut state = to_bag(&record);
                carry_timeouts(bag, &mut state);
                Ok(Some(state))
            }
            DriftOutcome::Remove => Ok(None),
            DriftOutcome::Superseded { .. } => Ok(Some(bag.clone())),
        }
    }

    /// Move the activation to a new version on the same network
    pub async fn update(
        &self,
        bag: &AttributeBag,
        previous: &AttributeBag,
    ) -> Result<AttributeBag> {
        let wanted = Target::from_bag(bag)?;
        let current = Target::from_bag(previous)?;

        for (key, changed) in [
            ("ca_set_id", wanted.ca_set_id != current.ca_set_id),
            ("network", wanted.network != current.network),
        ] {
            if changed {
                return Err(Error::configuration(
                    key,
                    "cannot be changed in place; the activation must be replaced",
                ));
            }
        }

        if wanted.version == current.version {
            return self
                .read(bag)
                .await?
                .ok_or_else(|| Error::not_found("activation of CA set", &wanted.ca_set_id));
        }

        let timeouts = OperationTimeouts::from_bag(bag)?;
        info!(
            ca_set_id = %wanted.ca_set_id,
            network = %wanted.network,
            from_version = current.version,
            to_version = wanted.version,
            "Switching active version"
        );

        let outcome = self
            .orchestrator
            .activate(
                &wanted.ca_set_id,
                wanted.version,
                wanted.network,
                timeouts.update,
                self.ctx.cancel.clone(),
            )
            .await?;

        let mut state = to_bag(outcome.activation());
        carry_timeouts(bag, &mut state);
        Ok(state)
    }

    /// Deactivate the version, refusing while the CA set is referenced.
    ///
    /// A version that is already inactive, or a CA set or version that no
    /// longer exists, needs nothing.
    pub async fn delete(&self, bag: &AttributeBag) -> Result<()> {
        let target = Target::from_bag(bag)?;
        let timeouts = OperationTimeouts::from_bag(bag)?;
        let deadline = Deadline::new(
            format!("deactivation of version {} on {}", target.version, target.network),
            timeouts.delete,
            self.ctx.cancel.clone(),
        );

        let version = match deadline
            .guard(
                self.ctx
                    .client
                    .get_ca_set_version(&target.ca_set_id, target.version),
            )
            .await
        {
            Ok(version) => version,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };

        if version.status_on(target.network) == VersionNetworkStatus::Inactive {
            info!(
                ca_set_id = %target.ca_set_id,
                version = target.version,
                network = %target.network,
                "Version already inactive, nothing to deactivate"
            );
            return Ok(());
        }

        self.orchestrator
            .release(
                &target.ca_set_id,
                target.version,
                target.network,
                timeouts.delete,
                self.ctx.cancel.clone(),
            )
            .await
            .map(|_| ())
    }

    /// Build state from an id of the form `<caSetId>:<NETWORK>`
    pub async fn import(&self, id: &str) -> Result<AttributeBag> {
        let (ca_set_id, network) = id.split_once(':').ok_or_else(|| {
            Error::configuration("id", format!("expected '<caSetId>:<NETWORK>', got '{}'", id))
        })?;
        let network: Network = network.parse()?;
        let deadline = self
            .ctx
            .read_deadline(format!("import of activation {}", id));

        let ca_set = deadline.guard(self.ctx.client.get_ca_set(ca_set_id)).await?;
        let version = ca_set.version_on(network).ok_or_else(|| {
            Error::not_found("active version of CA set", format!("{} on {}", ca_set_id, network))
        })?;

        match self
            .drift
            .read(ca_set_id, version, network, ReadIntent::Refresh, &deadline)
            .await?
        {
            DriftOutcome::Keep(record) => Ok(to_bag(&record)),
            DriftOutcome::Remove | DriftOutcome::Superseded { .. } => Err(Error::not_found(
                "active version of CA set",
                format!("{} on {}", ca_set_id, network),
            )),
        }
    }
}

fn to_bag(record: &Activation) -> AttributeBag {
    let mut bag = AttributeBag::new();
    bag.insert("id".to_string(), record.activation_id.into());
    bag.insert("ca_set_id".to_string(), record.ca_set_id.clone().into());
    bag.insert("version".to_string(), record.version.into());
    bag.insert("network".to_string(), record.network.as_str().into());
    bag.insert(
        "created_by".to_string(),
        optional_string(record.created_by.as_deref()),
    );
    bag.insert("created_date".to_string(), optional_time(record.created_date));
    bag.insert(
        "modified_by".to_string(),
        optional_string(record.modified_by.as_deref()),
    );
    bag.insert(
        "modified_date".to_string(),
        optional_time(record.modified_date),
    );
    bag
}
