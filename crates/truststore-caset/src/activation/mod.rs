//! Activation orchestration
//!
//! Drives a CA set version onto (or off) a network and waits for the remote
//! operation to finish:
//!
//! 1. **Short-circuit**: if the version already has the desired status and a
//!    COMPLETE record of the desired type exists, return that record without
//!    a mutating call.
//! 2. **Conflict check**: adopt an identical in-flight operation, fail on any
//!    other in-flight operation on the same network.
//! 3. **Submit** the activate/deactivate call.
//! 4. **Poll** the activation until it is COMPLETE, FAILED, or the deadline
//!    passes.
//!
//! A timeout or cancellation leaves the remote operation running; a later
//! read may observe it completing.

mod conflict;

pub use conflict::classify_in_flight;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use truststore_common::polling::{next_interval, poll_until_done};
use truststore_common::types::{
    most_recent_complete, Activation, ActivationStatus, ActivationType, Network,
    VersionNetworkStatus,
};
use truststore_common::{Deadline, Error, PollConfig, PollStep, Result};

use crate::association::AssociationGuard;
use crate::client::TrustStoreClient;

/// Desired activation state for one version on one network
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActivationRequest {
    /// CA set being activated
    pub ca_set_id: String,
    /// Version to activate or deactivate
    pub version: i64,
    /// Target network
    pub network: Network,
    /// Activate or deactivate
    pub activation_type: ActivationType,
}

impl ActivationRequest {
    /// Build a request
    pub fn new(
        ca_set_id: impl Into<String>,
        version: i64,
        network: Network,
        activation_type: ActivationType,
    ) -> Self {
        Self {
            ca_set_id: ca_set_id.into(),
            version,
            network,
            activation_type,
        }
    }

    fn desired_status(&self) -> VersionNetworkStatus {
        match self.activation_type {
            ActivationType::Activate => VersionNetworkStatus::Active,
            ActivationType::Deactivate => VersionNetworkStatus::Inactive,
        }
    }

    fn describe(&self) -> String {
        format!(
            "{} of CA set {} version {} on {}",
            self.activation_type.action_name(),
            self.ca_set_id,
            self.version,
            self.network
        )
    }
}

/// How a request reached its terminal success state
#[derive(Clone, Debug, PartialEq)]
pub enum ActivationOutcome {
    /// The version already had the desired status; nothing was submitted
    AlreadySatisfied(Activation),
    /// An operation (submitted or adopted) ran to COMPLETE
    Completed(Activation),
}

impl ActivationOutcome {
    /// The COMPLETE record describing the final state
    pub fn activation(&self) -> &Activation {
        match self {
            ActivationOutcome::AlreadySatisfied(a) | ActivationOutcome::Completed(a) => a,
        }
    }

    /// Consume the outcome, keeping the record
    pub fn into_activation(self) -> Activation {
        match self {
            ActivationOutcome::AlreadySatisfied(a) | ActivationOutcome::Completed(a) => a,
        }
    }
}

/// Drives activate/deactivate requests to completion
#[derive(Clone)]
pub struct ActivationOrchestrator {
    client: Arc<dyn TrustStoreClient>,
    associations: AssociationGuard,
    poll: PollConfig,
}

impl ActivationOrchestrator {
    /// Create an orchestrator with the default activation poll intervals
    pub fn new(client: Arc<dyn TrustStoreClient>) -> Self {
        Self {
            associations: AssociationGuard::new(client.clone()),
            client,
            poll: PollConfig::activation(),
        }
    }

    /// Override the poll intervals
    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Activate `version` on `network`
    pub async fn activate(
        &self,
        ca_set_id: &str,
        version: i64,
        network: Network,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<ActivationOutcome> {
        let request = ActivationRequest::new(ca_set_id, version, network, ActivationType::Activate);
        self.run(&request, timeout, cancel).await
    }

    /// Deactivate `version` on `network`
    pub async fn deactivate(
        &self,
        ca_set_id: &str,
        version: i64,
        network: Network,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<ActivationOutcome> {
        let request =
            ActivationRequest::new(ca_set_id, version, network, ActivationType::Deactivate);
        self.run(&request, timeout, cancel).await
    }

    /// Deactivate a version while tearing down its activation record.
    ///
    /// Refuses with [`Error::InUse`] while properties or enrollments still
    /// reference the CA set.
    pub async fn release(
        &self,
        ca_set_id: &str,
        version: i64,
        network: Network,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<ActivationOutcome> {
        let request =
            ActivationRequest::new(ca_set_id, version, network, ActivationType::Deactivate);
        let deadline = Deadline::new(request.describe(), timeout, cancel);

        deadline
            .guard(self.associations.check_not_in_use(ca_set_id))
            .await?;
        self.run_within(&request, &deadline).await
    }

    /// Drive `request` to completion within `timeout`.
    pub async fn run(
        &self,
        request: &ActivationRequest,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<ActivationOutcome> {
        let deadline = Deadline::new(request.describe(), timeout, cancel);
        self.run_within(request, &deadline).await
    }

    async fn run_within(
        &self,
        request: &ActivationRequest,
        deadline: &Deadline,
    ) -> Result<ActivationOutcome> {
        if let Some(existing) = self.already_satisfied(request, deadline).await? {
            info!(
                ca_set_id = %request.ca_set_id,
                version = request.version,
                network = %request.network,
                activation_id = existing.activation_id,
                "Version already in desired state, nothing to submit"
            );
            return Ok(ActivationOutcome::AlreadySatisfied(existing));
        }

        let history = deadline
            .guard(self.client.list_ca_set_activations(&request.ca_set_id))
            .await?;

        let in_flight = match classify_in_flight(&history, request)? {
            Some(running) => {
                info!(
                    ca_set_id = %request.ca_set_id,
                    version = request.version,
                    network = %request.network,
                    activation_id = running.activation_id,
                    "Adopting in-flight {}",
                    request.activation_type.action_name()
                );
                running
            }
            None => self.submit(request, deadline).await?,
        };

        let completed = self.wait_for_completion(request, in_flight, deadline).await?;
        Ok(ActivationOutcome::Completed(completed))
    }

    /// Look for a COMPLETE record proving the version is already in the
    /// desired state.
    ///
    /// A version whose status matches but which has no such record falls
    /// through to a regular submission.
    async fn already_satisfied(
        &self,
        request: &ActivationRequest,
        deadline: &Deadline,
    ) -> Result<Option<Activation>> {
        let version = deadline
            .guard(
                self.client
                    .get_ca_set_version(&request.ca_set_id, request.version),
            )
            .await?;

        if version.status_on(request.network) != request.desired_status() {
            return Ok(None);
        }

        let history = deadline
            .guard(
                self.client
                    .list_ca_set_version_activations(&request.ca_set_id, request.version),
            )
            .await?;

        let existing = most_recent_complete(
            &history,
            request.version,
            request.network,
            request.activation_type,
        )
        .cloned();

        if existing.is_none() {
            warn!(
                ca_set_id = %request.ca_set_id,
                version = request.version,
                network = %request.network,
                "Version status matches but no completed {} record exists, submitting",
                request.activation_type.action_name()
            );
        }

        Ok(existing)
    }

    async fn submit(&self, request: &ActivationRequest, deadline: &Deadline) -> Result<Activation> {
        let submitted = match request.activation_type {
            ActivationType::Activate => {
                deadline
                    .guard(self.client.activate_ca_set_version(
                        &request.ca_set_id,
                        request.version,
                        request.network,
                    ))
                    .await?
            }
            ActivationType::Deactivate => {
                deadline
                    .guard(self.client.deactivate_ca_set_version(
                        &request.ca_set_id,
                        request.version,
                        request.network,
                    ))
                    .await?
            }
        };

        info!(
            ca_set_id = %request.ca_set_id,
            version = request.version,
            network = %request.network,
            activation_id = submitted.activation_id,
            "Submitted {}",
            request.activation_type.action_name()
        );
        Ok(submitted)
    }

    async fn wait_for_completion(
        &self,
        request: &ActivationRequest,
        in_flight: Activation,
        deadline: &Deadline,
    ) -> Result<Activation> {
        let activation_id = in_flight.activation_id;
        let initial_retry_after = in_flight.retry_after;

        if let Some(done) = check_terminal(request, in_flight)? {
            return Ok(done);
        }

        let poll = PollConfig {
            initial_delay: Some(next_interval(
                initial_retry_after,
                Utc::now(),
                self.poll.default_interval,
            )),
            ..self.poll.clone()
        };
        let deadline = deadline.for_operation(format!(
            "{} {} of CA set {}",
            request.activation_type.action_name(),
            activation_id,
            request.ca_set_id
        ));

        let client = &self.client;
        let completed = poll_until_done(&deadline, &poll, move || async move {
            let current = client
                .get_ca_set_version_activation(&request.ca_set_id, request.version, activation_id)
                .await?;
            let retry_after = current.retry_after;
            Ok(match check_terminal(request, current)? {
                Some(done) => PollStep::Done(done),
                None => PollStep::Pending { retry_after },
            })
        })
        .await;

        match completed {
            Ok(done) => {
                info!(
                    ca_set_id = %request.ca_set_id,
                    version = request.version,
                    network = %request.network,
                    activation_id,
                    "{} complete",
                    request.activation_type.action_name()
                );
                Ok(done)
            }
            Err(e) => {
                warn!(
                    ca_set_id = %request.ca_set_id,
                    version = request.version,
                    network = %request.network,
                    activation_id,
                    error = %e,
                    "{} did not complete",
                    request.activation_type.action_name()
                );
                Err(e)
            }
        }
    }
}

/// Classify one activation read.
///
/// `Ok(Some)` is terminal success, `Ok(None)` means still running.
fn check_terminal(
    request: &ActivationRequest,
    current: Activation,
) -> Result<Option<Activation>> {
    match current.activation_status {
        ActivationStatus::Complete if current.activation_type == request.activation_type => {
            Ok(Some(current))
        }
        ActivationStatus::Complete => Err(Error::protocol(
            &request.ca_set_id,
            format!(
                "activation {} completed as {} while waiting for {}",
                current.activation_id, current.activation_type, request.activation_type
            ),
        )),
        ActivationStatus::Failed => Err(Error::remote_failure(
            request.activation_type.action_name(),
            &request.ca_set_id,
            format!(
                "{} {} of version {} on {} failed",
                request.activation_type.action_name(),
                current.activation_id,
                current.version,
                current.network
            ),
        )),
        ActivationStatus::InProgress => Ok(None),
    }
}
