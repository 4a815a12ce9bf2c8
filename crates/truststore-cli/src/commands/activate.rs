//! Activate and deactivate commands.
//!
//! Both wait for the remote operation to reach a terminal state. An
//! interrupted or timed-out wait leaves the remote operation running.

use clap::Args;
use tracing::info;

use truststore_caset::{ActivationOrchestrator, ActivationOutcome};
use truststore_common::types::Network;

use super::{parse_network, print_json, Session};
use crate::Result;

/// Target of an activation or deactivation
#[derive(Args, Debug)]
pub struct ActivationArgs {
    /// CA set identifier
    pub ca_set_id: String,

    /// Version to activate or deactivate
    #[arg(long)]
    pub version: i64,

    /// Network (staging or production)
    #[arg(long, value_parser = parse_network)]
    pub network: Network,
}

pub async fn run_activate(session: &Session, args: ActivationArgs) -> Result<()> {
    let outcome = ActivationOrchestrator::new(session.client.clone())
        .activate(
            &args.ca_set_id,
            args.version,
            args.network,
            session.timeout,
            session.cancel.clone(),
        )
        .await?;
    report(outcome)
}

/// Deactivation goes through the association check: a referenced CA set
/// cannot be taken off a network.
pub async fn run_deactivate(session: &Session, args: ActivationArgs) -> Result<()> {
    let outcome = ActivationOrchestrator::new(session.client.clone())
        .release(
            &args.ca_set_id,
            args.version,
            args.network,
            session.timeout,
            session.cancel.clone(),
        )
        .await?;
    report(outcome)
}

fn report(outcome: ActivationOutcome) -> Result<()> {
    if let ActivationOutcome::AlreadySatisfied(existing) = &outcome {
        info!(
            activation_id = existing.activation_id,
            "Nothing submitted, version already in the requested state"
        );
    }
    print_json(outcome.activation())
}
