//! Status command: is a version live on a network according to the
//! remote activation history?

use clap::Args;

use truststore_caset::{DriftOutcome, DriftReconciler, ReadIntent};
use truststore_common::types::Network;
use truststore_common::Deadline;

use super::{parse_network, print_json, Session};
use crate::Result;

/// Version and network to check
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// CA set identifier
    pub ca_set_id: String,

    /// Version expected to be live
    #[arg(long)]
    pub version: i64,

    /// Network (staging or production)
    #[arg(long, value_parser = parse_network)]
    pub network: Network,

    /// Report another live version instead of failing on drift
    #[arg(long)]
    pub pending_update: bool,
}

impl StatusArgs {
    fn intent(&self) -> ReadIntent {
        if self.pending_update {
            ReadIntent::PendingUpdate
        } else {
            ReadIntent::Refresh
        }
    }
}

pub async fn run(session: &Session, args: StatusArgs) -> Result<()> {
    let deadline = Deadline::new(
        format!("status of CA set {}", args.ca_set_id),
        session.timeout,
        session.cancel.clone(),
    );
    let outcome = DriftReconciler::new(session.client.clone())
        .read(
            &args.ca_set_id,
            args.version,
            args.network,
            args.intent(),
            &deadline,
        )
        .await?;

    match outcome {
        DriftOutcome::Keep(record) => print_json(&record),
        DriftOutcome::Remove => {
            println!(
                "Nothing is active on {} for CA set {}",
                args.network, args.ca_set_id
            );
            Ok(())
        }
        DriftOutcome::Superseded { active_version } => {
            println!(
                "Version {} is active on {} instead of {}",
                active_version, args.network, args.version
            );
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Cli, Commands};
    use clap::Parser;

    fn status_args(extra: &[&str]) -> StatusArgs {
        let mut argv = vec![
            "truststore",
            "status",
            "12345",
            "--version",
            "2",
            "--network",
            "staging",
        ];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Commands::Status(args) => args,
            other => panic!("expected status command, got {:?}", other),
        }
    }

    #[test]
    fn plain_status_is_a_refresh() {
        assert_eq!(status_args(&[]).intent(), ReadIntent::Refresh);
    }

    #[test]
    fn pending_update_tolerates_another_live_version() {
        assert_eq!(
            status_args(&["--pending-update"]).intent(),
            ReadIntent::PendingUpdate
        );
    }
}
