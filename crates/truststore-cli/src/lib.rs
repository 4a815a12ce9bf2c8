//! Truststore CLI library

pub mod commands;
pub mod error;

pub use error::{Error, Result};

use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;

/// Truststore - CA set activation and lifecycle management
#[derive(Parser, Debug)]
#[command(name = "truststore")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Flags shared by every subcommand
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Trust-store API base URL
    #[arg(long, global = true, env = "TRUSTSTORE_BASE_URL")]
    pub base_url: Option<String>,

    /// Bearer token for the trust-store API
    #[arg(long, global = true, env = "TRUSTSTORE_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Emit JSON log lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Overall budget for waiting on remote operations (e.g. "90m", "1h", "600")
    #[arg(long, global = true, default_value = "1h", value_parser = commands::parse_timeout)]
    pub timeout: Duration,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Activate a CA set version on a network and wait for completion
    Activate(commands::activate::ActivationArgs),
    /// Deactivate a CA set version on a network and wait for completion
    Deactivate(commands::activate::ActivationArgs),
    /// Check whether a version is live on a network according to remote history
    Status(commands::status::StatusArgs),
    /// Delete a CA set and wait for removal on every network
    Delete(commands::delete::DeleteArgs),
    /// Edit the latest version of a CA set, cloning it if it was ever live
    UpdateVersion(commands::update_version::UpdateVersionArgs),
    /// List properties and enrollments referencing a CA set
    Associations(commands::associations::AssociationsArgs),
}

impl Cli {
    /// Run the CLI command; `cancel` abandons any in-flight wait
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let session = commands::Session::connect(&self.global, cancel)?;

        match self.command {
            Commands::Activate(args) => commands::activate::run_activate(&session, args).await,
            Commands::Deactivate(args) => commands::activate::run_deactivate(&session, args).await,
            Commands::Status(args) => commands::status::run(&session, args).await,
            Commands::Delete(args) => commands::delete::run(&session, args).await,
            Commands::UpdateVersion(args) => commands::update_version::run(&session, args).await,
            Commands::Associations(args) => commands::associations::run(&session, args).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use truststore_common::types::Network;

    #[test]
    fn parses_activate_with_global_flags() {
        let cli = Cli::try_parse_from([
            "truststore",
            "--base-url",
            "https://api.example.com",
            "activate",
            "12345",
            "--version",
            "2",
            "--network",
            "production",
            "--timeout",
            "90m",
        ])
        .unwrap();

        assert_eq!(cli.global.base_url.as_deref(), Some("https://api.example.com"));
        assert_eq!(cli.global.timeout, Duration::from_secs(5400));
        match cli.command {
            Commands::Activate(args) => {
                assert_eq!(args.ca_set_id, "12345");
                assert_eq!(args.version, 2);
                assert_eq!(args.network, Network::Production);
            }
            other => panic!("expected Activate, got {:?}", other),
        }
    }

    #[test]
    fn timeout_defaults_to_one_hour() {
        let cli = Cli::try_parse_from(["truststore", "associations", "12345"]).unwrap();
        assert_eq!(cli.global.timeout, Duration::from_secs(3600));
        assert!(!cli.global.json_logs);
    }

    #[test]
    fn unknown_network_is_rejected() {
        let result = Cli::try_parse_from([
            "truststore",
            "deactivate",
            "12345",
            "--version",
            "1",
            "--network",
            "qa",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn update_version_takes_a_file() {
        let cli = Cli::try_parse_from([
            "truststore",
            "update-version",
            "12345",
            "--file",
            "edit.json",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::UpdateVersion(_)));
    }
}
