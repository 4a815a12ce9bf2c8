//! Truststore CLI
//!
//! Drives CA set activation, deletion and drift checks against the
//! trust-store API.

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use truststore_cli::{Cli, Result};
use truststore_common::telemetry::{init_tracing, TelemetryConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(TelemetryConfig {
        json: cli.global.json_logs,
        ..Default::default()
    })?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, abandoning wait; remote operations keep running");
            on_interrupt.cancel();
        }
    });

    cli.run(cancel).await
}
