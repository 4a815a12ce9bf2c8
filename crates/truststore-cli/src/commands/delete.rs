//! Delete command

use clap::Args;

use truststore_caset::DeletionCoordinator;

use super::Session;
use crate::Result;

/// CA set to delete
#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// CA set identifier
    pub ca_set_id: String,
}

pub async fn run(session: &Session, args: DeleteArgs) -> Result<()> {
    DeletionCoordinator::new(session.client.clone())
        .delete(&args.ca_set_id, session.timeout, session.cancel.clone())
        .await?;

    println!("CA set {} deleted", args.ca_set_id);
    Ok(())
}
