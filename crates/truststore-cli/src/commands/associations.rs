//! Associations command

use clap::Args;

use truststore_caset::describe_associations;

use super::{print_json, Session};
use crate::Result;

/// CA set to inspect
#[derive(Args, Debug)]
pub struct AssociationsArgs {
    /// CA set identifier
    pub ca_set_id: String,

    /// Print the raw listing as JSON
    #[arg(long, default_value = "false")]
    pub json: bool,
}

pub async fn run(session: &Session, args: AssociationsArgs) -> Result<()> {
    let associations = session
        .client
        .list_ca_set_associations(&args.ca_set_id)
        .await?;

    if args.json {
        return print_json(&associations);
    }

    match describe_associations(&associations) {
        Some(listing) => println!("CA set {} is {}", args.ca_set_id, listing),
        None => println!("CA set {} is not in use", args.ca_set_id),
    }
    Ok(())
}
