//! Update-version command.
//!
//! Reads a version edit from a JSON file:
//!
//! ```json
//! {
//!   "description": "rotate partner intermediate",
//!   "allowInsecureSha1": false,
//!   "certificates": [{"certificatePem": "-----BEGIN CERTIFICATE-----...", "description": "root"}]
//! }
//! ```

use std::path::PathBuf;

use clap::Args;
use tracing::info;

use truststore_caset::MutationGuard;
use truststore_common::types::VersionUpdate;
use truststore_common::Deadline;

use super::{print_json, Session};
use crate::{Error, Result};

/// CA set and edit file
#[derive(Args, Debug)]
pub struct UpdateVersionArgs {
    /// CA set identifier
    pub ca_set_id: String,

    /// Path to the JSON version edit
    #[arg(short = 'f', long = "file")]
    pub file: PathBuf,
}

/// Parse and sanity-check an edit document
pub fn parse_edit(raw: &str) -> Result<VersionUpdate> {
    let edit: VersionUpdate = serde_json::from_str(raw)?;
    if edit.certificates.is_empty() {
        return Err(Error::validation("edit must list at least one certificate"));
    }
    Ok(edit)
}

pub async fn run(session: &Session, args: UpdateVersionArgs) -> Result<()> {
    let raw = std::fs::read_to_string(&args.file)?;
    let edit = parse_edit(&raw)?;

    let deadline = Deadline::new(
        format!("update of CA set {}", args.ca_set_id),
        session.timeout,
        session.cancel.clone(),
    );

    let ca_set = deadline
        .guard(session.client.get_ca_set(&args.ca_set_id))
        .await?;
    let current = ca_set.latest_version.ok_or_else(|| {
        Error::command_failed(format!("CA set {} has no versions", args.ca_set_id))
    })?;

    let edited = deadline
        .guard(MutationGuard::new(session.client.clone()).apply(&args.ca_set_id, current, &edit))
        .await?;

    match edited.cloned_from {
        Some(source) => info!(
            source_version = source,
            new_version = edited.version.version,
            "Version was live before, edit applied to a clone"
        ),
        None => info!(version = edited.version.version, "Version updated in place"),
    }
    print_json(&edited.version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_camel_case_edit() {
        let edit = parse_edit(
            r#"{"description": "rotate", "allowInsecureSha1": true,
                "certificates": [{"certificatePem": "PEM", "description": "root"}]}"#,
        )
        .unwrap();
        assert_eq!(edit.description.as_deref(), Some("rotate"));
        assert!(edit.allow_insecure_sha1);
        assert_eq!(edit.certificates[0].certificate_pem, "PEM");
    }

    #[test]
    fn empty_certificate_list_is_rejected() {
        let err = parse_edit(r#"{"certificates": []}"#).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn malformed_json_is_a_json_error() {
        assert!(matches!(parse_edit("{"), Err(Error::Json(_))));
    }
}
