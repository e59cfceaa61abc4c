//! `cling attach <uri> <dir> [--path-prefix]`: turn `dir` into a workspace
//! pointed at an existing repository.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Args;

use crate::error::CliError;
use crate::passphrase::{PassphraseSource, StdioPassphraseSource};
use crate::session;

#[derive(Args, Debug)]
pub struct AttachArgs {
    /// Repository location, e.g. `file:///srv/cling/team-a` or a bare path.
    pub uri: String,

    /// Workspace directory to create or reuse.
    pub dir: PathBuf,

    /// Only sync the subtree of the repository under this path.
    #[arg(long = "path-prefix")]
    pub path_prefix: Option<String>,

    #[arg(long)]
    pub passphrase_from_stdin: bool,
}

pub fn run(args: &AttachArgs) -> Result<()> {
    let workspace = cling_core::Workspace::new(&args.dir);
    if workspace.config().is_ok() {
        bail!("{} is already attached to a repository", args.dir.display());
    }

    let passphrase = StdioPassphraseSource.read(args.passphrase_from_stdin)?;
    session::open_repository_at(&args.uri, &passphrase).map_err(|e| match e {
        CliError::Other(err) if matches!(err, cling_core::RepositoryError::Storage(_)) => {
            anyhow::anyhow!("no repository found at {}: {err}", args.uri)
        }
        other => anyhow::Error::from(other),
    })?;

    workspace.init(&args.uri, args.path_prefix.as_deref()).map_err(CliError::from)?;
    println!("Attached {} to {}", args.dir.display(), args.uri);
    Ok(())
}
