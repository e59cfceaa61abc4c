//! `cling security save-keys|delete-keys`: manage the local key stand-in.
//!
//! See [`crate::security`] for what "local key" means here and why it
//! exists instead of a real OS keychain integration.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::error::CliError;
use crate::passphrase::{PassphraseSource, StdioPassphraseSource};
use crate::{security, session};

#[derive(Args, Debug)]
pub struct SecurityArgs {
    #[command(subcommand)]
    pub command: SecurityCommand,
}

#[derive(Subcommand, Debug)]
pub enum SecurityCommand {
    /// Unwrap this workspace's keys once and cache them locally so future
    /// commands don't prompt for a passphrase.
    SaveKeys {
        #[arg(long, default_value = ".")]
        dir: PathBuf,
        #[arg(long)]
        passphrase_from_stdin: bool,
    },
    /// Forget the cached local keys; future commands prompt again.
    DeleteKeys {
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },
}

pub fn run(args: &SecurityArgs) -> Result<()> {
    match &args.command {
        SecurityCommand::SaveKeys { dir, passphrase_from_stdin } => save_keys(dir, *passphrase_from_stdin),
        SecurityCommand::DeleteKeys { dir } => delete_keys(dir),
    }
}

fn save_keys(dir: &std::path::Path, passphrase_from_stdin: bool) -> Result<()> {
    let workspace = cling_core::Workspace::new(dir);
    let config = workspace.config().map_err(|_| CliError::NotAWorkspace { path: dir.to_path_buf() })?;
    let storage = session::storage_at(&config.remote);

    let passphrase = StdioPassphraseSource.read(passphrase_from_stdin)?;
    let repository = cling_core::Repository::open(storage, &passphrase).map_err(CliError::from)?;

    security::save_local_keys(&workspace, repository.keys()).map_err(CliError::from)?;
    println!("Saved local keys for {}", dir.display());
    Ok(())
}

fn delete_keys(dir: &std::path::Path) -> Result<()> {
    let workspace = cling_core::Workspace::new(dir);
    security::delete_local_keys(&workspace).map_err(CliError::from)?;
    println!("Deleted local keys for {}", dir.display());
    Ok(())
}
