//! `cling init <dst>`: create a new, empty repository at `dst`.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::passphrase::{PassphraseSource, StdioPassphraseSource};
use crate::session;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Directory the repository's encrypted block store will live in.
    pub dst: PathBuf,

    /// Read the passphrase from standard input instead of prompting.
    #[arg(long)]
    pub passphrase_from_stdin: bool,

    /// Accept a passphrase that doesn't meet the strength rule.
    #[arg(long)]
    pub allow_weak_passphrase: bool,
}

pub fn run(args: &InitArgs) -> Result<()> {
    let passphrase = StdioPassphraseSource.read(args.passphrase_from_stdin)?;
    let storage = session::storage_at(&format!("file://{}", args.dst.display()));
    cling_core::Repository::init(storage, &passphrase, args.allow_weak_passphrase).map_err(crate::error::CliError::from)?;
    println!("Initialized empty cling repository in {}", args.dst.display());
    Ok(())
}
