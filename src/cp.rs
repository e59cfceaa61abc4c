//! `cling cp <pattern> <target> [--revision --overwrite --chown]`.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use cling_core::{MergeOptions, OnExists, RepoPath};

use crate::error::CliError;
use crate::{revspec, session};

#[derive(Args, Debug)]
pub struct CpArgs {
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,

    /// Repository-relative path to copy out.
    pub pattern: String,

    /// Destination directory on disk.
    pub target: PathBuf,

    #[arg(long, default_value = "HEAD")]
    pub revision: String,

    #[arg(long)]
    pub overwrite: bool,

    #[arg(long)]
    pub ignore_existing: bool,

    #[arg(long)]
    pub chown: bool,

    #[arg(long)]
    pub chmod: bool,

    #[arg(long)]
    pub chtime: bool,

    #[arg(long)]
    pub passphrase_from_stdin: bool,
}

pub fn run(args: &CpArgs) -> Result<()> {
    let session = session::open_session(&args.dir, args.passphrase_from_stdin)?;
    let revision = revspec::resolve(&session.repository, &args.revision)?;
    let prefix = RepoPath::parse(args.pattern.as_str()).map_err(|e| anyhow::anyhow!("invalid pattern: {e}"))?;
    let on_exists = if args.overwrite {
        OnExists::Overwrite
    } else if args.ignore_existing {
        OnExists::Ignore
    } else {
        OnExists::Abort
    };
    let options = MergeOptions { restore_owner: args.chown, restore_mode: args.chmod, restore_mtime: args.chtime, ..MergeOptions::default() };

    std::fs::create_dir_all(&args.target)?;
    cling_core::cp(&session.repository, revision, &prefix, &args.target, on_exists, &options).map_err(CliError::from)?;
    Ok(())
}
