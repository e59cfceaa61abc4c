//! `cling reset <revision> [--force --chown --chmod --chtime --fast-scan]`.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use cling_core::MergeOptions;

use crate::error::CliError;
use crate::{revspec, session};

#[derive(Args, Debug)]
pub struct ResetArgs {
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,

    /// `HEAD` or a 64-character hex revision id.
    pub revision: String,

    /// Discard local changes that would otherwise block the reset.
    #[arg(long)]
    pub force: bool,

    #[arg(long)]
    pub fast_scan: bool,

    #[arg(long)]
    pub chown: bool,

    #[arg(long)]
    pub chmod: bool,

    #[arg(long)]
    pub chtime: bool,

    #[arg(long)]
    pub passphrase_from_stdin: bool,
}

pub fn run(args: &ResetArgs) -> Result<()> {
    let session = session::open_session(&args.dir, args.passphrase_from_stdin)?;
    let target = revspec::resolve(&session.repository, &args.revision)?;
    let options = MergeOptions {
        fast_scan: args.fast_scan,
        restore_owner: args.chown,
        restore_mode: args.chmod,
        restore_mtime: args.chtime,
        ..MergeOptions::default()
    };

    cling_core::reset(&session.repository, &session.workspace, target, args.force, &options).map_err(CliError::from)?;
    println!("Reset workspace to {target}");
    Ok(())
}
