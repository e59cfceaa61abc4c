//! `cling check [--data]`: walk the revision chain and report its health.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::error::CliError;
use crate::{revspec, session};

#[derive(Args, Debug)]
pub struct CheckArgs {
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,

    #[arg(long, default_value = "HEAD")]
    pub revision: String,

    /// Re-read and re-hash every referenced data block.
    #[arg(long)]
    pub data: bool,

    #[arg(long)]
    pub passphrase_from_stdin: bool,
}

pub fn run(args: &CheckArgs) -> Result<()> {
    let session = session::open_session(&args.dir, args.passphrase_from_stdin)?;
    let revision = revspec::resolve(&session.repository, &args.revision)?;

    let report = cling_core::check_health(&session.repository, revision, args.data).map_err(CliError::from)?;
    println!("revisions:     {}", report.revisions);
    println!("entries:       {}", report.entries);
    println!("unique blocks: {}", report.unique_blocks);
    println!("metadata bytes:{}", report.metadata_bytes);
    if args.data {
        println!("data bytes:    {}", report.data_bytes);
    }
    println!("ok");
    Ok(())
}
