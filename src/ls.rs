//! `cling ls [pattern] [--revision HEAD|<hex>]`: list a revision's entries.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use cling_core::RepoPath;

use crate::error::CliError;
use crate::{revspec, session};

#[derive(Args, Debug)]
pub struct LsArgs {
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,

    pub pattern: Option<String>,

    #[arg(long, default_value = "HEAD")]
    pub revision: String,

    #[arg(long)]
    pub passphrase_from_stdin: bool,
}

pub fn run(args: &LsArgs) -> Result<()> {
    let session = session::open_session(&args.dir, args.passphrase_from_stdin)?;
    let revision = revspec::resolve(&session.repository, &args.revision)?;
    let prefix = match &args.pattern {
        Some(p) => RepoPath::parse(p.as_str()).map_err(|e| anyhow::anyhow!("invalid pattern: {e}"))?,
        None => RepoPath::root(),
    };

    let entries = cling_core::ls(&session.repository, revision, &prefix).map_err(CliError::from)?;
    for entry in entries {
        if entry.is_dir() {
            println!("{}/", entry.path);
        } else {
            println!("{}\t{}", entry.metadata.size, entry.path);
        }
    }
    Ok(())
}
