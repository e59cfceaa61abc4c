//! `cling log [pattern] [--short --status]`: revision history.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use cling_core::RepoPath;

use crate::error::CliError;
use crate::session;

#[derive(Args, Debug)]
pub struct LogArgs {
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,

    /// Only show revisions that touch this repository-relative path.
    pub pattern: Option<String>,

    #[arg(long)]
    pub short: bool,

    #[arg(long)]
    pub passphrase_from_stdin: bool,
}

pub fn run(args: &LogArgs) -> Result<()> {
    let session = session::open_session(&args.dir, args.passphrase_from_stdin)?;
    let head = session.repository.head().map_err(CliError::from)?;
    let prefix = args.pattern.as_deref().map(RepoPath::parse).transpose().map_err(|e| anyhow::anyhow!("invalid pattern: {e}"))?;

    let revisions = cling_core::log(&session.repository, head, prefix.as_ref()).map_err(CliError::from)?;
    for revision in revisions {
        let id = revision.id();
        if args.short {
            let hex = id.to_hex();
            println!("{} {}", &hex[..12], revision.message);
        } else {
            println!("revision {id}");
            println!("author:  {}", revision.author);
            println!("date:    {}", revision.timestamp);
            println!("message: {}", revision.message);
            println!();
        }
    }
    Ok(())
}
