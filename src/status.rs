//! `cling status [pattern]`: local changes not yet committed.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use cling_core::ChangeKind;

use crate::error::CliError;
use crate::session;

#[derive(Args, Debug)]
pub struct StatusArgs {
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,

    /// Only show entries under this repository-relative path.
    pub pattern: Option<String>,

    #[arg(long)]
    pub short: bool,

    #[arg(long)]
    pub no_summary: bool,

    #[arg(long)]
    pub fast_scan: bool,

    #[arg(long)]
    pub passphrase_from_stdin: bool,
}

pub fn run(args: &StatusArgs) -> Result<()> {
    let session = session::open_session(&args.dir, args.passphrase_from_stdin)?;
    let entries = cling_core::status(&session.repository, &session.workspace, args.fast_scan).map_err(CliError::from)?;

    let filtered: Vec<_> = match &args.pattern {
        None => entries,
        Some(pattern) => {
            let prefix = cling_core::RepoPath::parse(pattern.as_str()).map_err(|e| anyhow::anyhow!("invalid pattern: {e}"))?;
            entries.into_iter().filter(|e| e.path.strip_prefix(&prefix).is_some() || e.path == prefix).collect()
        }
    };

    for entry in &filtered {
        let sigil = match entry.kind {
            ChangeKind::Add => 'A',
            ChangeKind::Update => 'M',
            ChangeKind::Delete => 'D',
        };
        if args.short {
            println!("{sigil} {}", entry.path);
        } else {
            println!("{sigil}  {}{}", entry.path, if entry.is_dir { "/" } else { "" });
        }
    }

    if !args.no_summary {
        println!("{} changed path(s)", filtered.len());
    }
    Ok(())
}
