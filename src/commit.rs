//! `cling commit`/`cling merge`: run the three-way merge pipeline in the
//! current (or given) workspace.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use cling_core::MergeOptions;

use crate::error::CliError;
use crate::session;

#[derive(Args, Debug)]
pub struct CommitArgs {
    /// Workspace directory (defaults to the current directory).
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,

    #[arg(long, default_value_t = default_author())]
    pub author: String,

    #[arg(long, default_value = "")]
    pub message: String,

    /// Reuse the staging cache's recorded hashes for files whose size and
    /// mtime haven't changed, instead of re-hashing everything.
    #[arg(long)]
    pub fast_scan: bool,

    /// Commit local changes even if they conflict with the remote, then
    /// reconcile the workspace against the result.
    #[arg(long)]
    pub accept_local: bool,

    #[arg(long)]
    pub chown: bool,

    #[arg(long)]
    pub chmod: bool,

    #[arg(long)]
    pub chtime: bool,

    #[arg(long)]
    pub passphrase_from_stdin: bool,
}

fn default_author() -> String {
    std::env::var("USER").or_else(|_| std::env::var("USERNAME")).unwrap_or_else(|_| "unknown".to_string())
}

pub fn run(args: &CommitArgs) -> Result<()> {
    let session = session::open_session(&args.dir, args.passphrase_from_stdin)?;
    let options = MergeOptions {
        author: args.author.clone(),
        message: args.message.clone(),
        fast_scan: args.fast_scan,
        restore_owner: args.chown,
        restore_mode: args.chmod,
        restore_mtime: args.chtime,
    };

    let result = if args.accept_local {
        cling_core::force_commit(&session.repository, &session.workspace, &options)
    } else {
        cling_core::merge(&session.repository, &session.workspace, &options)
    };

    match result {
        Ok(Some(id)) => println!("Committed {id}"),
        Ok(None) => println!("Pulled remote changes; no local changes to commit"),
        Err(e) => return Err(CliError::from(e).into()),
    }
    Ok(())
}
