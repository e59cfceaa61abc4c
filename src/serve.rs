//! `cling serve <repo>`.
//!
//! The network transport that would let a remote client reach a
//! repository over HTTP is an external collaborator this crate doesn't
//! implement (§1). `cling attach` and friends only ever talk to a
//! repository through a local [`cling_storage::LocalStorage`], so there
//! is nothing for this command to bind a listener to yet; it exists as a
//! documented stub rather than a silently-accepted no-op.

use std::path::PathBuf;

use clap::Args;

#[derive(Args, Debug)]
pub struct ServeArgs {
    pub repo: PathBuf,

    #[arg(long, default_value = "127.0.0.1:5556")]
    pub listen: String,
}

pub fn run(args: &ServeArgs) -> anyhow::Result<()> {
    anyhow::bail!(
        "cling serve is not implemented: the HTTP transport for {} on {} is an external collaborator this crate doesn't provide. \
         Use a local path in `cling attach` instead.",
        args.repo.display(),
        args.listen
    )
}
