use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

mod attach;
mod check;
mod commit;
mod cp;
mod error;
mod init;
mod log;
mod ls;
mod passphrase;
mod progress;
mod reset;
mod revspec;
mod security;
mod security_cmd;
mod serve;
mod session;
mod status;
mod telemetry;

/// Encrypted, content-addressed, revision-based backup and sync engine.
///
/// A workspace tracks one directory against a repository: a single
/// append-only history of revisions, each a full snapshot of every
/// tracked path built from deduplicated, encrypted blocks. There is no
/// staging area — `cling commit` scans the workspace, three-way-merges
/// it against the repository's current head and its own last-seen
/// snapshot, and writes a new revision.
///
/// QUICK START:
///
///   cling init /path/to/repo
///   cling attach /path/to/repo ./my-workspace
///   cd my-workspace && cling commit -m "first snapshot"
///   cling log
#[derive(Parser)]
#[command(name = "cling")]
#[command(version, about)]
#[command(propagate_version = true)]
#[command(after_help = "See 'cling <command> --help' for more information on a specific command.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new, empty repository at a path.
    Init(init::InitArgs),

    /// Attach a directory to a repository as a workspace.
    Attach(attach::AttachArgs),

    /// Scan the workspace and commit local changes as a new revision.
    ///
    /// Merges against the repository's current head; if the head moved
    /// and a path changed on both sides, the commit is rejected with the
    /// conflicting paths listed. Use `--accept-local` to skip the merge
    /// and force the workspace's state as the new revision.
    #[command(alias = "merge")]
    Commit(commit::CommitArgs),

    /// Show local changes not yet committed.
    Status(status::StatusArgs),

    /// List a revision's entries under a path.
    Ls(ls::LsArgs),

    /// Show revision history.
    Log(log::LogArgs),

    /// Copy files out of a revision onto local disk.
    Cp(cp::CpArgs),

    /// Reset the workspace to a past revision.
    Reset(reset::ResetArgs),

    /// Walk the revision chain and verify it end to end.
    Check(check::CheckArgs),

    /// Manage the local key cache used to skip passphrase prompts.
    Security(security_cmd::SecurityArgs),

    /// Serve a repository over the network. Not implemented.
    Serve(serve::ServeArgs),

    /// Print a shell completion script to stdout.
    Completions { shell: Shell },
}

fn main() -> Result<()> {
    telemetry::init();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Init(args) => init::run(args),
        Commands::Attach(args) => attach::run(args),
        Commands::Commit(args) => commit::run(args),
        Commands::Status(args) => status::run(args),
        Commands::Ls(args) => ls::run(args),
        Commands::Log(args) => log::run(args),
        Commands::Cp(args) => cp::run(args),
        Commands::Reset(args) => reset::run(args),
        Commands::Check(args) => check::run(args),
        Commands::Security(args) => security_cmd::run(args),
        Commands::Serve(args) => serve::run(args),
        Commands::Completions { shell } => {
            clap_complete::generate(*shell, &mut Cli::command(), "cling", &mut std::io::stdout());
            Ok(())
        }
    }
}
