//! CLI-facing error type.
//!
//! `cling_core::RepositoryError` is the programmatic error surface the
//! libraries match on; this type is the human-facing one the binary
//! prints. Each variant carries enough context to produce an actionable
//! "To fix:" line, the way the teacher's workspace error type does.

use std::fmt;
use std::path::PathBuf;

use cling_core::{MergeConflict, RepositoryError};
use cling_crypto::CryptoError;

#[derive(Debug)]
pub enum CliError {
    /// The workspace directory has no `.cling/` control directory.
    NotAWorkspace { path: PathBuf },

    /// The passphrase did not unwrap the repository's keys.
    InvalidPassphrase,

    /// `init`/`attach` refused a weak passphrase.
    WeakPassphrase,

    /// The workspace is already at the remote's current head and has no
    /// local changes.
    UpToDate,

    /// `commit`/`merge` found nothing to commit.
    EmptyCommit,

    /// Local and remote disagree on one or more paths.
    MergeConflicts { conflicts: Vec<MergeConflict> },

    /// A file changed on disk between being scanned and being used.
    ConcurrentModification { path: String },

    /// The repository's `refs/head` moved during a merge phase.
    RemoteChanged,

    /// A workspace's `.cling/workspace.toml` `pathPrefix` isn't a valid
    /// repository path.
    InvalidPathPrefix { reason: String },

    /// Repository or revision-chain corruption.
    Corrupt { reason: String },

    /// Any other library error, printed via its own `Display`.
    Other(RepositoryError),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAWorkspace { path } => {
                write!(
                    f,
                    "'{}' is not a cling workspace (no .cling/ directory).\n  To fix: run `cling attach <uri> {}` first.",
                    path.display(),
                    path.display()
                )
            }
            Self::InvalidPassphrase => {
                write!(f, "wrong passphrase.\n  To fix: retry with the passphrase used at `cling init`.")
            }
            Self::WeakPassphrase => {
                write!(f, "passphrase is too weak.\n  To fix: use a longer passphrase, or pass --allow-weak-passphrase.")
            }
            Self::UpToDate => {
                write!(f, "already up to date: no local changes and the remote head is unchanged.")
            }
            Self::EmptyCommit => {
                write!(f, "nothing to commit: the workspace matches its last-known revision.")
            }
            Self::MergeConflicts { conflicts } => {
                writeln!(f, "merge conflict in {} file(s):", conflicts.len())?;
                for c in conflicts {
                    writeln!(
                        f,
                        "  - {}: local {:?} vs repository {:?}",
                        c.path, c.local.entry_type, c.remote.entry_type
                    )?;
                }
                write!(f, "  To fix: resolve the conflicting files, then retry `cling commit`.")
            }
            Self::ConcurrentModification { path } => {
                write!(f, "'{path}' changed on disk during the operation.\n  To fix: retry the command.")
            }
            Self::RemoteChanged => {
                write!(f, "the remote repository changed while merging.\n  To fix: retry `cling commit`.")
            }
            Self::InvalidPathPrefix { reason } => {
                write!(f, "invalid workspace path prefix: {reason}")
            }
            Self::Corrupt { reason } => {
                write!(f, "repository corruption detected: {reason}\n  To fix: restore from a known-good copy, or run `cling check` for details.")
            }
            Self::Other(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Other(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepositoryError> for CliError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Crypto(CryptoError::InvalidPassphrase) => Self::InvalidPassphrase,
            RepositoryError::Crypto(CryptoError::WeakPassphrase(_)) => Self::WeakPassphrase,
            RepositoryError::UpToDate => Self::UpToDate,
            RepositoryError::EmptyCommit => Self::EmptyCommit,
            RepositoryError::MergeConflicts { conflicts, .. } => Self::MergeConflicts { conflicts },
            RepositoryError::ConcurrentModification { path } => Self::ConcurrentModification { path },
            RepositoryError::RemoteChanged => Self::RemoteChanged,
            RepositoryError::InvalidPathPrefix { reason } => Self::InvalidPathPrefix { reason },
            RepositoryError::CorruptChain { reason } => Self::Corrupt { reason },
            other => Self::Other(other),
        }
    }
}
