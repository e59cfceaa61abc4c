//! Resolve a CLI invocation's workspace + repository pair.
//!
//! Mirrors the teacher's `workspace::get_backend`/`repo_root` helpers:
//! every command that touches a workspace goes through [`open_session`]
//! instead of re-deriving the storage path and passphrase handling itself.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use cling_core::Workspace;
use cling_storage::{LocalStorage, Storage};

use crate::error::CliError;
use crate::passphrase::{PassphraseSource, StdioPassphraseSource};
use crate::security;

pub struct Session {
    pub workspace: Workspace,
    pub repository: cling_core::Repository,
}

/// A workspace's `remote` field is a storage URI. Only `file://` and bare
/// paths resolve locally; an HTTP transport is an external collaborator
/// this crate doesn't implement (see DESIGN.md).
pub fn remote_to_storage_path(remote: &str) -> PathBuf {
    PathBuf::from(remote.strip_prefix("file://").unwrap_or(remote))
}

fn open_storage(remote: &str) -> Arc<dyn Storage> {
    Arc::new(LocalStorage::new(remote_to_storage_path(remote)))
}

/// Open the workspace rooted at `dir` and its remote repository, using a
/// locally-saved key hierarchy if `security save-keys` was run, otherwise
/// prompting for a passphrase.
///
/// # Errors
/// [`CliError::NotAWorkspace`] if `dir` has no `.cling/workspace.toml`;
/// otherwise propagates repository-open failures (including a wrong
/// passphrase).
pub fn open_session(dir: &Path, passphrase_from_stdin: bool) -> Result<Session, CliError> {
    let workspace = Workspace::new(dir);
    let config = workspace.config().map_err(|_| CliError::NotAWorkspace { path: dir.to_path_buf() })?;
    let storage = open_storage(&config.remote);

    let repository = if let Some(keys) = security::load_local_keys(&workspace)? {
        cling_core::Repository::open_with_keys(storage, keys)?
    } else {
        let passphrase = StdioPassphraseSource.read(passphrase_from_stdin).map_err(|e| {
            CliError::Other(cling_storage::StorageError::Io { path: "<stdin>".to_string(), source: e }.into())
        })?;
        cling_core::Repository::open(storage, &passphrase)?
    };

    Ok(Session { workspace, repository })
}

/// Open a repository directly by storage URI, without a workspace — used
/// by `init` and `check`.
///
/// # Errors
/// Propagates repository-open/init failures.
pub fn open_repository_at(remote: &str, passphrase: &[u8]) -> Result<cling_core::Repository, CliError> {
    Ok(cling_core::Repository::open(open_storage(remote), passphrase)?)
}

#[must_use]
pub fn storage_at(remote: &str) -> Arc<dyn Storage> {
    open_storage(remote)
}
