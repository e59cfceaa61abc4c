//! Workspace control directory layout (§6, component 12).
//!
//! A workspace is a plain directory with one hidden `.cling/` subtree:
//! `workspace.toml` names the remote repository and an optional
//! path-prefix window onto it; `refs/head` is the workspace's own last-seen
//! repository revision, updated strictly after the repository's own `head`
//! (§5); `cache/staging` is the [`crate::staging::StagingCache`]; and
//! `security/keys.toml` is an optional locally-encrypted copy of the
//! repository's key hierarchy, so `merge` doesn't need a passphrase on
//! every run.

use std::fs;
use std::path::{Path, PathBuf};

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{RepositoryError, Result};
use crate::path::{PathError, RepoPath};
use crate::revision::RevisionId;

const CLING_DIR: &str = ".cling";
const WORKSPACE_TOML: &str = "workspace.toml";
const REFS_HEAD: &str = "refs/head";
const CACHE_STAGING: &str = "cache/staging";
const SECURITY_KEYS: &str = "security/keys.toml";

#[derive(Debug, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    pub remote: String,
    pub path_prefix: Option<String>,
}

/// Handle onto one workspace's `.cling/` control directory.
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn cling_dir(&self) -> PathBuf {
        self.root.join(CLING_DIR)
    }

    #[must_use]
    pub fn staging_cache_path(&self) -> PathBuf {
        self.cling_dir().join(CACHE_STAGING)
    }

    #[must_use]
    pub fn keys_path(&self) -> PathBuf {
        self.cling_dir().join(SECURITY_KEYS)
    }

    fn workspace_toml_path(&self) -> PathBuf {
        self.cling_dir().join(WORKSPACE_TOML)
    }

    fn head_path(&self) -> PathBuf {
        self.cling_dir().join(REFS_HEAD)
    }

    /// Write the initial `.cling/` layout for a freshly attached workspace.
    ///
    /// # Errors
    /// Propagates I/O failures.
    pub fn init(&self, remote: &str, path_prefix: Option<&str>) -> Result<()> {
        fs::create_dir_all(self.cling_dir()).map_err(|e| io_err(self.cling_dir(), e))?;
        let config = WorkspaceConfig { remote: remote.to_string(), path_prefix: path_prefix.map(str::to_string) };
        let toml = toml::to_string_pretty(&config).expect("WorkspaceConfig always serializes");
        atomic_write(&self.workspace_toml_path(), toml.as_bytes())?;
        self.write_head(RevisionId::zero())?;
        Ok(())
    }

    /// # Errors
    /// Propagates I/O or decode failures.
    pub fn config(&self) -> Result<WorkspaceConfig> {
        let bytes = fs::read(self.workspace_toml_path()).map_err(|e| io_err(self.workspace_toml_path(), e))?;
        toml::from_str(&String::from_utf8_lossy(&bytes)).map_err(|e| RepositoryError::CorruptChain { reason: e.to_string() })
    }

    /// The optional repository sub-tree this workspace is a window onto.
    ///
    /// # Errors
    /// [`RepositoryError::InvalidPathPrefix`] if the configured prefix
    /// isn't a valid repository path.
    pub fn path_prefix(&self) -> Result<Option<RepoPath>> {
        let config = self.config()?;
        match config.path_prefix {
            None => Ok(None),
            Some(p) => {
                RepoPath::parse(p).map(Some).map_err(|e: PathError| RepositoryError::InvalidPathPrefix { reason: e.to_string() })
            }
        }
    }

    /// # Errors
    /// Propagates I/O failures other than the file not existing, in which
    /// case the workspace head is the root revision.
    pub fn head(&self) -> Result<RevisionId> {
        let path = self.head_path();
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(RevisionId::zero()),
            Err(e) => return Err(io_err(path, e)),
        };
        let id: [u8; 32] =
            bytes.try_into().map_err(|_| RepositoryError::CorruptChain { reason: "workspace refs/head is not 32 bytes".to_string() })?;
        Ok(RevisionId::from_block_id(cling_crypto::BlockId::from_bytes(id)))
    }

    /// # Errors
    /// Propagates I/O failures.
    pub fn write_head(&self, id: RevisionId) -> Result<()> {
        atomic_write(&self.head_path(), id.as_block_id().as_bytes())
    }
}

fn io_err(path: impl AsRef<Path>, source: std::io::Error) -> RepositoryError {
    cling_storage::StorageError::Io { path: path.as_ref().display().to_string(), source }.into()
}

fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    let mut suffix = [0u8; 8];
    rand::rng().fill_bytes(&mut suffix);
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("tmp");
    let tmp_path = dir.join(format!(".{name}.tmp.{}", hex::encode(suffix)));
    fs::write(&tmp_path, bytes).map_err(|e| io_err(&tmp_path, e))?;
    fs::rename(&tmp_path, path).map_err(|e| io_err(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_then_head_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        ws.init("https://example.invalid/repo", Some("team/a")).unwrap();
        assert_eq!(ws.head().unwrap(), RevisionId::zero());
        assert_eq!(ws.path_prefix().unwrap().unwrap().as_str(), "team/a");

        let id = RevisionId::compute(b"some revision bytes");
        ws.write_head(id).unwrap();
        assert_eq!(ws.head().unwrap(), id);
    }

    #[test]
    fn missing_head_file_is_root() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        fs::create_dir_all(ws.cling_dir()).unwrap();
        assert!(ws.head().unwrap().is_root());
    }

    #[test]
    fn config_without_path_prefix_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        ws.init("https://example.invalid/repo", None).unwrap();
        assert!(ws.path_prefix().unwrap().is_none());
    }
}
