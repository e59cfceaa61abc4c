//! `cling security save-keys|delete-keys` (§4.1: "imported locally into
//! the workspace, encrypted under a random raw key kept in the OS
//! keychain").
//!
//! The OS keychain wrapper is an external collaborator this crate
//! doesn't implement; as a stand-in, the random raw key is itself kept
//! next to the wrapped keys with owner-only file permissions
//! (`.cling/security/local.key`). That's weaker than a real keychain —
//! anyone who can read the workspace's files can read this one too — but
//! it gets `merge` off the interactive-passphrase path the same way,
//! which is what the CLI surface actually needs. Documented as an open
//! question resolution in DESIGN.md.

use std::fs;
use std::path::PathBuf;

use cling_core::{RepositoryError, Result, Workspace};
use cling_crypto::{unwrap_keys, wrap_keys, Argon2Params, KeyHierarchy, WrappedKeys};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct LocalKeysFile {
    time_cost: u32,
    memory_cost_kib: u32,
    parallelism: u32,
    salt: String,
    nonce: String,
    ciphertext: String,
}

impl From<&WrappedKeys> for LocalKeysFile {
    fn from(w: &WrappedKeys) -> Self {
        Self {
            time_cost: w.params.time_cost,
            memory_cost_kib: w.params.memory_cost_kib,
            parallelism: w.params.parallelism,
            salt: hex::encode(w.salt),
            nonce: hex::encode(w.nonce),
            ciphertext: hex::encode(&w.ciphertext),
        }
    }
}

impl TryFrom<LocalKeysFile> for WrappedKeys {
    type Error = RepositoryError;

    fn try_from(f: LocalKeysFile) -> Result<Self> {
        let salt: [u8; 16] = hex::decode(&f.salt)
            .map_err(|_| RepositoryError::CorruptChain { reason: "local keys salt is not hex".to_string() })?
            .try_into()
            .map_err(|_| RepositoryError::CorruptChain { reason: "local keys salt has the wrong length".to_string() })?;
        let nonce: [u8; 24] = hex::decode(&f.nonce)
            .map_err(|_| RepositoryError::CorruptChain { reason: "local keys nonce is not hex".to_string() })?
            .try_into()
            .map_err(|_| RepositoryError::CorruptChain { reason: "local keys nonce has the wrong length".to_string() })?;
        let ciphertext = hex::decode(&f.ciphertext)
            .map_err(|_| RepositoryError::CorruptChain { reason: "local keys ciphertext is not hex".to_string() })?;
        Ok(Self { params: Argon2Params { time_cost: f.time_cost, memory_cost_kib: f.memory_cost_kib, parallelism: f.parallelism }, salt, nonce, ciphertext })
    }
}

fn local_key_path(workspace: &Workspace) -> PathBuf {
    workspace.keys_path().with_file_name("local.key")
}

fn io_err(path: &std::path::Path, source: std::io::Error) -> RepositoryError {
    cling_storage::StorageError::Io { path: path.display().to_string(), source }.into()
}

/// Save `keys` locally so future sessions skip the passphrase prompt.
///
/// # Errors
/// Propagates I/O and wrapping failures.
pub fn save_local_keys(workspace: &Workspace, keys: &KeyHierarchy) -> Result<()> {
    let mut local_key = [0u8; 32];
    rand::RngCore::fill_bytes(&mut rand::rng(), &mut local_key);
    let wrapped = wrap_keys(&local_key, keys, true)?;

    let keys_path = workspace.keys_path();
    let dir = keys_path.parent().unwrap_or_else(|| std::path::Path::new("."));
    fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

    let toml = toml::to_string_pretty(&LocalKeysFile::from(&wrapped)).expect("LocalKeysFile always serializes");
    fs::write(&keys_path, toml).map_err(|e| io_err(&keys_path, e))?;

    let key_path = local_key_path(workspace);
    fs::write(&key_path, local_key).map_err(|e| io_err(&key_path, e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&key_path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(&key_path, e))?;
    }
    Ok(())
}

/// Load a locally-saved key hierarchy, if `security save-keys` was run for
/// this workspace.
///
/// # Errors
/// Propagates I/O failures other than the files not existing, and
/// unwrapping failures (a corrupted local key file).
pub fn load_local_keys(workspace: &Workspace) -> Result<Option<KeyHierarchy>> {
    let keys_path = workspace.keys_path();
    let key_path = local_key_path(workspace);
    let (keys_bytes, key_bytes) = match (fs::read(&keys_path), fs::read(&key_path)) {
        (Ok(k), Ok(l)) => (k, l),
        (Err(e), _) | (_, Err(e)) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        (Err(e), _) => return Err(io_err(&keys_path, e)),
        (_, Err(e)) => return Err(io_err(&key_path, e)),
    };
    let local_key: [u8; 32] = key_bytes
        .try_into()
        .map_err(|_| RepositoryError::CorruptChain { reason: "local.key is not 32 bytes".to_string() })?;
    let file: LocalKeysFile =
        toml::from_str(&String::from_utf8_lossy(&keys_bytes)).map_err(|e| RepositoryError::CorruptChain { reason: e.to_string() })?;
    let wrapped = WrappedKeys::try_from(file)?;
    let keys = unwrap_keys(&local_key, &wrapped)?;
    Ok(Some(keys))
}

/// Remove any locally-saved keys, forcing the next session to prompt for
/// the passphrase again.
///
/// # Errors
/// Propagates I/O failures other than the files already being absent.
pub fn delete_local_keys(workspace: &Workspace) -> Result<()> {
    for path in [workspace.keys_path(), local_key_path(workspace)] {
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(io_err(&path, e)),
        }
    }
    Ok(())
}
