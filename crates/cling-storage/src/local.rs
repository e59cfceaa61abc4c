//! Local filesystem storage backend (§4.2).
//!
//! Layout under the repository root:
//!
//! ```text
//! repo.toml
//! blocks/<shard>/<64-hex-id>.block
//! control/<path>
//! locks/<name>.lock
//! ```
//!
//! Blocks are sharded by the first byte of their hex id so that no single
//! directory accumulates millions of entries. Writes of both blocks and
//! control files go through a temp-file-then-rename so a crash mid-write
//! never leaves a partial file at the final path.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use cling_crypto::{BlockId, HEADER_LEN};
use rand::RngCore;

use crate::error::StorageError;
use crate::traits::{LockHandle, Storage};

const REPO_TOML: &str = "repo.toml";
const BLOCKS_DIR: &str = "blocks";
const CONTROL_DIR: &str = "control";
const LOCKS_DIR: &str = "locks";

pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn repo_toml_path(&self) -> PathBuf {
        self.root.join(REPO_TOML)
    }

    fn block_path(&self, id: BlockId) -> PathBuf {
        let hex = id.to_hex();
        self.root.join(BLOCKS_DIR).join(&hex[0..2]).join(hex)
    }

    fn control_path(&self, path: &str) -> PathBuf {
        self.root.join(CONTROL_DIR).join(path)
    }

    fn lock_path(&self, name: &str) -> PathBuf {
        self.root.join(LOCKS_DIR).join(format!("{name}.lock"))
    }

    /// Write `bytes` to `target` via a randomly-named temp file in the same
    /// directory followed by a rename, so concurrent readers never observe
    /// a partial file.
    fn write_atomic(target: &Path, bytes: &[u8]) -> Result<(), StorageError> {
        let dir = target.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(|e| StorageError::io(dir.display().to_string(), e))?;
        let mut suffix = [0u8; 8];
        rand::rng().fill_bytes(&mut suffix);
        let tmp_name = format!(".{}.tmp.{}", target.file_name().and_then(|n| n.to_str()).unwrap_or("tmp"), hex_encode(&suffix));
        let tmp_path = dir.join(tmp_name);
        {
            let mut f = File::create(&tmp_path).map_err(|e| StorageError::io(tmp_path.display().to_string(), e))?;
            f.write_all(bytes).map_err(|e| StorageError::io(tmp_path.display().to_string(), e))?;
            f.sync_all().map_err(|e| StorageError::io(tmp_path.display().to_string(), e))?;
        }
        fs::rename(&tmp_path, target).map_err(|e| StorageError::io(target.display().to_string(), e))?;
        Ok(())
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

impl Storage for LocalStorage {
    fn init(&self, repo_toml: &str) -> Result<(), StorageError> {
        let path = self.repo_toml_path();
        if path.exists() {
            return Err(StorageError::AlreadyInitialized { path: self.root.display().to_string() });
        }
        fs::create_dir_all(&self.root).map_err(|e| StorageError::io(self.root.display().to_string(), e))?;
        fs::create_dir_all(self.root.join(BLOCKS_DIR)).map_err(|e| StorageError::io(BLOCKS_DIR, e))?;
        fs::create_dir_all(self.root.join(CONTROL_DIR)).map_err(|e| StorageError::io(CONTROL_DIR, e))?;
        fs::create_dir_all(self.root.join(LOCKS_DIR)).map_err(|e| StorageError::io(LOCKS_DIR, e))?;
        Self::write_atomic(&path, repo_toml.as_bytes())
    }

    fn open(&self) -> Result<String, StorageError> {
        let path = self.repo_toml_path();
        fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotInitialized { path: self.root.display().to_string() }
            } else {
                StorageError::io(path.display().to_string(), e)
            }
        })
    }

    fn has_block(&self, id: BlockId) -> Result<bool, StorageError> {
        Ok(self.block_path(id).is_file())
    }

    fn read_block(&self, id: BlockId) -> Result<Vec<u8>, StorageError> {
        let path = self.block_path(id);
        fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::BlockNotFound { id: id.to_hex() }
            } else {
                StorageError::io(path.display().to_string(), e)
            }
        })
    }

    fn read_block_header(&self, id: BlockId) -> Result<Vec<u8>, StorageError> {
        use std::io::Read;
        let path = self.block_path(id);
        let mut f = File::open(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::BlockNotFound { id: id.to_hex() }
            } else {
                StorageError::io(path.display().to_string(), e)
            }
        })?;
        let mut buf = vec![0u8; HEADER_LEN];
        f.read_exact(&mut buf).map_err(|e| StorageError::io(path.display().to_string(), e))?;
        Ok(buf)
    }

    fn write_block(&self, id: BlockId, bytes: &[u8]) -> Result<bool, StorageError> {
        if self.has_block(id)? {
            return Ok(true);
        }
        Self::write_atomic(&self.block_path(id), bytes)?;
        Ok(false)
    }

    fn has_control_file(&self, path: &str) -> Result<bool, StorageError> {
        Ok(self.control_path(path).is_file())
    }

    fn read_control_file(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let full = self.control_path(path);
        fs::read(&full).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::ControlFileNotFound { path: path.to_string() }
            } else {
                StorageError::io(full.display().to_string(), e)
            }
        })
    }

    fn write_control_file(&self, path: &str, bytes: &[u8]) -> Result<(), StorageError> {
        Self::write_atomic(&self.control_path(path), bytes)
    }

    fn delete_control_file(&self, path: &str) -> Result<(), StorageError> {
        let full = self.control_path(path);
        match fs::remove_file(&full) {
            Ok(()) => Ok(()),
            Err(_) if !full.exists() => Ok(()),
            Err(e) => Err(StorageError::io(full.display().to_string(), e)),
        }
    }

    fn lock(&self, name: &str) -> Result<Box<dyn LockHandle>, StorageError> {
        let path = self.lock_path(name);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| StorageError::io(dir.display().to_string(), e))?;
        }
        match OpenOptions::new().create_new(true).write(true).open(&path) {
            Ok(_) => Ok(Box::new(LocalLockHandle { path })),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(StorageError::LockHeld { name: name.to_string() })
            }
            Err(e) => Err(StorageError::io(path.display().to_string(), e)),
        }
    }
}

struct LocalLockHandle {
    path: PathBuf,
}

impl LockHandle for LocalLockHandle {
    fn unlock(self: Box<Self>) -> Result<(), StorageError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::LockNotHeld {
                name: self.path.file_stem().and_then(|s| s.to_str()).unwrap_or("?").to_string(),
            }),
            Err(e) => Err(StorageError::io(self.path.display().to_string(), e)),
        }
    }
}

impl Drop for LocalLockHandle {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cling_crypto::BlockId;

    fn storage() -> (tempfile::TempDir, LocalStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path().join("repo"));
        (dir, storage)
    }

    #[test]
    fn init_then_open_round_trips_toml() {
        let (_dir, storage) = storage();
        storage.init("version = 1\n").unwrap();
        assert_eq!(storage.open().unwrap(), "version = 1\n");
    }

    #[test]
    fn double_init_fails() {
        let (_dir, storage) = storage();
        storage.init("version = 1\n").unwrap();
        assert!(matches!(storage.init("version = 1\n"), Err(StorageError::AlreadyInitialized { .. })));
    }

    #[test]
    fn open_before_init_fails() {
        let (_dir, storage) = storage();
        assert!(matches!(storage.open(), Err(StorageError::NotInitialized { .. })));
    }

    #[test]
    fn write_then_read_block() {
        let (_dir, storage) = storage();
        storage.init("version = 1\n").unwrap();
        let id = BlockId::derive_metadata(b"hello");
        let existed = storage.write_block(id, b"header+ciphertext").unwrap();
        assert!(!existed);
        assert!(storage.has_block(id).unwrap());
        assert_eq!(storage.read_block(id).unwrap(), b"header+ciphertext");
    }

    #[test]
    fn rewriting_existing_block_is_a_noop() {
        let (_dir, storage) = storage();
        storage.init("version = 1\n").unwrap();
        let id = BlockId::derive_metadata(b"hello");
        storage.write_block(id, b"first").unwrap();
        let existed = storage.write_block(id, b"second").unwrap();
        assert!(existed);
        assert_eq!(storage.read_block(id).unwrap(), b"first");
    }

    #[test]
    fn missing_block_is_not_found() {
        let (_dir, storage) = storage();
        storage.init("version = 1\n").unwrap();
        let id = BlockId::derive_metadata(b"nope");
        assert!(matches!(storage.read_block(id), Err(StorageError::BlockNotFound { .. })));
    }

    #[test]
    fn control_files_round_trip_and_delete() {
        let (_dir, storage) = storage();
        storage.init("version = 1\n").unwrap();
        storage.write_control_file("refs/head", b"abc123").unwrap();
        assert!(storage.has_control_file("refs/head").unwrap());
        assert_eq!(storage.read_control_file("refs/head").unwrap(), b"abc123");
        storage.delete_control_file("refs/head").unwrap();
        assert!(!storage.has_control_file("refs/head").unwrap());
        // Deleting again is not an error.
        storage.delete_control_file("refs/head").unwrap();
    }

    #[test]
    fn lock_is_exclusive_until_unlocked() {
        let (_dir, storage) = storage();
        storage.init("version = 1\n").unwrap();
        let handle = storage.lock("merge").unwrap();
        assert!(matches!(storage.lock("merge"), Err(StorageError::LockHeld { .. })));
        handle.unlock().unwrap();
        assert!(storage.lock("merge").is_ok());
    }

    #[test]
    fn block_shards_by_first_hex_byte() {
        let (_dir, storage) = storage();
        storage.init("version = 1\n").unwrap();
        let id = BlockId::derive_metadata(b"shard-me");
        storage.write_block(id, b"data").unwrap();
        let hex = id.to_hex();
        let path = storage.root().join(BLOCKS_DIR).join(&hex[0..2]).join(&hex);
        assert!(path.is_file());
    }
}
