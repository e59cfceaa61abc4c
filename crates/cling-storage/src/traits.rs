//! The `Storage` contract (§4.2): a file-tree of encrypted blocks plus a
//! handful of plaintext control files and advisory locks. Implementations
//! never interpret block contents — that's the crypto/core layers' job.

use cling_crypto::BlockId;

use crate::error::StorageError;

/// A held advisory lock. Dropping without calling [`LockHandle::unlock`]
/// still releases the lock (backends should make `Drop` best-effort), but
/// callers should prefer the explicit call so release errors surface.
pub trait LockHandle: Send {
    /// Release the lock. Consumes the handle so it can't be unlocked twice.
    ///
    /// # Errors
    /// Returns an error if the backend could not confirm release (e.g. the
    /// lock file vanished out from under it).
    fn unlock(self: Box<Self>) -> Result<(), StorageError>;
}

/// The storage backend for one repository.
///
/// # Errors
/// Every method may fail with [`StorageError`]; see the variant docs.
pub trait Storage: Send + Sync {
    /// Create the repository layout and write the initial `repo.toml`.
    fn init(&self, repo_toml: &str) -> Result<(), StorageError>;

    /// Read the current `repo.toml`.
    fn open(&self) -> Result<String, StorageError>;

    /// Check whether a block exists without reading it.
    fn has_block(&self, id: BlockId) -> Result<bool, StorageError>;

    /// Read a block's full bytes (header + ciphertext).
    fn read_block(&self, id: BlockId) -> Result<Vec<u8>, StorageError>;

    /// Read only a block's fixed-length header, without the ciphertext.
    fn read_block_header(&self, id: BlockId) -> Result<Vec<u8>, StorageError>;

    /// Write a block's full bytes atomically. Returns whether a block with
    /// this id already existed (a no-op in that case: content-addressed
    /// blocks are immutable, so the existing bytes are left untouched).
    fn write_block(&self, id: BlockId, bytes: &[u8]) -> Result<bool, StorageError>;

    /// Check whether a control file exists.
    fn has_control_file(&self, path: &str) -> Result<bool, StorageError>;

    /// Read a control file's raw bytes.
    fn read_control_file(&self, path: &str) -> Result<Vec<u8>, StorageError>;

    /// Write a control file atomically, creating parent directories as needed.
    fn write_control_file(&self, path: &str, bytes: &[u8]) -> Result<(), StorageError>;

    /// Delete a control file. Not an error if it doesn't exist.
    fn delete_control_file(&self, path: &str) -> Result<(), StorageError>;

    /// Acquire a named advisory lock, failing immediately if already held.
    fn lock(&self, name: &str) -> Result<Box<dyn LockHandle>, StorageError>;
}
