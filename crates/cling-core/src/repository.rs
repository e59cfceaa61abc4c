//! Repository: the cryptographic envelope layered over `Storage` (§4.3,
//! component 5). Owns block dedupe, revision read/write, and the CAS on
//! `refs/head`.

use std::sync::Arc;

use cling_crypto::{
    seal, unwrap_keys, wrap_keys, Argon2Params, BlockHeader, BlockId, CryptoError, KeyHierarchy, WrappedKeys,
    HEADER_LEN,
};
use cling_storage::Storage;
use serde::{Deserialize, Serialize};

use crate::error::{RepositoryError, Result};
use crate::revision::chain::{Revision, RevisionId};

const REFS_HEAD: &str = "refs/head";
const SECURITY_KEYS: &str = "security/keys.toml";
const LOCK_HEAD: &str = "head";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Data,
    Metadata,
}

#[derive(Debug, Serialize, Deserialize)]
struct RepoConfig {
    version: u32,
    aead: String,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self { version: 1, aead: "xchacha20poly1305".to_string() }
    }
}

/// On-disk representation of [`WrappedKeys`] — hex-encoded so the control
/// file stays a plain, human-inspectable toml document.
#[derive(Debug, Serialize, Deserialize)]
struct KeysFile {
    time_cost: u32,
    memory_cost_kib: u32,
    parallelism: u32,
    salt: String,
    nonce: String,
    ciphertext: String,
}

impl From<&WrappedKeys> for KeysFile {
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

impl TryFrom<KeysFile> for WrappedKeys {
    type Error = RepositoryError;

    fn try_from(f: KeysFile) -> Result<Self> {
        let salt: [u8; 16] = hex::decode(&f.salt)
            .map_err(|_| RepositoryError::CorruptChain { reason: "keys.toml salt is not hex".to_string() })?
            .try_into()
            .map_err(|_| RepositoryError::CorruptChain { reason: "keys.toml salt has the wrong length".to_string() })?;
        let nonce: [u8; 24] = hex::decode(&f.nonce)
            .map_err(|_| RepositoryError::CorruptChain { reason: "keys.toml nonce is not hex".to_string() })?
            .try_into()
            .map_err(|_| RepositoryError::CorruptChain { reason: "keys.toml nonce has the wrong length".to_string() })?;
        let ciphertext = hex::decode(&f.ciphertext)
            .map_err(|_| RepositoryError::CorruptChain { reason: "keys.toml ciphertext is not hex".to_string() })?;
        Ok(WrappedKeys {
            params: Argon2Params { time_cost: f.time_cost, memory_cost_kib: f.memory_cost_kib, parallelism: f.parallelism },
            salt,
            nonce,
            ciphertext,
        })
    }
}

pub struct Repository {
    storage: Arc<dyn Storage>,
    keys: KeyHierarchy,
}

impl Repository {
    /// Generate a fresh key hierarchy, wrap it under `passphrase`, and
    /// initialize `storage`'s on-disk layout.
    ///
    /// # Errors
    /// [`CryptoError::WeakPassphrase`] unless `allow_weak_passphrase` or
    /// the passphrase meets the strength rule; otherwise any storage or
    /// wrapping failure.
    pub fn init(storage: Arc<dyn Storage>, passphrase: &[u8], allow_weak_passphrase: bool) -> Result<Self> {
        let keys = KeyHierarchy::generate();
        let wrapped = wrap_keys(passphrase, &keys, allow_weak_passphrase)?;
        let config = RepoConfig::default();
        let toml = toml::to_string_pretty(&config).expect("RepoConfig always serializes");
        storage.init(&toml)?;
        let keys_toml = toml::to_string_pretty(&KeysFile::from(&wrapped)).expect("KeysFile always serializes");
        storage.write_control_file(SECURITY_KEYS, keys_toml.as_bytes())?;
        storage.write_control_file(REFS_HEAD, RevisionId::zero().as_block_id().as_bytes())?;
        Ok(Self { storage, keys })
    }

    /// Open an existing repository by unwrapping its saved keys with
    /// `passphrase`.
    ///
    /// # Errors
    /// [`CryptoError::InvalidPassphrase`] on a wrong passphrase; storage
    /// errors if the repository isn't initialized.
    pub fn open(storage: Arc<dyn Storage>, passphrase: &[u8]) -> Result<Self> {
        storage.open()?;
        let raw = storage.read_control_file(SECURITY_KEYS)?;
        let file: KeysFile =
            toml::from_str(&String::from_utf8_lossy(&raw)).map_err(|e| RepositoryError::CorruptChain { reason: e.to_string() })?;
        let wrapped = WrappedKeys::try_from(file)?;
        let keys = unwrap_keys(passphrase, &wrapped)?;
        Ok(Self { storage, keys })
    }

    /// Open an already-unwrapped key hierarchy directly, skipping
    /// passphrase verification (used when keys were loaded from the
    /// workspace's locally-encrypted key store).
    ///
    /// # Errors
    /// Storage errors if the repository isn't initialized.
    pub fn open_with_keys(storage: Arc<dyn Storage>, keys: KeyHierarchy) -> Result<Self> {
        storage.open()?;
        Ok(Self { storage, keys })
    }

    #[must_use]
    pub fn keys(&self) -> &KeyHierarchy {
        &self.keys
    }

    fn derive_id(&self, kind: BlockKind, plaintext: &[u8]) -> BlockId {
        match kind {
            BlockKind::Data => BlockId::derive_data(self.keys.block_id_hmac_key(), plaintext),
            BlockKind::Metadata => BlockId::derive_metadata(plaintext),
        }
    }

    /// Envelope-encrypt and store `plaintext`, deduplicating by content.
    ///
    /// # Errors
    /// Propagates storage and crypto failures.
    pub fn write_block(&self, kind: BlockKind, plaintext: &[u8]) -> Result<(bool, BlockHeader)> {
        let id = self.derive_id(kind, plaintext);
        if self.storage.has_block(id)? {
            let header_bytes = self.storage.read_block_header(id)?;
            let header = BlockHeader::read(&header_bytes)?;
            return Ok((true, header));
        }
        let sealed = seal(id, plaintext, self.keys.kek(), kind == BlockKind::Data)?;
        let header = sealed.header.clone();
        let existed = self.storage.write_block(id, &sealed.into_bytes())?;
        Ok((existed, header))
    }

    /// Read and decrypt a block, verifying its header id and the
    /// recomputed plaintext id both match `id`.
    ///
    /// # Errors
    /// [`CryptoError::BlockCorrupt`] on any mismatch or AEAD failure.
    pub fn read_block(&self, kind: BlockKind, id: BlockId) -> Result<Vec<u8>> {
        let bytes = self.storage.read_block(id)?;
        if bytes.len() < HEADER_LEN {
            return Err(CryptoError::BlockCorrupt("block shorter than header".to_string()).into());
        }
        let header = BlockHeader::read(&bytes[..HEADER_LEN])?;
        let plaintext = cling_crypto::open(&header, &bytes[HEADER_LEN..], self.keys.kek(), id)?;
        if self.derive_id(kind, &plaintext) != id {
            return Err(CryptoError::BlockCorrupt("plaintext does not hash back to its id".to_string()).into());
        }
        Ok(plaintext)
    }

    /// # Errors
    /// Propagates storage or codec failures.
    pub fn read_block_header(&self, id: BlockId) -> Result<BlockHeader> {
        let bytes = self.storage.read_block_header(id)?;
        Ok(BlockHeader::read(&bytes)?)
    }

    /// # Errors
    /// [`RepositoryError::CorruptChain`] if `id` is the zero root id.
    pub fn read_revision(&self, id: RevisionId) -> Result<Revision> {
        if id.is_root() {
            return Err(RepositoryError::CorruptChain { reason: "cannot read the root revision".to_string() });
        }
        let plaintext = self.read_block(BlockKind::Metadata, id.as_block_id())?;
        Revision::unmarshal(&plaintext).map_err(RepositoryError::from)
    }

    /// # Errors
    /// Propagates storage or crypto failures.
    pub fn write_revision(&self, revision: &Revision) -> Result<RevisionId> {
        let bytes = revision.marshal();
        let (_, header) = self.write_block(BlockKind::Metadata, &bytes)?;
        Ok(RevisionId::from_block_id(header.block_id))
    }

    /// # Errors
    /// Propagates storage failures.
    pub fn head(&self) -> Result<RevisionId> {
        let bytes = self.storage.read_control_file(REFS_HEAD)?;
        let id: [u8; 32] = bytes
            .try_into()
            .map_err(|_| RepositoryError::CorruptChain { reason: "refs/head is not 32 bytes".to_string() })?;
        Ok(RevisionId::from_block_id(BlockId::from_bytes(id)))
    }

    /// Compare-and-set `refs/head` under the advisory repository lock.
    ///
    /// # Errors
    /// [`RepositoryError::HeadChanged`] if the observed head doesn't
    /// match `expected`.
    pub fn set_head(&self, expected: RevisionId, new: RevisionId) -> Result<()> {
        let handle = self.storage.lock(LOCK_HEAD)?;
        let current = self.head()?;
        if current != expected {
            let _ = handle.unlock();
            return Err(RepositoryError::HeadChanged { expected, actual: current });
        }
        self.storage.write_control_file(REFS_HEAD, new.as_block_id().as_bytes())?;
        handle.unlock()?;
        Ok(())
    }

    #[must_use]
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cling_storage::LocalStorage;

    fn repo(dir: &std::path::Path) -> Arc<dyn Storage> {
        Arc::new(LocalStorage::new(dir))
    }

    #[test]
    fn init_then_open_recovers_the_same_keys() {
        let dir = tempfile::tempdir().unwrap();
        let storage = repo(&dir.path().join("repo"));
        let created = Repository::init(storage.clone(), b"correct horse battery staple1", false).unwrap();
        let opened = Repository::open(storage, b"correct horse battery staple1").unwrap();
        assert_eq!(created.keys().kek(), opened.keys().kek());
        assert_eq!(created.keys().block_id_hmac_key(), opened.keys().block_id_hmac_key());
    }

    #[test]
    fn wrong_passphrase_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let storage = repo(&dir.path().join("repo"));
        Repository::init(storage.clone(), b"correct horse battery staple1", false).unwrap();
        assert!(Repository::open(storage, b"wrong horse battery staple1").is_err());
    }

    #[test]
    fn write_block_deduplicates() {
        let dir = tempfile::tempdir().unwrap();
        let storage = repo(&dir.path().join("repo"));
        let repository = Repository::init(storage, b"correct horse battery staple1", false).unwrap();
        let (existed1, header1) = repository.write_block(BlockKind::Data, b"hello").unwrap();
        let (existed2, header2) = repository.write_block(BlockKind::Data, b"hello").unwrap();
        assert!(!existed1);
        assert!(existed2);
        assert_eq!(header1.block_id, header2.block_id);
    }

    #[test]
    fn write_then_read_block_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let storage = repo(&dir.path().join("repo"));
        let repository = Repository::init(storage, b"correct horse battery staple1", false).unwrap();
        let (_, header) = repository.write_block(BlockKind::Data, b"payload").unwrap();
        let plaintext = repository.read_block(BlockKind::Data, header.block_id).unwrap();
        assert_eq!(plaintext, b"payload");
    }

    #[test]
    fn head_starts_at_root_and_cas_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let storage = repo(&dir.path().join("repo"));
        let repository = Repository::init(storage, b"correct horse battery staple1", false).unwrap();
        assert_eq!(repository.head().unwrap(), RevisionId::zero());

        let revision = Revision { timestamp: 1, author: "a".into(), message: "m".into(), parent: RevisionId::zero(), blocks: vec![] };
        let id = repository.write_revision(&revision).unwrap();
        repository.set_head(RevisionId::zero(), id).unwrap();
        assert_eq!(repository.head().unwrap(), id);
    }

    #[test]
    fn cas_fails_when_head_has_moved() {
        let dir = tempfile::tempdir().unwrap();
        let storage = repo(&dir.path().join("repo"));
        let repository = Repository::init(storage, b"correct horse battery staple1", false).unwrap();
        let revision = Revision { timestamp: 1, author: "a".into(), message: "m".into(), parent: RevisionId::zero(), blocks: vec![] };
        let id = repository.write_revision(&revision).unwrap();
        repository.set_head(RevisionId::zero(), id).unwrap();

        let result = repository.set_head(RevisionId::zero(), id);
        assert!(matches!(result, Err(RepositoryError::HeadChanged { .. })));
    }
}
