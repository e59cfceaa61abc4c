//! Crate-wide error type for the revision engine and merge pipeline (§7).

use crate::merge::MergeConflict;
use crate::revision::RevisionId;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error(transparent)]
    Storage(#[from] cling_storage::StorageError),

    #[error(transparent)]
    Crypto(#[from] cling_crypto::CryptoError),

    #[error(transparent)]
    Codec(#[from] cling_codec::CodecError),

    #[error(transparent)]
    Temp(#[from] crate::temp::TempError),

    #[error(transparent)]
    Staging(#[from] crate::staging::StagingError),

    #[error("head changed: expected {expected}, found {actual}")]
    HeadChanged { expected: RevisionId, actual: RevisionId },

    #[error("repository head changed during merge")]
    RemoteChanged,

    #[error("workspace is already up to date")]
    UpToDate,

    #[error("refusing to commit an empty revision")]
    EmptyCommit,

    #[error("{count} conflict(s) detected")]
    MergeConflicts { count: usize, conflicts: Vec<MergeConflict> },

    #[error("{path} was modified or deleted during the merge")]
    ConcurrentModification { path: String },

    #[error("path prefix is invalid: {reason}")]
    InvalidPathPrefix { reason: String },

    #[error("revision chain is corrupt: {reason}")]
    CorruptChain { reason: String },

    #[error(transparent)]
    Path(#[from] crate::path::PathError),

    #[error(transparent)]
    Lock(#[from] cling_storage::LockError),
}

pub type Result<T> = std::result::Result<T, RepositoryError>;
