//! Error type for the storage backend (§4.2, §5).

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("repository already initialized at {path}")]
    AlreadyInitialized { path: String },

    #[error("repository not initialized at {path}")]
    NotInitialized { path: String },

    #[error("block {id} not found")]
    BlockNotFound { id: String },

    #[error("control file {path} not found")]
    ControlFileNotFound { path: String },

    #[error("lock {name} is already held")]
    LockHeld { name: String },

    #[error("lock {name} is not held")]
    LockNotHeld { name: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Codec(#[from] cling_codec::CodecError),
}

impl StorageError {
    pub(crate) fn io(path: impl Into<String>, source: io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}
