//! File-tree storage backend for cling repositories (§4.2, §5).
//!
//! This crate doesn't know anything about encryption or revisions — it
//! stores opaque bytes under content-addressed block ids and a handful of
//! named control files, and arbitrates advisory locks between concurrent
//! writers. `cling-core` builds the repository semantics on top.

pub mod error;
pub mod local;
pub mod lock;
pub mod traits;

pub use error::StorageError;
pub use local::LocalStorage;
pub use lock::{LeaseLatch, LeaseLockService, LockError};
pub use traits::{LockHandle, Storage};
