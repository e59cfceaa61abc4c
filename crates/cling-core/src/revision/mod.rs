//! Revision streams: entry marshalling, the revision chain, and snapshot
//! materialization (§3, §4.6, component 8).

pub mod chain;
pub mod entry;
pub mod snapshot;

pub use chain::{Revision, RevisionId};
pub use entry::{EntryType, FileMetadata, RevisionEntry, NO_BIRTHTIME, S_IFDIR, S_IFLNK, UNKNOWN_ID};
pub use snapshot::{build_revision_snapshot, RevisionSnapshot};
