//! The revision engine and three-way merge pipeline for cling.
//!
//! Layering: [`path`] and [`ignore_stack`] are leaves; [`gear`] and
//! [`temp`] are the chunking and external-sort primitives built on top;
//! [`revision`] and [`repository`] give you the immutable, content-addressed
//! history; [`staging`] and [`workspace`] describe one workspace's state;
//! [`merge`] reconciles the two; [`health`] verifies a repository end to
//! end.

pub mod error;
pub mod gear;
pub mod health;
pub mod ignore_stack;
pub mod merge;
pub mod path;
pub mod repository;
pub mod revision;
pub mod staging;
pub mod temp;
pub mod workspace;

pub use error::{RepositoryError, Result};
pub use health::{check as check_health, HealthReport};
pub use merge::{cp, force_commit, ls, log, merge, reset, status, ChangeKind, MergeConflict, MergeOptions, OnExists, StatusEntry};
pub use path::RepoPath;
pub use repository::{BlockKind, Repository};
pub use revision::{build_revision_snapshot, Revision, RevisionEntry, RevisionId, RevisionSnapshot};
pub use staging::{build_staging, Staging, StagingCache};
pub use workspace::{Workspace, WorkspaceConfig};
