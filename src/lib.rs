//! cling library crate — re-exports the domain crates for integration tests.
//!
//! The primary interface is the `cling` CLI binary (`src/main.rs`); this
//! crate exists so `tests/` can reach `cling_core`/`cling_crypto` types
//! without depending on them directly.

pub use cling_core as core;
pub use cling_crypto as crypto;
pub use cling_storage as storage;
