//! Cryptographic envelope and key hierarchy for cling repositories (§4.1).
//!
//! This crate is deliberately storage-agnostic: it knows how to derive
//! `BlockId`s, seal and open individual block payloads, and wrap/unwrap the
//! repository's key hierarchy under a passphrase. It never touches the
//! filesystem — that's `cling-storage`'s job.

pub mod envelope;
pub mod error;
pub mod ids;
pub mod kdf;
pub mod keys;
pub mod recovery;

pub use envelope::{seal, open, BlockFlags, BlockHeader, SealedBlock, HEADER_LEN, MAX_BLOCK_DATA_SIZE};
pub use error::CryptoError;
pub use ids::{BlockId, InvalidBlockId, BLOCK_ID_LEN};
pub use kdf::{check_passphrase_strength, unwrap_keys, wrap_keys, Argon2Params, WrappedKeys};
pub use keys::KeyHierarchy;
pub use recovery::{decode_recovery_code, encode_recovery_code};
