//! `BlockId` derivation (§3, §4.1, invariant I3/I4).
//!
//! Data blocks are identified by `HMAC-SHA256(BlockIdHmacKey, plaintext)`;
//! metadata blocks (which already embed a random nonce via the AEAD seal)
//! are identified by the keyless `SHA-256(plaintext)`. Either way the id is
//! a function of plaintext only, so the storage layer — which never sees
//! plaintext — cannot derive or correlate it.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Number of raw bytes in a [`BlockId`].
pub const BLOCK_ID_LEN: usize = 32;

/// A 32-byte deterministic identifier of a block's plaintext.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId([u8; BLOCK_ID_LEN]);

impl BlockId {
    /// Wrap a raw 32-byte id.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; BLOCK_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Borrow the raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; BLOCK_ID_LEN] {
        &self.0
    }

    /// The all-zero id, used as the root `RevisionId`.
    #[must_use]
    pub const fn zero() -> Self {
        Self([0u8; BLOCK_ID_LEN])
    }

    /// `true` if this is the all-zero id.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; BLOCK_ID_LEN]
    }

    /// Lowercase hex encoding, used for display and for sharded storage paths.
    #[must_use]
    pub fn to_hex(&self) -> String {
        let mut s = String::with_capacity(BLOCK_ID_LEN * 2);
        for byte in &self.0 {
            s.push_str(&format!("{byte:02x}"));
        }
        s
    }

    /// The first byte of the hex encoding, used as the storage shard directory
    /// (`blocks/<aa>/<aabbcc...>`, §4.2/§6).
    #[must_use]
    pub fn shard(&self) -> String {
        format!("{:02x}", self.0[0])
    }

    /// Derive a data-block id: `HMAC-SHA256(hmac_key, plaintext)`.
    #[must_use]
    pub fn derive_data(hmac_key: &[u8; 32], plaintext: &[u8]) -> Self {
        let mut mac = Hmac::<Sha256>::new_from_slice(hmac_key).expect("HMAC accepts any key length");
        mac.update(plaintext);
        let tag = mac.finalize().into_bytes();
        Self(tag.into())
    }

    /// Derive a metadata-block id: `SHA-256(plaintext)`.
    #[must_use]
    pub fn derive_metadata(plaintext: &[u8]) -> Self {
        let digest = Sha256::digest(plaintext);
        Self(digest.into())
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockId({})", self.to_hex())
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Error returned when a hex string cannot be parsed as a [`BlockId`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid block id `{0}`: expected 64 lowercase hex characters")]
pub struct InvalidBlockId(pub String);

impl FromStr for BlockId {
    type Err = InvalidBlockId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != BLOCK_ID_LEN * 2 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(InvalidBlockId(s.to_owned()));
        }
        let mut bytes = [0u8; BLOCK_ID_LEN];
        for i in 0..BLOCK_ID_LEN {
            bytes[i] = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).map_err(|_| InvalidBlockId(s.to_owned()))?;
        }
        Ok(Self(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_id_is_deterministic_and_keyed() {
        let key_a = [1u8; 32];
        let key_b = [2u8; 32];
        let id_a1 = BlockId::derive_data(&key_a, b"hello");
        let id_a2 = BlockId::derive_data(&key_a, b"hello");
        let id_b = BlockId::derive_data(&key_b, b"hello");
        assert_eq!(id_a1, id_a2);
        assert_ne!(id_a1, id_b);
    }

    #[test]
    fn metadata_id_matches_sha256() {
        let id = BlockId::derive_metadata(b"a");
        // sha256("a") = ca978112ca1bbdcafac231b39a23dc4da786eff8147c4e72b9807785afee48bb
        assert_eq!(id.to_hex(), "ca978112ca1bbdcafac231b39a23dc4da786eff8147c4e72b9807785afee48bb");
    }

    #[test]
    fn hex_round_trip() {
        let id = BlockId::derive_metadata(b"round trip me");
        let parsed: BlockId = id.to_hex().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn shard_is_first_hex_byte() {
        let id = BlockId::derive_metadata(b"a");
        assert_eq!(id.shard(), "ca");
    }

    #[test]
    fn zero_is_all_zero_bytes() {
        assert!(BlockId::zero().is_zero());
        assert!(!BlockId::derive_metadata(b"x").is_zero());
    }

    #[test]
    fn rejects_malformed_hex() {
        assert!("not-hex".parse::<BlockId>().is_err());
        assert!("ab".parse::<BlockId>().is_err());
    }
}
