//! The repository key hierarchy (§4.1): a random `KEK` and a random
//! `BlockIdHmacKey`, generated once at `init` and wrapped under a
//! passphrase-derived key for storage in a control file.

use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// The two long-term secrets every repository holds: the key-encryption
/// key that wraps per-block DEKs, and the HMAC key used to derive data
/// `BlockId`s.
///
/// Zeroized on drop; never implements `Debug` or `Clone` carelessly —
/// holders are expected to pass this by value or reference, not to copy
/// it around casually.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct KeyHierarchy {
    kek: [u8; 32],
    block_id_hmac_key: [u8; 32],
}

impl KeyHierarchy {
    /// Generate a fresh key hierarchy using the OS RNG. Called once at
    /// `Repository::init`.
    #[must_use]
    pub fn generate() -> Self {
        let mut kek = [0u8; 32];
        let mut block_id_hmac_key = [0u8; 32];
        rand::rng().fill_bytes(&mut kek);
        rand::rng().fill_bytes(&mut block_id_hmac_key);
        Self { kek, block_id_hmac_key }
    }

    /// Reconstruct a key hierarchy from raw bytes (used when unwrapping
    /// a control file, or importing a recovery code).
    #[must_use]
    pub const fn from_parts(kek: [u8; 32], block_id_hmac_key: [u8; 32]) -> Self {
        Self { kek, block_id_hmac_key }
    }

    /// The key-encryption key.
    #[must_use]
    pub const fn kek(&self) -> &[u8; 32] {
        &self.kek
    }

    /// The `BlockId` HMAC key.
    #[must_use]
    pub const fn block_id_hmac_key(&self) -> &[u8; 32] {
        &self.block_id_hmac_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_produces_distinct_keys() {
        let a = KeyHierarchy::generate();
        let b = KeyHierarchy::generate();
        assert_ne!(a.kek(), b.kek());
        assert_ne!(a.block_id_hmac_key(), b.block_id_hmac_key());
        assert_ne!(a.kek(), a.block_id_hmac_key());
    }

    #[test]
    fn from_parts_round_trips() {
        let kek = [7u8; 32];
        let hmac_key = [9u8; 32];
        let keys = KeyHierarchy::from_parts(kek, hmac_key);
        assert_eq!(keys.kek(), &kek);
        assert_eq!(keys.block_id_hmac_key(), &hmac_key);
    }
}
