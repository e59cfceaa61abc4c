//! Passphrase strength checking and Argon2id-based wrapping of the key
//! hierarchy (§4.1).

use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use rand::RngCore;

use crate::error::CryptoError;
use crate::keys::KeyHierarchy;

/// Argon2id parameters recorded alongside the wrapped key material so a
/// future `open()` can reproduce the same wrapping key. Defaults follow
/// the OWASP-recommended minimum for interactive logins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Argon2Params {
    /// Number of passes over memory.
    pub time_cost: u32,
    /// Memory usage in KiB.
    pub memory_cost_kib: u32,
    /// Degree of parallelism.
    pub parallelism: u32,
}

impl Default for Argon2Params {
    fn default() -> Self {
        Self { time_cost: 3, memory_cost_kib: 19_456, parallelism: 1 }
    }
}

impl Argon2Params {
    fn to_argon2(self) -> Result<Argon2<'static>, CryptoError> {
        let params = Params::new(self.memory_cost_kib, self.time_cost, self.parallelism, Some(32))
            .map_err(|e| CryptoError::BlockCorrupt(format!("invalid Argon2 params: {e}")))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

/// Length in bytes of the plaintext key material being wrapped: the
/// 32-byte KEK followed by the 32-byte `BlockIdHmacKey`.
const KEY_MATERIAL_LEN: usize = 64;

/// Salt length for Argon2id.
pub const SALT_LEN: usize = 16;
/// Nonce length for the XChaCha20-Poly1305 wrapping cipher.
pub const WRAP_NONCE_LEN: usize = 24;
/// Ciphertext length: plaintext key material plus the 16-byte AEAD tag.
pub const WRAP_CIPHERTEXT_LEN: usize = KEY_MATERIAL_LEN + 16;

/// The wrapped form of a [`KeyHierarchy`], as stored in the repository's
/// `security/keys.toml` control file.
#[derive(Debug, Clone)]
pub struct WrappedKeys {
    /// Argon2id parameters used to derive the wrapping key.
    pub params: Argon2Params,
    /// Random salt for Argon2id.
    pub salt: [u8; SALT_LEN],
    /// Random nonce for the wrapping AEAD.
    pub nonce: [u8; WRAP_NONCE_LEN],
    /// `XChaCha20Poly1305(wrapping_key, nonce).encrypt(kek || block_id_hmac_key)`.
    pub ciphertext: Vec<u8>,
}

/// Wrap a freshly generated [`KeyHierarchy`] under a key derived from `passphrase`.
///
/// # Errors
/// Returns [`CryptoError::WeakPassphrase`] if the passphrase fails the
/// strength rule and `allow_weak` is `false`.
pub fn wrap_keys(passphrase: &[u8], keys: &KeyHierarchy, allow_weak: bool) -> Result<WrappedKeys, CryptoError> {
    if !allow_weak {
        check_passphrase_strength(passphrase)?;
    }
    let params = Argon2Params::default();
    let mut salt = [0u8; SALT_LEN];
    let mut nonce_bytes = [0u8; WRAP_NONCE_LEN];
    rand::rng().fill_bytes(&mut salt);
    rand::rng().fill_bytes(&mut nonce_bytes);

    let wrapping_key = derive_wrapping_key(passphrase, &salt, params)?;
    let cipher = XChaCha20Poly1305::new(Key::from_slice(&wrapping_key));
    let nonce = XNonce::from_slice(&nonce_bytes);

    let mut material = [0u8; KEY_MATERIAL_LEN];
    material[..32].copy_from_slice(keys.kek());
    material[32..].copy_from_slice(keys.block_id_hmac_key());
    let ciphertext = cipher
        .encrypt(nonce, material.as_ref())
        .map_err(|_| CryptoError::BlockCorrupt("key wrap encryption failed".to_owned()))?;

    Ok(WrappedKeys { params, salt, nonce: nonce_bytes, ciphertext })
}

/// Unwrap a [`KeyHierarchy`] using `passphrase`.
///
/// # Errors
/// Returns [`CryptoError::InvalidPassphrase`] if the passphrase does not
/// match (AEAD tag mismatch).
pub fn unwrap_keys(passphrase: &[u8], wrapped: &WrappedKeys) -> Result<KeyHierarchy, CryptoError> {
    let wrapping_key = derive_wrapping_key(passphrase, &wrapped.salt, wrapped.params)?;
    let cipher = XChaCha20Poly1305::new(Key::from_slice(&wrapping_key));
    let nonce = XNonce::from_slice(&wrapped.nonce);
    let material = cipher
        .decrypt(nonce, wrapped.ciphertext.as_ref())
        .map_err(|_| CryptoError::InvalidPassphrase)?;
    if material.len() != KEY_MATERIAL_LEN {
        return Err(CryptoError::BlockCorrupt("unwrapped key material has wrong length".to_owned()));
    }
    let mut kek = [0u8; 32];
    let mut hmac_key = [0u8; 32];
    kek.copy_from_slice(&material[..32]);
    hmac_key.copy_from_slice(&material[32..]);
    Ok(KeyHierarchy::from_parts(kek, hmac_key))
}

fn derive_wrapping_key(passphrase: &[u8], salt: &[u8; SALT_LEN], params: Argon2Params) -> Result<[u8; 32], CryptoError> {
    let argon2 = params.to_argon2()?;
    let mut key = [0u8; 32];
    argon2
        .hash_password_into(passphrase, salt, &mut key)
        .map_err(|e| CryptoError::BlockCorrupt(format!("Argon2id derivation failed: {e}")))?;
    Ok(key)
}

/// Strength rule (§4.1): at least 8 characters, covering at least 3 of
/// {lowercase, uppercase, digit, symbol}.
///
/// # Errors
/// Returns [`CryptoError::WeakPassphrase`] describing which rule failed.
pub fn check_passphrase_strength(passphrase: &[u8]) -> Result<(), CryptoError> {
    let text = String::from_utf8_lossy(passphrase);
    if text.chars().count() < 8 {
        return Err(CryptoError::WeakPassphrase("must be at least 8 characters".to_owned()));
    }
    let mut classes = 0;
    if text.chars().any(|c| c.is_ascii_lowercase()) {
        classes += 1;
    }
    if text.chars().any(|c| c.is_ascii_uppercase()) {
        classes += 1;
    }
    if text.chars().any(|c| c.is_ascii_digit()) {
        classes += 1;
    }
    if text.chars().any(|c| !c.is_ascii_alphanumeric()) {
        classes += 1;
    }
    if classes < 3 {
        return Err(CryptoError::WeakPassphrase(
            "must contain at least 3 of: lowercase, uppercase, digit, symbol".to_owned(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_then_unwrap_round_trips() {
        let keys = KeyHierarchy::generate();
        let wrapped = wrap_keys(b"Correct-Horse-1", &keys, false).unwrap();
        let unwrapped = unwrap_keys(b"Correct-Horse-1", &wrapped).unwrap();
        assert_eq!(unwrapped.kek(), keys.kek());
        assert_eq!(unwrapped.block_id_hmac_key(), keys.block_id_hmac_key());
    }

    #[test]
    fn wrong_passphrase_is_rejected() {
        let keys = KeyHierarchy::generate();
        let wrapped = wrap_keys(b"Correct-Horse-1", &keys, false).unwrap();
        let err = match unwrap_keys(b"Totally-Wrong-2", &wrapped) {
            Ok(_) => panic!("expected unwrap_keys to fail"),
            Err(e) => e,
        };
        assert!(matches!(err, CryptoError::InvalidPassphrase));
    }

    #[test]
    fn weak_passphrase_rejected_by_default() {
        let keys = KeyHierarchy::generate();
        let err = wrap_keys(b"weak", &keys, false).unwrap_err();
        assert!(matches!(err, CryptoError::WeakPassphrase(_)));
    }

    #[test]
    fn weak_passphrase_allowed_when_opted_in() {
        let keys = KeyHierarchy::generate();
        assert!(wrap_keys(b"weak", &keys, true).is_ok());
    }

    #[test]
    fn strength_rules() {
        assert!(check_passphrase_strength(b"short1A").is_err());
        assert!(check_passphrase_strength(b"alllowercase1").is_err());
        assert!(check_passphrase_strength(b"ALLUPPERCASE1").is_err());
        assert!(check_passphrase_strength(b"Abcdefgh").is_err());
        assert!(check_passphrase_strength(b"Abcdefg1").is_ok());
        assert!(check_passphrase_strength(b"abcdefg!").is_ok());
    }
}
