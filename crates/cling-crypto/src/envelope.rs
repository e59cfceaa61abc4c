//! The per-block cryptographic envelope (§4.1, §6 "Block file format").
//!
//! Each block is sealed under a fresh, random data-encryption key (DEK),
//! which is itself wrapped under the repository's KEK. The wire format is:
//!
//! ```text
//! EncryptedDEK(72) | BlockId(32) | Flags(2, LE u16) | EncryptedDataSize(4, LE u32) | ciphertext...
//! ```
//!
//! `ciphertext` is `nonce(24) || AEAD(plaintext-or-deflated)(includes a
//! 16-byte tag)`. `EncryptedDataSize` is the length of that combined blob,
//! so `HEADER_LEN + EncryptedDataSize` is the total on-disk block size.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use cling_codec::{ByteReader, ByteWriter, CodecError};
use rand::RngCore;
use std::io::{Read, Write};

use crate::error::CryptoError;
use crate::ids::{BlockId, BLOCK_ID_LEN};

/// Nonce length for the per-block data AEAD.
pub const DATA_NONCE_LEN: usize = 24;
/// AEAD authentication tag length.
pub const AEAD_TAG_LEN: usize = 16;
/// Wrapped-DEK length: nonce(24) + key(32) + tag(16).
pub const WRAPPED_DEK_LEN: usize = 24 + 32 + 16;
/// Length of the `Flags` field.
pub const FLAGS_LEN: usize = 2;
/// Length of the `EncryptedDataSize` field.
pub const SIZE_LEN: usize = 4;
/// Total fixed-size header length preceding the ciphertext.
pub const HEADER_LEN: usize = WRAPPED_DEK_LEN + BLOCK_ID_LEN + FLAGS_LEN + SIZE_LEN;
/// Overhead imposed on the ciphertext region itself (nonce + tag).
pub const DATA_OVERHEAD: usize = DATA_NONCE_LEN + AEAD_TAG_LEN;
/// Hard cap on a block's on-disk footprint, matching spec.md's 4 MiB bound.
pub const MAX_BLOCK_SIZE: usize = 4 * 1024 * 1024;
/// Maximum plaintext payload a single block may carry.
pub const MAX_BLOCK_DATA_SIZE: usize = MAX_BLOCK_SIZE - HEADER_LEN - DATA_OVERHEAD;

/// Bit flags recorded in a block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockFlags(u16);

impl BlockFlags {
    /// Payload was deflate-compressed before encryption.
    pub const DEFLATE: Self = Self(1);

    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn bits(self) -> u16 {
        self.0
    }

    #[must_use]
    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

/// The fixed-size prefix of an on-disk block.
#[derive(Debug, Clone)]
pub struct BlockHeader {
    /// The DEK, wrapped under the repository KEK.
    pub encrypted_dek: [u8; WRAPPED_DEK_LEN],
    /// The block's content-derived id.
    pub block_id: BlockId,
    /// Compression and future extension bits.
    pub flags: BlockFlags,
    /// Length of the ciphertext region that follows the header.
    pub encrypted_data_size: u32,
}

impl BlockHeader {
    /// Serialize the header to its wire form.
    #[must_use]
    pub fn write(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(HEADER_LEN);
        w.write_raw(&self.encrypted_dek);
        w.write_raw(self.block_id.as_bytes());
        w.write_u16(self.flags.bits());
        w.write_u32(self.encrypted_data_size);
        w.into_bytes()
    }

    /// Parse a header from exactly [`HEADER_LEN`] bytes.
    ///
    /// # Errors
    /// Returns a [`CodecError`] if `bytes` is shorter than [`HEADER_LEN`].
    pub fn read(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut r = ByteReader::new(bytes);
        let encrypted_dek: [u8; WRAPPED_DEK_LEN] = r.read_array()?;
        let block_id = BlockId::from_bytes(r.read_array()?);
        let flags = BlockFlags::from_bits(r.read_u16()?);
        let encrypted_data_size = r.read_u32()?;
        Ok(Self { encrypted_dek, block_id, flags, encrypted_data_size })
    }
}

/// A sealed block: header plus the ciphertext region.
#[derive(Debug, Clone)]
pub struct SealedBlock {
    pub header: BlockHeader,
    pub ciphertext: Vec<u8>,
}

impl SealedBlock {
    /// Concatenate header and ciphertext into the on-disk representation.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        let mut bytes = self.header.write();
        bytes.extend_from_slice(&self.ciphertext);
        bytes
    }
}

/// Encrypt `plaintext` under a fresh DEK wrapped by `kek`, optionally
/// deflating first if that shrinks the payload.
///
/// # Errors
/// Returns [`CryptoError::BlockCorrupt`] only on internal AEAD failure,
/// which should not happen given valid inputs.
pub fn seal(block_id: BlockId, plaintext: &[u8], kek: &[u8; 32], try_compress: bool) -> Result<SealedBlock, CryptoError> {
    let (flags, payload) = if try_compress {
        let compressed = deflate(plaintext);
        if compressed.len() < plaintext.len() {
            (BlockFlags::DEFLATE, compressed)
        } else {
            (BlockFlags::empty(), plaintext.to_vec())
        }
    } else {
        (BlockFlags::empty(), plaintext.to_vec())
    };

    let mut dek = [0u8; 32];
    rand::rng().fill_bytes(&mut dek);

    let mut data_nonce_bytes = [0u8; DATA_NONCE_LEN];
    rand::rng().fill_bytes(&mut data_nonce_bytes);
    let data_cipher = XChaCha20Poly1305::new(Key::from_slice(&dek));
    let sealed_payload = data_cipher
        .encrypt(XNonce::from_slice(&data_nonce_bytes), payload.as_slice())
        .map_err(|_| CryptoError::BlockCorrupt("data encryption failed".to_owned()))?;
    let mut ciphertext = Vec::with_capacity(DATA_NONCE_LEN + sealed_payload.len());
    ciphertext.extend_from_slice(&data_nonce_bytes);
    ciphertext.extend_from_slice(&sealed_payload);

    let mut wrap_nonce_bytes = [0u8; DATA_NONCE_LEN];
    rand::rng().fill_bytes(&mut wrap_nonce_bytes);
    let wrap_cipher = XChaCha20Poly1305::new(Key::from_slice(kek));
    let wrapped_dek_ct = wrap_cipher
        .encrypt(XNonce::from_slice(&wrap_nonce_bytes), dek.as_slice())
        .map_err(|_| CryptoError::BlockCorrupt("DEK wrap failed".to_owned()))?;
    let mut encrypted_dek = [0u8; WRAPPED_DEK_LEN];
    encrypted_dek[..DATA_NONCE_LEN].copy_from_slice(&wrap_nonce_bytes);
    encrypted_dek[DATA_NONCE_LEN..].copy_from_slice(&wrapped_dek_ct);

    let encrypted_data_size = u32::try_from(ciphertext.len())
        .map_err(|_| CryptoError::BlockCorrupt("block payload too large".to_owned()))?;

    Ok(SealedBlock {
        header: BlockHeader { encrypted_dek, block_id, flags, encrypted_data_size },
        ciphertext,
    })
}

/// Decrypt a sealed block, verifying that its header's `block_id` matches
/// `expected_id` and that the plaintext re-derives the same id.
///
/// # Errors
/// Returns [`CryptoError::BlockCorrupt`] on any AEAD failure, header/id
/// mismatch, or malformed ciphertext framing.
pub fn open(header: &BlockHeader, ciphertext: &[u8], kek: &[u8; 32], expected_id: BlockId) -> Result<Vec<u8>, CryptoError> {
    if header.block_id != expected_id {
        return Err(CryptoError::BlockCorrupt("header block id does not match requested id".to_owned()));
    }
    if ciphertext.len() < DATA_NONCE_LEN {
        return Err(CryptoError::BlockCorrupt("ciphertext shorter than nonce".to_owned()));
    }

    let (wrap_nonce, wrapped_dek_ct) = header.encrypted_dek.split_at(DATA_NONCE_LEN);
    let wrap_cipher = XChaCha20Poly1305::new(Key::from_slice(kek));
    let dek = wrap_cipher
        .decrypt(XNonce::from_slice(wrap_nonce), wrapped_dek_ct)
        .map_err(|_| CryptoError::BlockCorrupt("DEK unwrap failed (wrong key or corrupt header)".to_owned()))?;

    let (data_nonce, data_ct) = ciphertext.split_at(DATA_NONCE_LEN);
    let data_cipher = XChaCha20Poly1305::new(Key::from_slice(&dek));
    let payload = data_cipher
        .decrypt(XNonce::from_slice(data_nonce), data_ct)
        .map_err(|_| CryptoError::BlockCorrupt("block data decryption failed".to_owned()))?;

    let plaintext = if header.flags.contains(BlockFlags::DEFLATE) {
        inflate(&payload).map_err(|e| CryptoError::BlockCorrupt(format!("deflate stream corrupt: {e}")))?
    } else {
        payload
    };

    // Re-deriving and comparing the BlockId against plaintext is the
    // caller's job (Repository::read_block) since it depends on whether
    // this is a data block (HMAC-keyed) or metadata block (keyless SHA-256).
    Ok(plaintext)
}

fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).expect("writing to an in-memory buffer cannot fail");
    encoder.finish().expect("finishing an in-memory buffer cannot fail")
}

fn inflate(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = flate2::read::DeflateDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_then_open_round_trips() {
        let kek = [3u8; 32];
        let plaintext = b"the quick brown fox jumps over the lazy dog";
        let id = BlockId::derive_metadata(plaintext);
        let sealed = seal(id, plaintext, &kek, false).unwrap();
        let opened = open(&sealed.header, &sealed.ciphertext, &kek, id).unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn seal_compresses_when_beneficial() {
        let kek = [3u8; 32];
        let plaintext = vec![b'a'; 10_000];
        let id = BlockId::derive_metadata(&plaintext);
        let sealed = seal(id, &plaintext, &kek, true).unwrap();
        assert!(sealed.header.flags.contains(BlockFlags::DEFLATE));
        let opened = open(&sealed.header, &sealed.ciphertext, &kek, id).unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn seal_skips_compression_for_incompressible_flag() {
        let kek = [3u8; 32];
        // Already-compressed-looking random-ish data: deflate would not help.
        let plaintext: Vec<u8> = (0..256).map(|i| (i * 97 % 256) as u8).collect();
        let id = BlockId::derive_metadata(&plaintext);
        let sealed = seal(id, &plaintext, &kek, true).unwrap();
        let opened = open(&sealed.header, &sealed.ciphertext, &kek, id).unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn wrong_kek_fails_to_open() {
        let kek = [3u8; 32];
        let other_kek = [9u8; 32];
        let plaintext = b"secret";
        let id = BlockId::derive_metadata(plaintext);
        let sealed = seal(id, plaintext, &kek, false).unwrap();
        let err = open(&sealed.header, &sealed.ciphertext, &other_kek, id).unwrap_err();
        assert!(matches!(err, CryptoError::BlockCorrupt(_)));
    }

    #[test]
    fn tampered_ciphertext_fails_to_open() {
        let kek = [3u8; 32];
        let plaintext = b"secret";
        let id = BlockId::derive_metadata(plaintext);
        let mut sealed = seal(id, plaintext, &kek, false).unwrap();
        let last = sealed.ciphertext.len() - 1;
        sealed.ciphertext[last] ^= 0xFF;
        assert!(open(&sealed.header, &sealed.ciphertext, &kek, id).is_err());
    }

    #[test]
    fn header_round_trips_through_wire_bytes() {
        let kek = [3u8; 32];
        let plaintext = b"header round trip";
        let id = BlockId::derive_metadata(plaintext);
        let sealed = seal(id, plaintext, &kek, false).unwrap();
        let bytes = sealed.header.write();
        assert_eq!(bytes.len(), HEADER_LEN);
        let parsed = BlockHeader::read(&bytes).unwrap();
        assert_eq!(parsed.block_id, id);
        assert_eq!(parsed.encrypted_data_size, sealed.header.encrypted_data_size);
    }

    #[test]
    fn header_mismatch_is_rejected() {
        let kek = [3u8; 32];
        let plaintext = b"secret";
        let id = BlockId::derive_metadata(plaintext);
        let other_id = BlockId::derive_metadata(b"other");
        let sealed = seal(id, plaintext, &kek, false).unwrap();
        assert!(open(&sealed.header, &sealed.ciphertext, &kek, other_id).is_err());
    }
}
