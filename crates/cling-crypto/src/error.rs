use thiserror::Error;

/// Errors produced by the cryptographic envelope and key hierarchy.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The supplied passphrase could not unwrap the stored key hierarchy
    /// (AEAD tag mismatch on the wrapping cipher).
    #[error("invalid passphrase")]
    InvalidPassphrase,

    /// A block's header or ciphertext failed authentication or did not
    /// round-trip through the expected wire format.
    #[error("block is corrupt: {0}")]
    BlockCorrupt(String),

    /// The passphrase did not meet the minimum strength rule (§4.1) and
    /// `allow_weak` was not set.
    #[error("passphrase is too weak: {0}")]
    WeakPassphrase(String),

    /// A recovery code failed its per-group checksum or was malformed.
    #[error("invalid recovery code: {0}")]
    InvalidRecoveryCode(String),

    /// The underlying binary codec failed to decode a header or key file.
    #[error("codec error: {0}")]
    Codec(#[from] cling_codec::CodecError),
}
