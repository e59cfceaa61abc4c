//! The immutable `Revision` record and its id (§3).

use std::fmt;

use cling_codec::{ByteReader, ByteWriter, CodecError};
use cling_crypto::BlockId;

/// `SHA-256` of a revision's marshalled bytes. Coincides with the
/// `BlockId` of the metadata block the revision record is stored as —
/// both are the keyless metadata-block hash (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RevisionId(BlockId);

impl RevisionId {
    #[must_use]
    pub fn zero() -> Self {
        Self(BlockId::zero())
    }

    #[must_use]
    pub fn is_root(self) -> bool {
        self.0.is_zero()
    }

    #[must_use]
    pub fn as_block_id(self) -> BlockId {
        self.0
    }

    #[must_use]
    pub fn from_block_id(id: BlockId) -> Self {
        Self(id)
    }

    #[must_use]
    pub fn compute(marshalled: &[u8]) -> Self {
        Self(BlockId::derive_metadata(marshalled))
    }

    #[must_use]
    pub fn to_hex(self) -> String {
        self.0.to_hex()
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision {
    pub timestamp: i64,
    pub author: String,
    pub message: String,
    pub parent: RevisionId,
    pub blocks: Vec<BlockId>,
}

impl Revision {
    #[must_use]
    pub fn marshal(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        w.write_i64(self.timestamp);
        w.write_bytes_u16(self.author.as_bytes());
        w.write_bytes_u32(self.message.as_bytes());
        w.write_raw(self.parent.as_block_id().as_bytes());
        w.write_u32(u32::try_from(self.blocks.len()).expect("block count fits in u32"));
        for id in &self.blocks {
            w.write_raw(id.as_bytes());
        }
        w.into_bytes()
    }

    /// # Errors
    /// Returns [`CodecError`] if `bytes` is truncated or malformed.
    pub fn unmarshal(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut r = ByteReader::new(bytes);
        let timestamp = r.read_i64()?;
        let author =
            String::from_utf8(r.read_bytes_u16(u16::MAX)?.to_vec()).map_err(|_| CodecError::InvalidUtf8)?;
        let message =
            String::from_utf8(r.read_bytes_u32(u32::MAX)?.to_vec()).map_err(|_| CodecError::InvalidUtf8)?;
        let parent = RevisionId::from_block_id(BlockId::from_bytes(r.read_array::<32>()?));
        let count = r.read_u32()?;
        let mut blocks = Vec::with_capacity(count as usize);
        for _ in 0..count {
            blocks.push(BlockId::from_bytes(r.read_array::<32>()?));
        }
        r.expect_exhausted()?;
        Ok(Self { timestamp, author, message, parent, blocks })
    }

    #[must_use]
    pub fn id(&self) -> RevisionId {
        RevisionId::compute(&self.marshal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marshal_round_trips() {
        let rev = Revision {
            timestamp: 123,
            author: "alice".to_string(),
            message: "first commit".to_string(),
            parent: RevisionId::zero(),
            blocks: vec![BlockId::derive_metadata(b"chunk-0")],
        };
        let bytes = rev.marshal();
        let decoded = Revision::unmarshal(&bytes).unwrap();
        assert_eq!(decoded, rev);
    }

    #[test]
    fn id_is_deterministic() {
        let rev = Revision { timestamp: 1, author: String::new(), message: String::new(), parent: RevisionId::zero(), blocks: vec![] };
        assert_eq!(rev.id(), rev.id());
    }

    #[test]
    fn root_id_is_zero() {
        assert!(RevisionId::zero().is_root());
    }
}
