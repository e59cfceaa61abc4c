use std::convert::TryFrom;

/// Appends little-endian fields to an in-memory buffer.
///
/// `ByteWriter` never fails: callers that need bounded sizes (e.g. a
/// `u16` length prefix) are expected to validate the length before
/// calling the corresponding `write_*_lp` method, which panics on
/// overflow — a caller violating that contract is a programming error,
/// not a recoverable I/O condition.
#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    /// Create an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Create an empty writer with a pre-allocated capacity.
    #[must_use]
    pub fn with_capacity(cap: usize) -> Self {
        Self { buf: Vec::with_capacity(cap) }
    }

    /// Current length of the buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// `true` if nothing has been written yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Consume the writer, returning the accumulated bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Borrow the accumulated bytes without consuming the writer.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn write_u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn write_u16(&mut self, v: u16) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn write_u32(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn write_u64(&mut self, v: u64) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn write_i32(&mut self, v: i32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn write_i64(&mut self, v: i64) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    /// Append raw bytes with no length prefix.
    pub fn write_raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Append a byte string prefixed with its length as a `u16`.
    ///
    /// # Panics
    /// Panics if `bytes.len()` does not fit in a `u16`. Callers of this
    /// codec (paths, symlink targets) are expected to validate lengths
    /// upstream; see `cling_core::path::Path`.
    pub fn write_bytes_u16(&mut self, bytes: &[u8]) -> &mut Self {
        let len = u16::try_from(bytes.len()).expect("byte string exceeds u16::MAX");
        self.write_u16(len);
        self.write_raw(bytes)
    }

    /// Append a byte string prefixed with its length as a `u32`.
    ///
    /// # Panics
    /// Panics if `bytes.len()` does not fit in a `u32`.
    pub fn write_bytes_u32(&mut self, bytes: &[u8]) -> &mut Self {
        let len = u32::try_from(bytes.len()).expect("byte string exceeds u32::MAX");
        self.write_u32(len);
        self.write_raw(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ByteReader;

    #[test]
    fn round_trips_scalar_fields() {
        let mut w = ByteWriter::new();
        w.write_u8(7).write_u16(300).write_u32(70_000).write_u64(1 << 40).write_i32(-5).write_i64(-1);
        let bytes = w.into_bytes();
        let mut r = ByteReader::new(&bytes);
        assert_eq!(r.read_u8().unwrap(), 7);
        assert_eq!(r.read_u16().unwrap(), 300);
        assert_eq!(r.read_u32().unwrap(), 70_000);
        assert_eq!(r.read_u64().unwrap(), 1 << 40);
        assert_eq!(r.read_i32().unwrap(), -5);
        assert_eq!(r.read_i64().unwrap(), -1);
        assert!(r.is_exhausted());
    }

    #[test]
    fn round_trips_length_prefixed_bytes() {
        let mut w = ByteWriter::new();
        w.write_bytes_u16(b"hello").write_bytes_u32(b"world");
        let bytes = w.into_bytes();
        let mut r = ByteReader::new(&bytes);
        assert_eq!(r.read_bytes_u16(1024).unwrap(), b"hello");
        assert_eq!(r.read_bytes_u32(1024).unwrap(), b"world");
    }

    #[test]
    #[should_panic(expected = "u16::MAX")]
    fn write_bytes_u16_panics_on_overflow() {
        let mut w = ByteWriter::new();
        let huge = vec![0u8; u16::MAX as usize + 1];
        w.write_bytes_u16(&huge);
    }
}
