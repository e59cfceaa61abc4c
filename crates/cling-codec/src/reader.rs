use crate::CodecError;

/// Walks a byte slice, decoding little-endian fields in the order they
/// were written by [`crate::ByteWriter`].
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Create a reader positioned at the start of `buf`.
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes consumed so far.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes remaining to be read.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// `true` if every byte in the underlying slice has been consumed.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.pos == self.buf.len()
    }

    /// Fail if any bytes remain unconsumed.
    ///
    /// # Errors
    /// Returns [`CodecError::TrailingBytes`] if the reader is not exhausted.
    pub fn expect_exhausted(&self) -> Result<(), CodecError> {
        if self.is_exhausted() {
            Ok(())
        } else {
            Err(CodecError::TrailingBytes { count: self.remaining() })
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::UnexpectedEof { needed: n, available: self.remaining() });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        let bytes: [u8; 2] = self.take(2)?.try_into().unwrap_or_else(|_| unreachable!());
        Ok(u16::from_le_bytes(bytes))
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        let bytes: [u8; 4] = self.take(4)?.try_into().unwrap_or_else(|_| unreachable!());
        Ok(u32::from_le_bytes(bytes))
    }

    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        let bytes: [u8; 8] = self.take(8)?.try_into().unwrap_or_else(|_| unreachable!());
        Ok(u64::from_le_bytes(bytes))
    }

    pub fn read_i32(&mut self) -> Result<i32, CodecError> {
        let bytes: [u8; 4] = self.take(4)?.try_into().unwrap_or_else(|_| unreachable!());
        Ok(i32::from_le_bytes(bytes))
    }

    pub fn read_i64(&mut self) -> Result<i64, CodecError> {
        let bytes: [u8; 8] = self.take(8)?.try_into().unwrap_or_else(|_| unreachable!());
        Ok(i64::from_le_bytes(bytes))
    }

    /// Read exactly `n` raw bytes.
    pub fn read_raw(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        self.take(n)
    }

    /// Read a fixed-size array (e.g. a 32-byte `BlockId` or hash).
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let slice = self.take(N)?;
        slice.try_into().map_err(|_| CodecError::UnexpectedEof { needed: N, available: slice.len() })
    }

    /// Read a `u16`-length-prefixed byte string, rejecting lengths above `max_len`.
    pub fn read_bytes_u16(&mut self, max_len: u16) -> Result<&'a [u8], CodecError> {
        let len = self.read_u16()?;
        if len > max_len {
            return Err(CodecError::LengthOutOfBounds { length: u64::from(len), bound: u64::from(max_len) });
        }
        self.take(len as usize)
    }

    /// Read a `u32`-length-prefixed byte string, rejecting lengths above `max_len`.
    pub fn read_bytes_u32(&mut self, max_len: u32) -> Result<&'a [u8], CodecError> {
        let len = self.read_u32()?;
        if len > max_len {
            return Err(CodecError::LengthOutOfBounds { length: u64::from(len), bound: u64::from(max_len) });
        }
        self.take(len as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unexpected_eof_reports_shortfall() {
        let mut r = ByteReader::new(&[1, 2]);
        let err = r.read_u32().unwrap_err();
        assert_eq!(err, CodecError::UnexpectedEof { needed: 4, available: 2 });
    }

    #[test]
    fn length_out_of_bounds_is_rejected_before_reading() {
        let mut w = crate::ByteWriter::new();
        w.write_u16(10);
        let bytes = w.into_bytes();
        let mut r = ByteReader::new(&bytes);
        let err = r.read_bytes_u16(4).unwrap_err();
        assert_eq!(err, CodecError::LengthOutOfBounds { length: 10, bound: 4 });
    }

    #[test]
    fn trailing_bytes_detected() {
        let r = ByteReader::new(&[1, 2, 3]);
        assert_eq!(r.expect_exhausted(), Err(CodecError::TrailingBytes { count: 3 }));
    }

    #[test]
    fn reads_fixed_array() {
        let data = [9u8; 32];
        let mut r = ByteReader::new(&data);
        let arr: [u8; 32] = r.read_array().unwrap();
        assert_eq!(arr, data);
        assert!(r.is_exhausted());
    }
}
