//! Little-endian binary codec shared by the block header, control files,
//! and revision entry stream formats.
//!
//! [`ByteWriter`] appends fixed-width little-endian fields and
//! length-prefixed byte strings to an in-memory buffer. [`ByteReader`]
//! walks a byte slice in the same order, returning a [`CodecError`] on
//! truncation or an out-of-range length prefix. [`ErrorAccumulator`]
//! lets a caller decode several independent fields of a record and report
//! every failure at once instead of aborting at the first one — useful
//! for the health checker, which wants to know about every malformed
//! field in a block rather than just the first.

mod reader;
mod writer;

pub use reader::ByteReader;
pub use writer::ByteWriter;

use thiserror::Error;

/// Errors produced while decoding a byte stream with [`ByteReader`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// The reader ran out of bytes before the requested field could be read.
    #[error("unexpected end of input: needed {needed} bytes, {available} remaining")]
    UnexpectedEof {
        /// Bytes required to satisfy the read.
        needed: usize,
        /// Bytes actually left in the buffer.
        available: usize,
    },

    /// A length prefix described a byte string longer than the remaining input
    /// or longer than a caller-supplied sanity bound.
    #[error("length {length} exceeds bound {bound}")]
    LengthOutOfBounds {
        /// The length prefix read from the stream.
        length: u64,
        /// The maximum permitted length.
        bound: u64,
    },

    /// Bytes remained in the input after the expected fields were consumed.
    #[error("{count} trailing byte(s) after decoding")]
    TrailingBytes {
        /// Number of unconsumed bytes.
        count: usize,
    },

    /// A tag byte did not match any known variant.
    #[error("unknown tag byte {tag}")]
    UnknownTag {
        /// The unrecognized tag value.
        tag: u8,
    },

    /// A length-prefixed byte string was not valid UTF-8 where text was expected.
    #[error("field is not valid UTF-8")]
    InvalidUtf8,

    /// Several independent decode failures were collected by an
    /// [`ErrorAccumulator`] and are reported together.
    #[error("{} decode error(s): {}", .0.len(), join_errors(.0))]
    Multiple(Vec<CodecError>),
}

fn join_errors(errors: &[CodecError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

impl CodecError {
    /// Number of underlying errors this value represents (1 unless it's
    /// a [`CodecError::Multiple`]).
    #[must_use]
    pub fn count(&self) -> usize {
        match self {
            Self::Multiple(errs) => errs.len(),
            _ => 1,
        }
    }
}

/// Accumulates decode errors across several independent fields so a caller
/// can report all of them instead of bailing out on the first.
///
/// Used by the health checker (§4.10) when validating a revision entry's
/// fields: a malformed `mtime` shouldn't prevent also reporting a
/// malformed `block_ids_count` in the same entry.
#[derive(Debug, Default)]
pub struct ErrorAccumulator {
    errors: Vec<CodecError>,
}

impl ErrorAccumulator {
    /// Create an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a fallible decode step, recording the error (if any) and
    /// returning `Some(value)` on success or `None` on failure.
    pub fn try_or_record<T>(&mut self, result: Result<T, CodecError>) -> Option<T> {
        match result {
            Ok(v) => Some(v),
            Err(e) => {
                self.errors.push(e);
                None
            }
        }
    }

    /// Record an error directly.
    pub fn record(&mut self, error: CodecError) {
        self.errors.push(error);
    }

    /// Consume the accumulator, returning `Ok(())` if nothing was recorded
    /// or `Err(CodecError::Multiple(..))` otherwise.
    pub fn finish(self) -> Result<(), CodecError> {
        if self.errors.is_empty() {
            Ok(())
        } else if self.errors.len() == 1 {
            Err(self.errors.into_iter().next().unwrap_or_else(|| unreachable!()))
        } else {
            Err(CodecError::Multiple(self.errors))
        }
    }

    /// Number of errors recorded so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// `true` if no errors have been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulator_collects_multiple_errors() {
        let mut acc = ErrorAccumulator::new();
        acc.record(CodecError::UnknownTag { tag: 9 });
        acc.record(CodecError::TrailingBytes { count: 3 });
        let err = acc.finish().unwrap_err();
        match err {
            CodecError::Multiple(errs) => assert_eq!(errs.len(), 2),
            other => panic!("expected Multiple, got {other:?}"),
        }
    }

    #[test]
    fn accumulator_single_error_is_not_wrapped() {
        let mut acc = ErrorAccumulator::new();
        acc.record(CodecError::TrailingBytes { count: 1 });
        let err = acc.finish().unwrap_err();
        assert!(matches!(err, CodecError::TrailingBytes { count: 1 }));
    }

    #[test]
    fn accumulator_empty_is_ok() {
        let acc = ErrorAccumulator::new();
        assert!(acc.finish().is_ok());
    }

    #[test]
    fn error_count_reflects_nesting() {
        let multi = CodecError::Multiple(vec![
            CodecError::TrailingBytes { count: 1 },
            CodecError::UnknownTag { tag: 1 },
        ]);
        assert_eq!(multi.count(), 2);
        assert_eq!(CodecError::TrailingBytes { count: 1 }.count(), 1);
    }
}
