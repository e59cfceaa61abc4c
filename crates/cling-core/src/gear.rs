//! Gear content-defined chunker (§4.4, component 6).
//!
//! Chunk boundaries depend on a rolling hash of the last handful of bytes,
//! so inserting or deleting bytes in the middle of a file only re-chunks
//! the area around the edit — the rest of the file's chunks, and their
//! `BlockId`s, stay identical and keep deduplicating against the store.
//!
//! The 256-entry gear table is derived at first use from a fixed seed via
//! splitmix64, rather than hand-inlining 256 literals. The seed is the
//! part of this that must never change — changing it reshuffles every
//! chunk boundary in every repository ever written.

use std::io::{self, Read};
use std::sync::OnceLock;

use cling_crypto::MAX_BLOCK_DATA_SIZE;

const TABLE_SEED: u64 = 0x9E37_79B9_7F4A_7C15;

fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn gear_table() -> &'static [u64; 256] {
    static TABLE: OnceLock<[u64; 256]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut state = TABLE_SEED;
        let mut table = [0u64; 256];
        for slot in &mut table {
            *slot = splitmix64(&mut state);
        }
        table
    })
}

#[derive(Debug, Clone, Copy)]
pub struct GearChunker {
    min_size: usize,
    max_size: usize,
    mask: u64,
}

impl Default for GearChunker {
    fn default() -> Self {
        Self::new(MAX_BLOCK_DATA_SIZE / 4, MAX_BLOCK_DATA_SIZE, (1 << 21) - 1)
    }
}

impl GearChunker {
    #[must_use]
    pub fn new(min_size: usize, max_size: usize, mask: u64) -> Self {
        Self { min_size, max_size, mask }
    }

    /// Split an in-memory buffer into content-defined chunks.
    #[must_use]
    pub fn chunks<'a>(&self, data: &'a [u8]) -> Vec<&'a [u8]> {
        let mut out = Vec::new();
        let mut start = 0usize;
        let mut hash: u64 = 0;
        let table = gear_table();
        for (i, &byte) in data.iter().enumerate() {
            hash = (hash << 1) ^ table[byte as usize];
            let len = i - start + 1;
            if len == self.max_size || (len >= self.min_size && (hash & self.mask) == 0) {
                out.push(&data[start..=i]);
                start = i + 1;
                hash = 0;
            }
        }
        if start < data.len() {
            out.push(&data[start..]);
        }
        out
    }

    /// Split a streamed reader into content-defined chunks without
    /// requiring the whole input in memory at once.
    ///
    /// # Errors
    /// Propagates any I/O error from `reader`.
    pub fn chunk_stream<R: Read>(&self, mut reader: R) -> io::Result<Vec<Vec<u8>>> {
        let table = gear_table();
        let mut chunks = Vec::new();
        let mut current = Vec::with_capacity(self.max_size.min(1 << 20));
        let mut hash: u64 = 0;
        let mut buf = [0u8; 8192];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            for &byte in &buf[..n] {
                current.push(byte);
                hash = (hash << 1) ^ table[byte as usize];
                if current.len() == self.max_size {
                    chunks.push(std::mem::take(&mut current));
                    hash = 0;
                } else if current.len() >= self.min_size && (hash & self.mask) == 0 {
                    chunks.push(std::mem::take(&mut current));
                    hash = 0;
                }
            }
        }
        if !current.is_empty() {
            chunks.push(current);
        }
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{RngCore, SeedableRng};
    use rand::rngs::StdRng;

    fn random_bytes(len: usize, seed: u64) -> Vec<u8> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut buf = vec![0u8; len];
        rng.fill_bytes(&mut buf);
        buf
    }

    #[test]
    fn chunking_is_deterministic() {
        let data = random_bytes(3_000_000, 1);
        let chunker = GearChunker::default();
        let a: Vec<Vec<u8>> = chunker.chunks(&data).into_iter().map(<[u8]>::to_vec).collect();
        let b: Vec<Vec<u8>> = chunker.chunks(&data).into_iter().map(<[u8]>::to_vec).collect();
        assert_eq!(a, b);
        assert!(a.len() > 1);
    }

    #[test]
    fn no_chunk_exceeds_max_size() {
        let data = random_bytes(5_000_000, 2);
        let chunker = GearChunker::default();
        for chunk in chunker.chunks(&data) {
            assert!(chunk.len() <= MAX_BLOCK_DATA_SIZE);
        }
    }

    #[test]
    fn reassembled_chunks_equal_the_input() {
        let data = random_bytes(1_000_000, 3);
        let chunker = GearChunker::default();
        let joined: Vec<u8> = chunker.chunks(&data).into_iter().flatten().copied().collect();
        assert_eq!(joined, data);
    }

    #[test]
    fn editing_the_middle_only_disturbs_nearby_chunks() {
        let base = random_bytes(4_000_000, 7);
        let chunker = GearChunker::new(4096, 65536, (1 << 13) - 1);
        let base_chunks: Vec<&[u8]> = chunker.chunks(&base);

        let mut edited = base.clone();
        let insert_at = 2_000_000;
        let insertion = random_bytes(50, 99);
        edited.splice(insert_at..insert_at, insertion);
        let edited_chunks: Vec<&[u8]> = chunker.chunks(&edited);

        let prefix_matches = base_chunks.iter().zip(edited_chunks.iter()).take_while(|(a, b)| a == b).count();
        assert!(prefix_matches > 0, "identical prefix should produce identical leading chunks");
        assert!(prefix_matches < base_chunks.len(), "the edit should still be visible somewhere");
    }

    #[test]
    fn chunk_stream_matches_in_memory_chunking() {
        let data = random_bytes(2_000_000, 11);
        let chunker = GearChunker::default();
        let in_memory: Vec<Vec<u8>> = chunker.chunks(&data).into_iter().map(<[u8]>::to_vec).collect();
        let streamed = chunker.chunk_stream(&data[..]).unwrap();
        assert_eq!(in_memory, streamed);
    }
}
