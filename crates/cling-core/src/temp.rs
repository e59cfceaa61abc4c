//! External-sort temp pipeline (§4.5, component 7).
//!
//! A revision's entry stream doesn't fit in memory. [`TempWriter`] buffers
//! entries up to a byte budget, sorts and flushes each buffer as a chunk
//! file, then [`TempWriter::finalize`] k-way merges every chunk into a
//! final, duplicate-free, globally sorted chunk set. Each final chunk's
//! raw bytes are exactly the marshalled-entry concatenation described in
//! §6 — that's what lets a chunk become a metadata block with no further
//! framing.
//!
//! [`Temp`] is the read side: stream every entry in order, or fetch one
//! chunk's raw bytes to hand straight to the block writer. [`TempCache`]
//! adds a point-lookup by key on top, backed by a small LRU of decoded
//! chunks plus an in-memory index of each chunk's first/last key.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::fs;
use std::path::PathBuf;

use cling_codec::{ByteReader, ByteWriter, CodecError};
use tempfile::TempDir;

/// An entry type that can live in a temp pipeline: marshalled to/from
/// bytes, sized for buffer budgeting, and ordered by a sort key distinct
/// from `Ord` (so callers can order by path while still deriving `Eq`).
pub trait TempEntry: Sized + Clone {
    type Key: Ord + Clone;

    fn marshal(&self, w: &mut ByteWriter);
    fn unmarshal(r: &mut ByteReader<'_>) -> Result<Self, CodecError>;
    fn marshalled_size(&self) -> usize;
    fn key(&self) -> Self::Key;
}

#[derive(Debug, thiserror::Error)]
pub enum TempError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("duplicate entry in sorted stream")]
    DuplicateEntry,
    #[error("chunk index {index} out of bounds ({count} chunks)")]
    ChunkOutOfBounds { index: usize, count: usize },
}

impl TempError {
    fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}

fn marshal_all<E: TempEntry>(entries: &[E]) -> Vec<u8> {
    let mut w = ByteWriter::new();
    for e in entries {
        e.marshal(&mut w);
    }
    w.into_bytes()
}

fn unmarshal_all<E: TempEntry>(bytes: &[u8]) -> Result<Vec<E>, CodecError> {
    let mut r = ByteReader::new(bytes);
    let mut out = Vec::new();
    while !r.is_exhausted() {
        out.push(E::unmarshal(&mut r)?);
    }
    Ok(out)
}

#[derive(Debug, Clone)]
struct ChunkInfo<K> {
    path: PathBuf,
    first_key: K,
    last_key: K,
}

/// Default in-memory budget for one chunk before it's flushed to disk.
pub const DEFAULT_CHUNK_BYTES: usize = 4 * 1024 * 1024;

pub struct TempWriter<E: TempEntry> {
    dir: TempDir,
    chunk_bytes: usize,
    buffer: Vec<E>,
    buffer_size: usize,
    chunk_paths: Vec<PathBuf>,
    next_chunk_id: usize,
}

impl<E: TempEntry> TempWriter<E> {
    /// Create a writer with its own disposable temp directory.
    ///
    /// # Errors
    /// Returns [`TempError::Io`] if the directory can't be created.
    pub fn new(chunk_bytes: usize) -> Result<Self, TempError> {
        let dir = tempfile::tempdir().map_err(|e| TempError::io("<tempdir>", e))?;
        Ok(Self { dir, chunk_bytes, buffer: Vec::new(), buffer_size: 0, chunk_paths: Vec::new(), next_chunk_id: 0 })
    }

    /// Buffer one entry, flushing the current chunk to disk first if this
    /// entry would exceed the byte budget.
    ///
    /// # Errors
    /// Returns [`TempError::Io`] if flushing a full chunk fails.
    pub fn add(&mut self, entry: E) -> Result<(), TempError> {
        let size = entry.marshalled_size();
        if !self.buffer.is_empty() && self.buffer_size + size > self.chunk_bytes {
            self.flush_chunk()?;
        }
        self.buffer_size += size;
        self.buffer.push(entry);
        Ok(())
    }

    fn flush_chunk(&mut self) -> Result<(), TempError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let mut chunk = std::mem::take(&mut self.buffer);
        self.buffer_size = 0;
        chunk.sort_by(|a, b| a.key().cmp(&b.key()));
        let path = self.dir.path().join(format!("chunk-{:08}.bin", self.next_chunk_id));
        self.next_chunk_id += 1;
        fs::write(&path, marshal_all(&chunk)).map_err(|e| TempError::io(path.display().to_string(), e))?;
        self.chunk_paths.push(path);
        Ok(())
    }

    /// Flush any buffered entries, then k-way merge every chunk into a
    /// final duplicate-free, globally sorted chunk set.
    ///
    /// # Errors
    /// [`TempError::DuplicateEntry`] if two entries share a key; otherwise
    /// propagates I/O or codec errors encountered while merging.
    pub fn finalize(mut self) -> Result<Temp<E>, TempError> {
        self.flush_chunk()?;
        merge_chunks(self.dir, &self.chunk_paths, self.chunk_bytes)
    }
}

struct HeapItem<E: TempEntry> {
    entry: E,
    source: usize,
}

impl<E: TempEntry> PartialEq for HeapItem<E> {
    fn eq(&self, other: &Self) -> bool {
        self.entry.key() == other.entry.key()
    }
}
impl<E: TempEntry> Eq for HeapItem<E> {}
impl<E: TempEntry> PartialOrd for HeapItem<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl<E: TempEntry> Ord for HeapItem<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse so BinaryHeap (a max-heap) pops the smallest key first.
        other.entry.key().cmp(&self.entry.key())
    }
}

fn merge_chunks<E: TempEntry>(dir: TempDir, chunk_paths: &[PathBuf], chunk_bytes: usize) -> Result<Temp<E>, TempError> {
    let mut sources: Vec<VecDeque<E>> = Vec::with_capacity(chunk_paths.len());
    for path in chunk_paths {
        let bytes = fs::read(path).map_err(|e| TempError::io(path.display().to_string(), e))?;
        sources.push(unmarshal_all::<E>(&bytes)?.into());
    }

    let mut heap: BinaryHeap<HeapItem<E>> = BinaryHeap::new();
    for (i, source) in sources.iter_mut().enumerate() {
        if let Some(entry) = source.pop_front() {
            heap.push(HeapItem { entry, source: i });
        }
    }

    let mut out_chunks: Vec<ChunkInfo<E::Key>> = Vec::new();
    let mut out_buf: Vec<E> = Vec::new();
    let mut out_size = 0usize;
    let mut last_key: Option<E::Key> = None;
    let mut out_chunk_id = 0usize;

    while let Some(HeapItem { entry, source }) = heap.pop() {
        if let Some(next) = sources[source].pop_front() {
            heap.push(HeapItem { entry: next, source });
        }
        let key = entry.key();
        if let Some(prev) = &last_key {
            match key.cmp(prev) {
                Ordering::Equal => return Err(TempError::DuplicateEntry),
                Ordering::Less => unreachable!("heap yields keys in non-decreasing order"),
                Ordering::Greater => {}
            }
        }
        let size = entry.marshalled_size();
        if !out_buf.is_empty() && out_size + size > chunk_bytes {
            flush_merged_chunk(&dir, &mut out_chunks, &mut out_buf, &mut out_chunk_id)?;
            out_size = 0;
        }
        out_size += size;
        last_key = Some(key);
        out_buf.push(entry);
    }
    flush_merged_chunk(&dir, &mut out_chunks, &mut out_buf, &mut out_chunk_id)?;

    Ok(Temp { _dir: dir, chunks: out_chunks })
}

fn flush_merged_chunk<E: TempEntry>(
    dir: &TempDir,
    out_chunks: &mut Vec<ChunkInfo<E::Key>>,
    buf: &mut Vec<E>,
    next_id: &mut usize,
) -> Result<(), TempError> {
    if buf.is_empty() {
        return Ok(());
    }
    let chunk = std::mem::take(buf);
    let first_key = chunk[0].key();
    let last_key = chunk[chunk.len() - 1].key();
    let path = dir.path().join(format!("final-{:08}.bin", *next_id));
    *next_id += 1;
    fs::write(&path, marshal_all(&chunk)).map_err(|e| TempError::io(path.display().to_string(), e))?;
    out_chunks.push(ChunkInfo { path, first_key, last_key });
    Ok(())
}

/// The finalized, sorted, duplicate-free result of a [`TempWriter`].
pub struct Temp<E: TempEntry> {
    _dir: TempDir,
    chunks: Vec<ChunkInfo<E::Key>>,
}

impl<E: TempEntry> Temp<E> {
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    fn load_chunk(&self, index: usize) -> Result<Vec<E>, TempError> {
        let info = self.chunks.get(index).ok_or(TempError::ChunkOutOfBounds { index, count: self.chunks.len() })?;
        let bytes = fs::read(&info.path).map_err(|e| TempError::io(info.path.display().to_string(), e))?;
        Ok(unmarshal_all(&bytes)?)
    }

    /// Raw marshalled bytes of chunk `index` — exactly what's written as
    /// one metadata block.
    ///
    /// # Errors
    /// [`TempError::ChunkOutOfBounds`] if `index` is out of range.
    pub fn read_chunk_raw(&self, index: usize) -> Result<Vec<u8>, TempError> {
        let info = self.chunks.get(index).ok_or(TempError::ChunkOutOfBounds { index, count: self.chunks.len() })?;
        fs::read(&info.path).map_err(|e| TempError::io(info.path.display().to_string(), e))
    }

    /// Iterate every entry in sorted order, optionally skipping entries
    /// that fail `filter`.
    pub fn reader<'a>(&'a self, filter: Option<Box<dyn Fn(&E) -> bool + 'a>>) -> TempReader<'a, E> {
        TempReader { temp: self, chunk_index: 0, current: Vec::new().into_iter(), filter }
    }

    fn find_chunk(&self, key: &E::Key) -> Option<usize> {
        let idx = self.chunks.partition_point(|c| &c.last_key < key);
        if idx < self.chunks.len() && &self.chunks[idx].first_key <= key {
            Some(idx)
        } else {
            None
        }
    }
}

pub struct TempReader<'a, E: TempEntry> {
    temp: &'a Temp<E>,
    chunk_index: usize,
    current: std::vec::IntoIter<E>,
    filter: Option<Box<dyn Fn(&E) -> bool + 'a>>,
}

impl<E: TempEntry> Iterator for TempReader<'_, E> {
    type Item = Result<E, TempError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.current.next() {
                Some(e) => {
                    if self.filter.as_ref().is_none_or(|f| f(&e)) {
                        return Some(Ok(e));
                    }
                }
                None => {
                    if self.chunk_index >= self.temp.chunk_count() {
                        return None;
                    }
                    match self.temp.load_chunk(self.chunk_index) {
                        Ok(chunk) => {
                            self.chunk_index += 1;
                            self.current = chunk.into_iter();
                        }
                        Err(e) => {
                            self.chunk_index = self.temp.chunk_count();
                            return Some(Err(e));
                        }
                    }
                }
            }
        }
    }
}

struct LruCache<K: Eq + std::hash::Hash + Clone, V> {
    capacity: usize,
    order: VecDeque<K>,
    entries: HashMap<K, V>,
}

impl<K: Eq + std::hash::Hash + Clone, V> LruCache<K, V> {
    fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), order: VecDeque::new(), entries: HashMap::new() }
    }

    fn get(&mut self, key: &K) -> Option<&V> {
        if self.entries.contains_key(key) {
            self.order.retain(|k| k != key);
            self.order.push_back(key.clone());
        }
        self.entries.get(key)
    }

    fn insert(&mut self, key: K, value: V) {
        if self.entries.contains_key(&key) {
            self.order.retain(|k| k != &key);
        } else if self.entries.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, value);
    }
}

/// Point-lookup by key on top of a [`Temp`], backed by a small LRU of
/// decoded chunks (§4.5). Binary-searches the chunk index built at
/// finalize time, then scans within the one chunk that could hold `key`.
pub struct TempCache<'a, E: TempEntry> {
    temp: &'a Temp<E>,
    cache: LruCache<usize, Vec<E>>,
}

impl<'a, E: TempEntry> TempCache<'a, E> {
    #[must_use]
    pub fn new(temp: &'a Temp<E>, capacity: usize) -> Self {
        Self { temp, cache: LruCache::new(capacity) }
    }

    #[must_use]
    pub fn source(&self) -> &'a Temp<E> {
        self.temp
    }

    /// Find the entry with this exact key, if present.
    ///
    /// # Errors
    /// Propagates I/O or codec errors reading the containing chunk.
    pub fn get(&mut self, key: &E::Key) -> Result<Option<E>, TempError> {
        let Some(chunk_index) = self.temp.find_chunk(key) else {
            return Ok(None);
        };
        if self.cache.get(&chunk_index).is_none() {
            let chunk = self.temp.load_chunk(chunk_index)?;
            self.cache.insert(chunk_index, chunk);
        }
        let chunk = self.cache.get(&chunk_index).expect("just inserted");
        Ok(chunk.iter().find(|e| &e.key() == key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Num(u32);

    impl TempEntry for Num {
        type Key = u32;

        fn marshal(&self, w: &mut ByteWriter) {
            w.write_u32(self.0);
        }

        fn unmarshal(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
            Ok(Num(r.read_u32()?))
        }

        fn marshalled_size(&self) -> usize {
            4
        }

        fn key(&self) -> u32 {
            self.0
        }
    }

    fn build(values: &[u32], chunk_bytes: usize) -> Temp<Num> {
        let mut w: TempWriter<Num> = TempWriter::new(chunk_bytes).unwrap();
        for &v in values {
            w.add(Num(v)).unwrap();
        }
        w.finalize().unwrap()
    }

    #[test]
    fn sorts_across_many_small_chunks() {
        let values: Vec<u32> = (0..500).rev().collect();
        let temp = build(&values, 32); // 8 entries per chunk forces many chunks
        let out: Vec<u32> = temp.reader(None).map(|r| r.unwrap().0).collect();
        let mut expected = values;
        expected.sort_unstable();
        assert_eq!(out, expected);
        assert!(temp.chunk_count() > 1);
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let values = [1, 2, 2, 3];
        let mut w: TempWriter<Num> = TempWriter::new(4096).unwrap();
        for v in values {
            w.add(Num(v)).unwrap();
        }
        assert!(matches!(w.finalize(), Err(TempError::DuplicateEntry)));
    }

    #[test]
    fn reader_filter_skips_entries() {
        let temp = build(&[1, 2, 3, 4, 5], 4096);
        let out: Vec<u32> = temp.reader(Some(Box::new(|n: &Num| n.0 % 2 == 0))).map(|r| r.unwrap().0).collect();
        assert_eq!(out, vec![2, 4]);
    }

    #[test]
    fn chunk_cache_finds_existing_and_missing_keys() {
        let temp = build(&(0..200).collect::<Vec<_>>(), 64);
        let mut cache = TempCache::new(&temp, 2);
        assert_eq!(cache.get(&57).unwrap(), Some(Num(57)));
        assert_eq!(cache.get(&9999).unwrap(), None);
    }

    #[test]
    fn read_chunk_raw_round_trips_through_unmarshal() {
        let temp = build(&[10, 20, 30], 4096);
        let raw = temp.read_chunk_raw(0).unwrap();
        let decoded = unmarshal_all::<Num>(&raw).unwrap();
        assert_eq!(decoded, vec![Num(10), Num(20), Num(30)]);
    }
}
