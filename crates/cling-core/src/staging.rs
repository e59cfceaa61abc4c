//! Workspace filesystem scanner and staging cache (§4.7, component 9).
//!
//! [`scan`] walks a workspace directory honoring the `.clingignore` /
//! `.gitignore` stack and emits one `Add`-typed [`RevisionEntry`] per
//! accepted path into a [`crate::temp::TempWriter`]; the result — [`Staging`]
//! — is structurally identical to a [`crate::revision::RevisionSnapshot`]
//! but describes the workspace's current state rather than a committed one.
//!
//! A [`StagingCache`] persisted alongside the workspace remembers, per
//! path, the `(ctime_sec, ctime_nsec, size, inode)` quadruple a file had
//! when it was last hashed, plus the `FileHash`/`BlockIds` computed then.
//! When `fast_scan` is on and the quadruple still matches, the scanner
//! reuses the cached values instead of re-reading the file.

use std::fs;
use std::io::Read;
use std::path::Path;
use std::time::{Duration, SystemTime};

use cling_codec::{ByteReader, ByteWriter, CodecError};
use cling_crypto::BlockId;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::ignore_stack::IgnoreStack;
use crate::path::{PathError, RepoPath};
use crate::revision::entry::{EntryType, FileMetadata, RevisionEntry, NO_BIRTHTIME, S_IFDIR, S_IFLNK, S_IFMT};
use crate::temp::{Temp, TempError, TempWriter, DEFAULT_CHUNK_BYTES};

/// A stale-cache-directory sweep only removes entries older than this.
const STALE_AFTER: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Path(#[from] PathError),
    #[error(transparent)]
    Temp(#[from] TempError),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl StagingError {
    fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}

/// The workspace's current state as a sorted, `Add`-only entry stream.
pub type Staging = Temp<RevisionEntry>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    path: String,
    is_dir: bool,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    ctime_sec: i64,
    ctime_nsec: i32,
    size: i64,
    inode: u64,
    file_hash: [u8; 32],
    block_ids: Vec<BlockId>,
}

/// The on-disk `(path, isDir) -> stat quadruple + FileHash + BlockIds` map
/// that makes a fast scan possible.
#[derive(Default)]
pub struct StagingCache {
    entries: std::collections::HashMap<CacheKey, CacheEntry>,
}

impl StagingCache {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load a previously-persisted cache, or an empty one if it doesn't
    /// exist yet.
    ///
    /// # Errors
    /// Propagates I/O or decode failures other than a missing file.
    pub fn load(path: &Path) -> Result<Self, StagingError> {
        let bytes = match fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::empty()),
            Err(e) => return Err(StagingError::io(path.display().to_string(), e)),
        };
        let mut r = ByteReader::new(&bytes);
        let mut entries = std::collections::HashMap::new();
        while !r.is_exhausted() {
            let path_bytes = r.read_bytes_u16(u16::MAX)?;
            let path_str = String::from_utf8(path_bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8)?;
            let is_dir = r.read_u8()? != 0;
            let ctime_sec = r.read_i64()?;
            let ctime_nsec = r.read_i32()?;
            let size = r.read_i64()?;
            let inode = r.read_u64()?;
            let file_hash = r.read_array::<32>()?;
            let count = r.read_u32()?;
            let mut block_ids = Vec::with_capacity(count as usize);
            for _ in 0..count {
                block_ids.push(BlockId::from_bytes(r.read_array::<32>()?));
            }
            entries.insert(CacheKey { path: path_str, is_dir }, CacheEntry { ctime_sec, ctime_nsec, size, inode, file_hash, block_ids });
        }
        Ok(Self { entries })
    }

    /// Atomically overwrite `path` with the current contents (temp file +
    /// rename, matching the storage layer's own write pattern).
    ///
    /// # Errors
    /// Propagates I/O failures.
    pub fn save(&self, path: &Path) -> Result<(), StagingError> {
        let mut w = ByteWriter::new();
        for (key, entry) in &self.entries {
            w.write_bytes_u16(key.path.as_bytes());
            w.write_u8(u8::from(key.is_dir));
            w.write_i64(entry.ctime_sec);
            w.write_i32(entry.ctime_nsec);
            w.write_i64(entry.size);
            w.write_u64(entry.inode);
            w.write_raw(&entry.file_hash);
            w.write_u32(u32::try_from(entry.block_ids.len()).expect("block id count fits in u32"));
            for id in &entry.block_ids {
                w.write_raw(id.as_bytes());
            }
        }
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(|e| StagingError::io(dir.display().to_string(), e))?;
        let mut suffix = [0u8; 4];
        rand::rng().fill_bytes(&mut suffix);
        let tmp_path = dir.join(format!(".staging.tmp.{}", hex::encode(suffix)));
        fs::write(&tmp_path, w.into_bytes()).map_err(|e| StagingError::io(tmp_path.display().to_string(), e))?;
        fs::rename(&tmp_path, path).map_err(|e| StagingError::io(path.display().to_string(), e))?;
        Ok(())
    }

    fn get(&self, path: &str, is_dir: bool) -> Option<&CacheEntry> {
        self.entries.get(&CacheKey { path: path.to_string(), is_dir })
    }

    fn set(&mut self, path: &str, is_dir: bool, entry: CacheEntry) {
        self.entries.insert(CacheKey { path: path.to_string(), is_dir }, entry);
    }
}

/// Remove sibling temp files left behind by a [`StagingCache::save`] that
/// never completed its rename, older than [`STALE_AFTER`].
///
/// # Errors
/// Propagates I/O failures other than the directory not existing.
pub fn sweep_stale_cache_files(cache_dir: &Path, now: SystemTime) -> Result<(), StagingError> {
    let read_dir = match fs::read_dir(cache_dir) {
        Ok(r) => r,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(StagingError::io(cache_dir.display().to_string(), e)),
    };
    for entry in read_dir {
        let entry = entry.map_err(|e| StagingError::io(cache_dir.display().to_string(), e))?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !name.starts_with(".staging.tmp.") {
            continue;
        }
        let Ok(metadata) = entry.metadata() else { continue };
        let Ok(modified) = metadata.modified() else { continue };
        if now.duration_since(modified).is_ok_and(|age| age > STALE_AFTER) {
            let _ = fs::remove_file(entry.path());
        }
    }
    Ok(())
}

fn is_atomic_temp_name(name: &str) -> bool {
    name.starts_with('.') && name.contains(".tmp.")
}

#[cfg(unix)]
fn birthtime(_metadata: &fs::Metadata) -> (i64, i32) {
    #[cfg(target_os = "macos")]
    {
        use std::os::macos::fs::MetadataExt as _;
        return (_metadata.st_birthtime(), i32::try_from(_metadata.st_birthtime_nsec()).unwrap_or(0));
    }
    #[cfg(not(target_os = "macos"))]
    {
        (NO_BIRTHTIME, 0)
    }
}

#[cfg(not(unix))]
fn birthtime(_metadata: &fs::Metadata) -> (i64, i32) {
    (NO_BIRTHTIME, 0)
}

struct StatInfo {
    mode_and_perm: u32,
    mtime_sec: i64,
    mtime_nsec: i32,
    ctime_sec: i64,
    ctime_nsec: i32,
    size: i64,
    uid: u32,
    gid: u32,
    inode: u64,
    birthtime_sec: i64,
    birthtime_nsec: i32,
}

#[cfg(unix)]
fn stat(metadata: &fs::Metadata) -> StatInfo {
    use std::os::unix::fs::MetadataExt;
    let (birthtime_sec, birthtime_nsec) = birthtime(metadata);
    StatInfo {
        mode_and_perm: metadata.mode(),
        mtime_sec: metadata.mtime(),
        mtime_nsec: i32::try_from(metadata.mtime_nsec()).unwrap_or(0),
        ctime_sec: metadata.ctime(),
        ctime_nsec: i32::try_from(metadata.ctime_nsec()).unwrap_or(0),
        size: metadata.size() as i64,
        uid: metadata.uid(),
        gid: metadata.gid(),
        inode: metadata.ino(),
        birthtime_sec,
        birthtime_nsec,
    }
}

#[cfg(not(unix))]
fn stat(metadata: &fs::Metadata) -> StatInfo {
    StatInfo {
        mode_and_perm: if metadata.is_dir() { S_IFDIR | 0o755 } else { 0o100_644 },
        mtime_sec: 0,
        mtime_nsec: 0,
        ctime_sec: 0,
        ctime_nsec: 0,
        size: metadata.len() as i64,
        uid: UNKNOWN_ID,
        gid: UNKNOWN_ID,
        inode: 0,
        birthtime_sec: NO_BIRTHTIME,
        birthtime_nsec: 0,
    }
}

fn hash_file(path: &Path) -> Result<[u8; 32], StagingError> {
    let mut file = fs::File::open(path).map_err(|e| StagingError::io(path.display().to_string(), e))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 65536];
    loop {
        let n = file.read(&mut buf).map_err(|e| StagingError::io(path.display().to_string(), e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().into())
}

/// Recursively scan `root`, writing one `Add` entry per accepted path into
/// `writer` and refreshing `cache` in place.
///
/// # Errors
/// Propagates filesystem, path, or temp-pipeline failures.
pub fn scan(root: &Path, fast_scan: bool, cache: &mut StagingCache, writer: &mut TempWriter<RevisionEntry>) -> Result<(), StagingError> {
    let mut ignore = IgnoreStack::new();
    scan_dir(root, &RepoPath::root(), &mut ignore, fast_scan, cache, writer)
}

fn scan_dir(
    abs_dir: &Path,
    rel_dir: &RepoPath,
    ignore: &mut IgnoreStack,
    fast_scan: bool,
    cache: &mut StagingCache,
    writer: &mut TempWriter<RevisionEntry>,
) -> Result<(), StagingError> {
    ignore.push_dir(abs_dir);

    let mut names: Vec<std::ffi::OsString> = fs::read_dir(abs_dir)
        .map_err(|e| StagingError::io(abs_dir.display().to_string(), e))?
        .filter_map(|e| e.ok())
        .map(|e| e.file_name())
        .collect();
    names.sort();

    for name in names {
        let name_str = name.to_string_lossy();
        if rel_dir.is_root() && name_str == ".cling" {
            continue;
        }
        if is_atomic_temp_name(&name_str) {
            continue;
        }

        let abs_path = abs_dir.join(&name);
        let symlink_metadata =
            fs::symlink_metadata(&abs_path).map_err(|e| StagingError::io(abs_path.display().to_string(), e))?;
        let is_symlink = symlink_metadata.file_type().is_symlink();
        let is_dir = !is_symlink && symlink_metadata.is_dir();

        if ignore.is_ignored(&abs_path, is_dir) {
            continue;
        }

        let rel_path = rel_dir.join(&name_str)?;
        let stat_info = stat(&symlink_metadata);

        let symlink_target = if is_symlink {
            Some(fs::read_link(&abs_path).map_err(|e| StagingError::io(abs_path.display().to_string(), e))?.to_string_lossy().into_owned())
        } else {
            None
        };

        let cached = cache.get(rel_path.as_str(), is_dir).cloned();
        let (file_hash, block_ids) = if is_dir {
            ([0u8; 32], Vec::new())
        } else if let Some(target) = &symlink_target {
            (Sha256::digest(target.as_bytes()).into(), Vec::new())
        } else if fast_scan
            && cached.as_ref().is_some_and(|c| {
                c.ctime_sec == stat_info.ctime_sec && c.ctime_nsec == stat_info.ctime_nsec && c.size == stat_info.size && c.inode == stat_info.inode
            })
        {
            let c = cached.as_ref().expect("just matched");
            (c.file_hash, c.block_ids.clone())
        } else {
            (hash_file(&abs_path)?, Vec::new())
        };

        cache.set(
            rel_path.as_str(),
            is_dir,
            CacheEntry {
                ctime_sec: stat_info.ctime_sec,
                ctime_nsec: stat_info.ctime_nsec,
                size: stat_info.size,
                inode: stat_info.inode,
                file_hash,
                block_ids: block_ids.clone(),
            },
        );

        let mode_and_perm = if is_dir {
            (stat_info.mode_and_perm & !S_IFMT) | S_IFDIR
        } else if is_symlink {
            (stat_info.mode_and_perm & !S_IFMT) | S_IFLNK
        } else {
            stat_info.mode_and_perm
        };

        writer.add(RevisionEntry {
            path: rel_path.clone(),
            entry_type: EntryType::Add,
            metadata: FileMetadata {
                mode_and_perm,
                mtime_sec: stat_info.mtime_sec,
                mtime_nsec: stat_info.mtime_nsec,
                size: if is_dir { 0 } else { stat_info.size },
                file_hash,
                block_ids,
                symlink_target,
                uid: stat_info.uid,
                gid: stat_info.gid,
                birthtime_sec: stat_info.birthtime_sec,
                birthtime_nsec: stat_info.birthtime_nsec,
            },
        })?;

        if is_dir {
            scan_dir(&abs_path, &rel_path, ignore, fast_scan, cache, writer)?;
        }
    }

    ignore.pop_dir();
    Ok(())
}

/// Scan `root` into a finalized [`Staging`] stream, loading and rewriting
/// the cache file at `cache_path`.
///
/// # Errors
/// Propagates filesystem, path, or temp-pipeline failures.
pub fn build_staging(root: &Path, cache_path: &Path, fast_scan: bool) -> Result<(Staging, StagingCache), StagingError> {
    if let Some(dir) = cache_path.parent() {
        sweep_stale_cache_files(dir, SystemTime::now())?;
    }
    let mut cache = StagingCache::load(cache_path)?;
    let mut writer: TempWriter<RevisionEntry> = TempWriter::new(DEFAULT_CHUNK_BYTES)?;
    scan(root, fast_scan, &mut cache, &mut writer)?;
    let staging = writer.finalize()?;
    cache.save(cache_path)?;
    Ok((staging, cache))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries_of(staging: &Staging) -> Vec<RevisionEntry> {
        staging.reader(None).map(Result::unwrap).collect()
    }

    #[test]
    fn scans_files_and_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/b.txt"), b"world").unwrap();

        let cache_path = dir.path().join(".cling/workspace/cache/staging");
        let (staging, _cache) = build_staging(dir.path(), &cache_path, false).unwrap();
        let paths: Vec<String> = entries_of(&staging).into_iter().map(|e| e.path.as_str().to_string()).collect();
        assert_eq!(paths, vec!["a.txt".to_string(), "sub".to_string(), "sub/b.txt".to_string()]);
    }

    #[test]
    fn skips_cling_directory_and_atomic_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join(".cling")).unwrap();
        fs::write(dir.path().join(".cling/marker"), b"x").unwrap();
        fs::write(dir.path().join(".keep.txt.tmp.ab12"), b"x").unwrap();
        fs::write(dir.path().join("real.txt"), b"x").unwrap();

        let cache_path = dir.path().join(".cache/staging");
        let (staging, _cache) = build_staging(dir.path(), &cache_path, false).unwrap();
        let paths: Vec<String> = entries_of(&staging).into_iter().map(|e| e.path.as_str().to_string()).collect();
        assert_eq!(paths, vec!["real.txt".to_string()]);
    }

    #[test]
    fn honors_gitignore() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".gitignore"), "*.log\n").unwrap();
        fs::write(dir.path().join("debug.log"), b"x").unwrap();
        fs::write(dir.path().join("keep.txt"), b"x").unwrap();

        let cache_path = dir.path().join(".cache/staging");
        let (staging, _cache) = build_staging(dir.path(), &cache_path, false).unwrap();
        let paths: Vec<String> = entries_of(&staging).into_iter().map(|e| e.path.as_str().to_string()).collect();
        assert_eq!(paths, vec!["keep.txt".to_string()]);
    }

    #[test]
    fn fast_scan_reuses_cached_hash_when_stat_quadruple_matches() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, b"hello").unwrap();
        let real_metadata = fs::symlink_metadata(&file).unwrap();
        let real_stat = stat(&real_metadata);

        let cache_path = dir.path().join(".cache/staging");
        let fake_hash = [0x42u8; 32];
        let mut seeded = StagingCache::empty();
        seeded.set(
            "a.txt",
            false,
            CacheEntry {
                ctime_sec: real_stat.ctime_sec,
                ctime_nsec: real_stat.ctime_nsec,
                size: real_stat.size,
                inode: real_stat.inode,
                file_hash: fake_hash,
                block_ids: vec![BlockId::zero()],
            },
        );
        seeded.save(&cache_path).unwrap();

        let (fast, _) = build_staging(dir.path(), &cache_path, true).unwrap();
        assert_eq!(entries_of(&fast)[0].metadata.file_hash, fake_hash);
        assert_eq!(entries_of(&fast)[0].metadata.block_ids, vec![BlockId::zero()]);

        let (slow, _) = build_staging(dir.path(), &cache_path, false).unwrap();
        assert_ne!(entries_of(&slow)[0].metadata.file_hash, fake_hash);
    }

    #[test]
    fn cache_round_trips_through_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = StagingCache::empty();
        cache.set(
            "a.txt",
            false,
            CacheEntry { ctime_sec: 1, ctime_nsec: 2, size: 3, inode: 4, file_hash: [9u8; 32], block_ids: vec![BlockId::zero()] },
        );
        let path = dir.path().join("cache-file");
        cache.save(&path).unwrap();
        let loaded = StagingCache::load(&path).unwrap();
        let entry = loaded.get("a.txt", false).unwrap();
        assert_eq!(entry.ctime_sec, 1);
        assert_eq!(entry.block_ids, vec![BlockId::zero()]);
    }

    #[test]
    fn sweep_removes_only_stale_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join(".staging.tmp.deadbeef");
        fs::write(&stale, b"x").unwrap();
        let old_time = filetime::FileTime::from_unix_time(0, 0);
        filetime::set_file_mtime(&stale, old_time).unwrap();

        sweep_stale_cache_files(dir.path(), SystemTime::now()).unwrap();
        assert!(!stale.exists());
    }
}
