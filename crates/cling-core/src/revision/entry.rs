//! `RevisionEntry` marshalling (§3, §6, component 8).

use cling_codec::{ByteReader, ByteWriter, CodecError};
use cling_crypto::BlockId;

use crate::path::RepoPath;
use crate::temp::TempEntry;

/// Sentinel for an unknown/unavailable uid or gid.
pub const UNKNOWN_ID: u32 = 0xFFFF_FFFF;
/// Sentinel for an unavailable birthtime.
pub const NO_BIRTHTIME: i64 = -1;

pub const S_IFMT: u32 = 0o170_000;
pub const S_IFDIR: u32 = 0o040_000;
pub const S_IFLNK: u32 = 0o120_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    Add = 1,
    Update = 2,
    Delete = 3,
}

impl EntryType {
    fn tag(self) -> u8 {
        self as u8
    }

    fn from_tag(tag: u8) -> Result<Self, CodecError> {
        match tag {
            1 => Ok(Self::Add),
            2 => Ok(Self::Update),
            3 => Ok(Self::Delete),
            _ => Err(CodecError::UnknownTag { tag }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub mode_and_perm: u32,
    pub mtime_sec: i64,
    pub mtime_nsec: i32,
    pub size: i64,
    pub file_hash: [u8; 32],
    pub block_ids: Vec<BlockId>,
    pub symlink_target: Option<String>,
    pub uid: u32,
    pub gid: u32,
    pub birthtime_sec: i64,
    pub birthtime_nsec: i32,
}

impl FileMetadata {
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.mode_and_perm & S_IFMT == S_IFDIR
    }

    #[must_use]
    pub fn is_symlink(&self) -> bool {
        self.mode_and_perm & S_IFMT == S_IFLNK
    }

    /// Whether two metadata values agree on everything a merge restores:
    /// mode, mtime, size, and content hash. UID/GID are compared only
    /// when `compare_ownership` is set, matching the optional `--chown`
    /// surface.
    #[must_use]
    pub fn restorable_eq(&self, other: &Self, compare_ownership: bool) -> bool {
        let base = self.mode_and_perm == other.mode_and_perm
            && self.mtime_sec == other.mtime_sec
            && self.mtime_nsec == other.mtime_nsec
            && self.size == other.size
            && self.file_hash == other.file_hash;
        base && (!compare_ownership || (self.uid == other.uid && self.gid == other.gid))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionEntry {
    pub path: RepoPath,
    pub entry_type: EntryType,
    pub metadata: FileMetadata,
}

impl RevisionEntry {
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.metadata.is_dir()
    }
}

fn write_block_ids(w: &mut ByteWriter, ids: &[BlockId]) {
    w.write_u32(u32::try_from(ids.len()).expect("block id count fits in u32"));
    for id in ids {
        w.write_raw(id.as_bytes());
    }
}

fn read_block_ids(r: &mut ByteReader<'_>) -> Result<Vec<BlockId>, CodecError> {
    let count = r.read_u32()?;
    let mut ids = Vec::with_capacity(count as usize);
    for _ in 0..count {
        ids.push(BlockId::from_bytes(r.read_array::<32>()?));
    }
    Ok(ids)
}

impl TempEntry for RevisionEntry {
    type Key = String;

    fn marshal(&self, w: &mut ByteWriter) {
        w.write_bytes_u16(self.path.as_str().as_bytes());
        w.write_u8(self.entry_type.tag());
        w.write_u32(self.metadata.mode_and_perm);
        w.write_i64(self.metadata.mtime_sec);
        w.write_i32(self.metadata.mtime_nsec);
        w.write_i64(self.metadata.size);
        w.write_raw(&self.metadata.file_hash);
        write_block_ids(w, &self.metadata.block_ids);
        let symlink = self.metadata.symlink_target.as_deref().unwrap_or("");
        w.write_bytes_u16(symlink.as_bytes());
        w.write_u32(self.metadata.uid);
        w.write_u32(self.metadata.gid);
        w.write_i64(self.metadata.birthtime_sec);
        w.write_i32(self.metadata.birthtime_nsec);
    }

    fn unmarshal(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        let path_bytes = r.read_bytes_u16(u16::MAX)?;
        let path_str = String::from_utf8(path_bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8)?;
        let path = RepoPath::parse(path_str).map_err(|_| CodecError::InvalidUtf8)?;
        let entry_type = EntryType::from_tag(r.read_u8()?)?;
        let mode_and_perm = r.read_u32()?;
        let mtime_sec = r.read_i64()?;
        let mtime_nsec = r.read_i32()?;
        let size = r.read_i64()?;
        let file_hash = r.read_array::<32>()?;
        let block_ids = read_block_ids(r)?;
        let symlink_bytes = r.read_bytes_u16(u16::MAX)?;
        let symlink_target =
            if symlink_bytes.is_empty() { None } else { Some(String::from_utf8_lossy(&symlink_bytes).into_owned()) };
        let uid = r.read_u32()?;
        let gid = r.read_u32()?;
        let birthtime_sec = r.read_i64()?;
        let birthtime_nsec = r.read_i32()?;
        Ok(Self {
            path,
            entry_type,
            metadata: FileMetadata {
                mode_and_perm,
                mtime_sec,
                mtime_nsec,
                size,
                file_hash,
                block_ids,
                symlink_target,
                uid,
                gid,
                birthtime_sec,
                birthtime_nsec,
            },
        })
    }

    fn marshalled_size(&self) -> usize {
        2 + self.path.as_str().len()
            + 1
            + 4
            + 8
            + 4
            + 8
            + 32
            + 4
            + self.metadata.block_ids.len() * 32
            + 2
            + self.metadata.symlink_target.as_deref().map_or(0, str::len)
            + 4
            + 4
            + 8
            + 4
    }

    fn key(&self) -> String {
        self.path.sort_key(self.is_dir())
    }
}
