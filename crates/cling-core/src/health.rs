//! Repository health check (§4.10, component 11).
//!
//! Walks every revision from `head` back to the root, verifying the chain
//! link, that each metadata block decrypts, and that its entry stream is
//! sorted and duplicate-free. With `verify_data` set, also re-reads every
//! referenced data block and recomputes its file's `FileHash`. A corrupt
//! chain link, an undecryptable block, or a missing data block is a hard
//! stop; malformed fields within one otherwise-readable block are
//! collected with [`cling_codec::ErrorAccumulator`] so a single bad entry
//! doesn't hide the rest of that block's problems.

use std::collections::HashSet;

use cling_codec::{ByteReader, ErrorAccumulator};
use cling_crypto::BlockId;
use sha2::{Digest, Sha256};

use crate::error::{RepositoryError, Result};
use crate::repository::{BlockKind, Repository};
use crate::revision::{EntryType, RevisionEntry, RevisionId};
use crate::temp::TempEntry;

/// Counters accumulated over a health-check walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthReport {
    pub revisions: usize,
    pub entries: usize,
    pub unique_blocks: usize,
    pub metadata_bytes: u64,
    pub data_bytes: u64,
}

/// Walk `head`'s chain back to the root.
///
/// # Errors
/// [`RepositoryError::CorruptChain`] on a cycle or a chain deeper than
/// [`crate::revision::snapshot::build_revision_snapshot`] tolerates;
/// otherwise propagates the first block-decrypt, data-block-read, or
/// file-hash-mismatch failure encountered, and [`RepositoryError::Codec`]
/// (wrapping [`CodecError::Multiple`]) if one block's entries decode with
/// more than one malformed field.
pub fn check(repository: &Repository, head: RevisionId, verify_data: bool) -> Result<HealthReport> {
    let mut report = HealthReport::default();
    let mut seen_blocks: HashSet<BlockId> = HashSet::new();
    let mut visited_revisions: HashSet<RevisionId> = HashSet::new();
    let mut cursor = head;

    while !cursor.is_root() {
        if !visited_revisions.insert(cursor) {
            return Err(RepositoryError::CorruptChain { reason: format!("revision chain cycles back to {cursor}") });
        }
        if visited_revisions.len() > 1_000_000 {
            return Err(RepositoryError::CorruptChain { reason: "revision chain exceeds sane depth".to_string() });
        }

        let revision = repository.read_revision(cursor)?;
        report.revisions += 1;

        let mut last_key: Option<String> = None;
        for block_id in &revision.blocks {
            if seen_blocks.insert(*block_id) {
                report.unique_blocks += 1;
            }
            let plaintext = repository.read_block(BlockKind::Metadata, *block_id)?;
            report.metadata_bytes += plaintext.len() as u64;

            let entries = decode_entries(&plaintext)?;
            for entry in entries {
                report.entries += 1;
                let key = entry.key();
                if last_key.as_ref().is_some_and(|prev| &key <= prev) {
                    return Err(RepositoryError::CorruptChain {
                        reason: format!("entry stream is unsorted or duplicated at {key} in revision {cursor}"),
                    });
                }
                last_key = Some(key);

                if verify_data && entry.entry_type != EntryType::Delete && !entry.is_dir() && entry.metadata.symlink_target.is_none() {
                    let data_bytes = verify_file_blocks(repository, &entry, &mut seen_blocks)?;
                    report.data_bytes += data_bytes;
                }
            }
        }

        cursor = revision.parent;
    }

    Ok(report)
}

/// Decode every entry in one metadata block, collecting every malformed
/// field instead of stopping at the first.
fn decode_entries(plaintext: &[u8]) -> Result<Vec<RevisionEntry>> {
    let mut reader = ByteReader::new(plaintext);
    let mut errors = ErrorAccumulator::new();
    let mut entries = Vec::new();
    while !reader.is_exhausted() {
        match errors.try_or_record(RevisionEntry::unmarshal(&mut reader)) {
            Some(entry) => entries.push(entry),
            None => break,
        }
    }
    errors.finish()?;
    Ok(entries)
}

fn verify_file_blocks(repository: &Repository, entry: &RevisionEntry, seen_blocks: &mut HashSet<BlockId>) -> Result<u64> {
    let mut hasher = Sha256::new();
    let mut data_bytes = 0u64;
    for block_id in &entry.metadata.block_ids {
        seen_blocks.insert(*block_id);
        let plaintext = repository.read_block(BlockKind::Data, *block_id)?;
        data_bytes += plaintext.len() as u64;
        hasher.update(&plaintext);
    }
    let computed: [u8; 32] = hasher.finalize().into();
    if computed != entry.metadata.file_hash {
        return Err(RepositoryError::CorruptChain {
            reason: format!("{} does not hash to its recorded FileHash", entry.path),
        });
    }
    Ok(data_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::RepoPath;
    use crate::revision::entry::{FileMetadata, NO_BIRTHTIME, UNKNOWN_ID};
    use crate::revision::{Revision, RevisionEntry};
    use crate::temp::{TempWriter, DEFAULT_CHUNK_BYTES};
    use cling_storage::{LocalStorage, Storage};
    use std::sync::Arc;

    fn repo() -> (tempfile::TempDir, Repository) {
        let dir = tempfile::tempdir().unwrap();
        let storage: Arc<dyn Storage> = Arc::new(LocalStorage::new(dir.path().join("repo")));
        let repository = Repository::init(storage, b"correct horse battery staple1", false).unwrap();
        (dir, repository)
    }

    fn file_entry(path: &str, content: &[u8], block_ids: Vec<BlockId>) -> RevisionEntry {
        RevisionEntry {
            path: RepoPath::parse(path).unwrap(),
            entry_type: EntryType::Add,
            metadata: FileMetadata {
                mode_and_perm: 0o100_644,
                mtime_sec: 0,
                mtime_nsec: 0,
                size: content.len() as i64,
                file_hash: Sha256::digest(content).into(),
                block_ids,
                symlink_target: None,
                uid: UNKNOWN_ID,
                gid: UNKNOWN_ID,
                birthtime_sec: NO_BIRTHTIME,
                birthtime_nsec: 0,
            },
        }
    }

    fn commit(repository: &Repository, parent: RevisionId, entries: Vec<RevisionEntry>) -> RevisionId {
        let mut writer: TempWriter<RevisionEntry> = TempWriter::new(DEFAULT_CHUNK_BYTES).unwrap();
        for e in entries {
            writer.add(e).unwrap();
        }
        let temp = writer.finalize().unwrap();
        let mut blocks = Vec::new();
        for i in 0..temp.chunk_count() {
            let raw = temp.read_chunk_raw(i).unwrap();
            let (_, header) = repository.write_block(BlockKind::Metadata, &raw).unwrap();
            blocks.push(header.block_id);
        }
        let revision = Revision { timestamp: 1, author: "t".into(), message: "m".into(), parent, blocks };
        let id = repository.write_revision(&revision).unwrap();
        repository.set_head(parent, id).unwrap();
        id
    }

    #[test]
    fn healthy_chain_reports_counts() {
        let (_dir, repository) = repo();
        let r1 = commit(&repository, RevisionId::zero(), vec![file_entry("a.txt", b"a", vec![])]);
        let r2 = commit(&repository, r1, vec![file_entry("b.txt", b"b", vec![])]);
        let report = check(&repository, r2, false).unwrap();
        assert_eq!(report.revisions, 2);
        assert_eq!(report.entries, 2);
        assert!(report.unique_blocks >= 2);
    }

    #[test]
    fn root_head_is_trivially_healthy() {
        let (_dir, repository) = repo();
        let report = check(&repository, RevisionId::zero(), false).unwrap();
        assert_eq!(report, HealthReport::default());
    }

    #[test]
    fn verify_data_accepts_a_correctly_hashed_file() {
        let (_dir, repository) = repo();
        let (_, header) = repository.write_block(BlockKind::Data, b"hello").unwrap();
        let entry = file_entry("a.txt", b"hello", vec![header.block_id]);
        let r1 = commit(&repository, RevisionId::zero(), vec![entry]);
        let report = check(&repository, r1, true).unwrap();
        assert_eq!(report.data_bytes, 5);
    }

    #[test]
    fn verify_data_rejects_a_mismatched_hash() {
        let (_dir, repository) = repo();
        let (_, header) = repository.write_block(BlockKind::Data, b"hello").unwrap();
        let mut entry = file_entry("a.txt", b"hello", vec![header.block_id]);
        entry.metadata.file_hash = [0u8; 32];
        let r1 = commit(&repository, RevisionId::zero(), vec![entry]);
        assert!(matches!(check(&repository, r1, true), Err(RepositoryError::CorruptChain { .. })));
    }
}
