//! `RevisionSnapshot` materialization (§3, §4.6).
//!
//! Walks a revision's parent chain from the root forward, folding each
//! revision's entries into a running snapshot with a two-cursor merge: an
//! `Add`/`Update` from a later revision overrides the earlier metadata at
//! that path; a `Delete` removes it entirely. The running snapshot is
//! itself a [`Temp`], so no single fold step needs the whole history in
//! memory — only the base snapshot's cursor and the one revision's
//! entries being folded in.

use std::cmp::Ordering;

use cling_codec::ByteReader;

use crate::error::{RepositoryError, Result};
use crate::repository::{BlockKind, Repository};
use crate::temp::{Temp, TempEntry, TempWriter, DEFAULT_CHUNK_BYTES};

use super::chain::{Revision, RevisionId};
use super::entry::{EntryType, RevisionEntry};

/// The materialized, sorted set of live entries as of a revision.
pub type RevisionSnapshot = Temp<RevisionEntry>;

fn load_revision_entries(repository: &Repository, revision: &Revision) -> Result<Vec<RevisionEntry>> {
    let mut entries = Vec::new();
    for block_id in &revision.blocks {
        let bytes = repository.read_block(BlockKind::Metadata, *block_id)?;
        let mut r = ByteReader::new(&bytes);
        while !r.is_exhausted() {
            entries.push(RevisionEntry::unmarshal(&mut r)?);
        }
    }
    Ok(entries)
}

fn normalize_live(mut entry: RevisionEntry) -> RevisionEntry {
    entry.entry_type = EntryType::Add;
    entry
}

/// Two-cursor fold of one revision's (already-sorted) entries onto a
/// running snapshot.
fn fold_revision(base: Option<&RevisionSnapshot>, new_entries: Vec<RevisionEntry>) -> Result<RevisionSnapshot> {
    let mut writer: TempWriter<RevisionEntry> = TempWriter::new(DEFAULT_CHUNK_BYTES)?;
    let mut base_iter = base.map(|t| t.reader(None).peekable());
    let mut new_iter = new_entries.into_iter().peekable();

    loop {
        let base_key = match base_iter.as_mut().and_then(std::iter::Peekable::peek) {
            Some(Ok(e)) => Some(e.key()),
            Some(Err(_)) => {
                let err = base_iter.as_mut().expect("just peeked").next().expect("just peeked").unwrap_err();
                return Err(err.into());
            }
            None => None,
        };
        let new_key = new_iter.peek().map(super::entry::RevisionEntry::key);

        match (base_key, new_key) {
            (None, None) => break,
            (Some(_), None) => {
                let entry = base_iter.as_mut().expect("has base_key").next().expect("has base_key")?;
                writer.add(entry)?;
            }
            (None, Some(_)) => {
                let entry = new_iter.next().expect("has new_key");
                if entry.entry_type != EntryType::Delete {
                    writer.add(normalize_live(entry))?;
                }
            }
            (Some(bk), Some(nk)) => match bk.cmp(&nk) {
                Ordering::Less => {
                    let entry = base_iter.as_mut().expect("has base_key").next().expect("has base_key")?;
                    writer.add(entry)?;
                }
                Ordering::Greater => {
                    let entry = new_iter.next().expect("has new_key");
                    if entry.entry_type != EntryType::Delete {
                        writer.add(normalize_live(entry))?;
                    }
                }
                Ordering::Equal => {
                    let _shadowed = base_iter.as_mut().expect("has base_key").next().expect("has base_key")?;
                    let entry = new_iter.next().expect("has new_key");
                    if entry.entry_type != EntryType::Delete {
                        writer.add(normalize_live(entry))?;
                    }
                }
            },
        }
    }
    Ok(writer.finalize()?)
}

/// Build the materialized snapshot as of `id` by walking the chain back
/// to the root and folding forward.
///
/// # Errors
/// Propagates repository read failures or a corrupt chain.
pub fn build_revision_snapshot(repository: &Repository, id: RevisionId) -> Result<RevisionSnapshot> {
    let mut chain = Vec::new();
    let mut cursor = id;
    while !cursor.is_root() {
        let revision = repository.read_revision(cursor)?;
        let parent = revision.parent;
        chain.push(revision);
        cursor = parent;
        if chain.len() > 1_000_000 {
            return Err(RepositoryError::CorruptChain { reason: "revision chain exceeds sane depth".to_string() });
        }
    }
    chain.reverse();

    let mut snapshot: Option<RevisionSnapshot> = None;
    for revision in chain {
        let entries = load_revision_entries(repository, &revision)?;
        snapshot = Some(fold_revision(snapshot.as_ref(), entries)?);
    }
    match snapshot {
        Some(s) => Ok(s),
        None => fold_revision(None, Vec::new()),
    }
}
