//! Three-way merge engine (§4.8, component 10): reconciles workspace,
//! workspace-head snapshot, and repository-head snapshot, then commits the
//! local delta. `merge`, `force_commit`, `reset`, and the read-only
//! `status`/`ls`/`cp`/`log` wrappers (§4.9) all sit on top of the same
//! snapshot and staging primitives.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{RepositoryError, Result};
use crate::gear::GearChunker;
use crate::path::RepoPath;
use crate::repository::{BlockKind, Repository};
use crate::revision::{build_revision_snapshot, EntryType, Revision, RevisionEntry, RevisionId, RevisionSnapshot};
use crate::staging::{build_staging, Staging};
use crate::temp::{Temp, TempCache, TempEntry, TempWriter, DEFAULT_CHUNK_BYTES};
use crate::workspace::Workspace;

/// One path where the local and remote sides disagree and neither is a
/// strict ancestor of the other's basis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeConflict {
    pub path: RepoPath,
    pub local: RevisionEntry,
    pub remote: RevisionEntry,
}

/// Behavioral knobs for `merge`/`reset`/`cp`, matching the CLI's
/// `--fast-scan --accept-local --chown --chmod --chtime` flags.
#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    pub author: String,
    pub message: String,
    pub fast_scan: bool,
    pub restore_owner: bool,
    pub restore_mode: bool,
    pub restore_mtime: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Add,
    Update,
    Delete,
}

#[derive(Debug, Clone)]
pub struct StatusEntry {
    pub kind: ChangeKind,
    pub path: RepoPath,
    pub is_dir: bool,
}

fn now_unix() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}

fn tagged(kind: ChangeKind, mut entry: RevisionEntry) -> RevisionEntry {
    entry.entry_type = match kind {
        ChangeKind::Add => EntryType::Add,
        ChangeKind::Update => EntryType::Update,
        ChangeKind::Delete => EntryType::Delete,
    };
    entry
}

/// Stream-merge `staging` against `base` (the workspace-head snapshot),
/// emitting `Add`/`Update`/`Delete` per §4.8 Phase 0.
///
/// # Errors
/// Propagates temp-pipeline failures.
pub fn build_local_changes(staging: &Staging, base: &RevisionSnapshot, restore_owner: bool) -> Result<Temp<RevisionEntry>> {
    let mut writer: TempWriter<RevisionEntry> = TempWriter::new(DEFAULT_CHUNK_BYTES)?;
    let mut staging_iter = staging.reader(None).peekable();
    let mut base_iter = base.reader(None).peekable();

    loop {
        let staging_key = match staging_iter.peek() {
            Some(Ok(e)) => Some(e.key()),
            Some(Err(_)) => {
                let err = staging_iter.next().expect("just peeked").unwrap_err();
                return Err(err.into());
            }
            None => None,
        };
        let base_key = match base_iter.peek() {
            Some(Ok(e)) => Some(e.key()),
            Some(Err(_)) => {
                let err = base_iter.next().expect("just peeked").unwrap_err();
                return Err(err.into());
            }
            None => None,
        };

        match (staging_key, base_key) {
            (None, None) => break,
            (Some(_), None) => {
                let entry = staging_iter.next().expect("has staging_key")?;
                writer.add(tagged(ChangeKind::Add, entry))?;
            }
            (None, Some(_)) => {
                let entry = base_iter.next().expect("has base_key")?;
                writer.add(tagged(ChangeKind::Delete, entry))?;
            }
            (Some(sk), Some(bk)) => match sk.cmp(&bk) {
                std::cmp::Ordering::Less => {
                    let entry = staging_iter.next().expect("has staging_key")?;
                    writer.add(tagged(ChangeKind::Add, entry))?;
                }
                std::cmp::Ordering::Greater => {
                    let entry = base_iter.next().expect("has base_key")?;
                    writer.add(tagged(ChangeKind::Delete, entry))?;
                }
                std::cmp::Ordering::Equal => {
                    let s = staging_iter.next().expect("has staging_key")?;
                    let b = base_iter.next().expect("has base_key")?;
                    if !s.metadata.restorable_eq(&b.metadata, restore_owner) {
                        writer.add(tagged(ChangeKind::Update, s))?;
                    }
                }
            },
        }
    }
    Ok(writer.finalize()?)
}

/// Phase 0 only: the status wrapper (§4.9).
///
/// # Errors
/// Propagates scan, snapshot, or temp-pipeline failures.
pub fn status(repository: &Repository, workspace: &Workspace, fast_scan: bool) -> Result<Vec<StatusEntry>> {
    let (staging, _cache) = build_staging(workspace.root(), &workspace.staging_cache_path(), fast_scan)?;
    let base = build_revision_snapshot(repository, workspace.head()?)?;
    let local_changes = build_local_changes(&staging, &base, false)?;
    let mut out = Vec::new();
    for entry in local_changes.reader(None) {
        let entry = entry?;
        let kind = match entry.entry_type {
            EntryType::Add => ChangeKind::Add,
            EntryType::Update => ChangeKind::Update,
            EntryType::Delete => ChangeKind::Delete,
        };
        let is_dir = entry.is_dir();
        out.push(StatusEntry { kind, path: entry.path, is_dir });
    }
    Ok(out)
}

struct MergeInputs {
    staging: Staging,
    base: RevisionSnapshot,
    local_changes: Temp<RevisionEntry>,
    remote_head: RevisionId,
    remote_snapshot: RevisionSnapshot,
    prefix: RepoPath,
}

fn build_inputs(repository: &Repository, workspace: &Workspace, fast_scan: bool, restore_owner: bool) -> Result<MergeInputs> {
    let prefix = workspace.path_prefix()?.unwrap_or_else(RepoPath::root);
    let (staging, _cache) = build_staging(workspace.root(), &workspace.staging_cache_path(), fast_scan)?;
    let base = build_revision_snapshot(repository, workspace.head()?)?;
    let local_changes = build_local_changes(&staging, &base, restore_owner)?;
    let remote_head = repository.head()?;
    let remote_snapshot = build_revision_snapshot(repository, remote_head)?;
    Ok(MergeInputs { staging, base, local_changes, remote_head, remote_snapshot, prefix })
}

fn repo_key(prefix: &RepoPath, path: &RepoPath, is_dir: bool) -> String {
    path.with_prefix(prefix).sort_key(is_dir)
}

/// §4.8 Phase 2.
fn detect_conflicts(inputs: &MergeInputs) -> Result<Vec<MergeConflict>> {
    let mut remote_cache = TempCache::new(&inputs.remote_snapshot, 32);
    let mut ws_cache = TempCache::new(&inputs.base, 32);
    let mut conflicts = Vec::new();

    for entry in inputs.local_changes.reader(None) {
        let entry = entry?;
        let key = repo_key(&inputs.prefix, &entry.path, entry.is_dir());
        let Some(remote) = remote_cache.get(&key)? else { continue };
        if entry.is_dir() && remote.is_dir() {
            continue;
        }
        if let Some(base) = ws_cache.get(&key)? {
            if base.metadata.restorable_eq(&remote.metadata, false) {
                continue;
            }
        }
        conflicts.push(MergeConflict { path: entry.path.clone(), local: entry, remote });
    }
    Ok(conflicts)
}

fn mode_perm_bits(mode: u32) -> u32 {
    mode & 0o7777
}

fn restore_attrs(path: &Path, metadata: &crate::revision::FileMetadata, options: &MergeOptions) -> Result<()> {
    if options.restore_mode {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(mode_perm_bits(metadata.mode_and_perm));
            fs::set_permissions(path, perms).map_err(|e| io_err(path, e))?;
        }
    }
    if options.restore_mtime {
        let ft = filetime::FileTime::from_unix_time(metadata.mtime_sec, metadata.mtime_nsec.max(0) as u32);
        filetime::set_file_mtime(path, ft).map_err(|e| io_err(path, e))?;
    }
    Ok(())
}

fn io_err(path: impl AsRef<Path>, source: std::io::Error) -> RepositoryError {
    cling_storage::StorageError::Io { path: path.as_ref().display().to_string(), source }.into()
}

/// Directory writability dance (§4.8 Phase 3, §4.9 `cp`): a directory
/// restored to a mode without owner-write in a previous commit would
/// otherwise block writes to anything under it. `relax_ancestors_for_write`
/// temporarily grants owner-write to every existing ancestor of `target`
/// under `root`, remembering each one's original mode in `relaxed` so it
/// can be set back once all writes under it are done.
#[cfg(unix)]
fn relax_dir_for_write(dir: &Path, relaxed: &mut std::collections::HashMap<std::path::PathBuf, u32>) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let Ok(meta) = fs::symlink_metadata(dir) else { return Ok(()) };
    if !meta.is_dir() {
        return Ok(());
    }
    let mode = meta.permissions().mode();
    if mode & 0o200 == 0 {
        relaxed.entry(dir.to_path_buf()).or_insert(mode);
        fs::set_permissions(dir, fs::Permissions::from_mode(mode | 0o200)).map_err(|e| io_err(dir, e))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn relax_dir_for_write(_dir: &Path, _relaxed: &mut std::collections::HashMap<std::path::PathBuf, u32>) -> Result<()> {
    Ok(())
}

fn relax_ancestors_for_write(target: &Path, root: &Path, relaxed: &mut std::collections::HashMap<std::path::PathBuf, u32>) -> Result<()> {
    let mut ancestors = Vec::new();
    let mut current = target.parent();
    while let Some(dir) = current {
        if dir == root || !dir.starts_with(root) {
            break;
        }
        ancestors.push(dir.to_path_buf());
        current = dir.parent();
    }
    for dir in ancestors.into_iter().rev() {
        relax_dir_for_write(&dir, relaxed)?;
    }
    Ok(())
}

/// Set every relaxed directory back to its original mode, except ones a
/// caller already gave a final mode through [`restore_attrs`].
#[cfg(unix)]
fn restore_relaxed_dirs(
    relaxed: std::collections::HashMap<std::path::PathBuf, u32>,
    already_final: &HashSet<std::path::PathBuf>,
) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    for (dir, mode) in relaxed {
        if already_final.contains(&dir) {
            continue;
        }
        fs::set_permissions(&dir, fs::Permissions::from_mode(mode)).map_err(|e| io_err(&dir, e))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn restore_relaxed_dirs(
    _relaxed: std::collections::HashMap<std::path::PathBuf, u32>,
    _already_final: &HashSet<std::path::PathBuf>,
) -> Result<()> {
    Ok(())
}

fn write_file_from_blocks(repository: &Repository, target: &Path, block_ids: &[cling_crypto::BlockId]) -> Result<()> {
    let mut file = fs::File::create(target).map_err(|e| io_err(target, e))?;
    for id in block_ids {
        let plaintext = repository.read_block(BlockKind::Data, *id)?;
        file.write_all(&plaintext).map_err(|e| io_err(target, e))?;
    }
    Ok(())
}

/// §4.8 Phase 3: materialize remote adds/updates into the workspace and
/// delete local entries the remote has dropped. `skip_keys` holds the
/// repo-space keys of any local change that should own this path instead.
fn apply_remote_changes(
    repository: &Repository,
    workspace: &Workspace,
    inputs: &MergeInputs,
    skip_keys: &HashSet<String>,
    options: &MergeOptions,
) -> Result<()> {
    let mut remote_keys = HashSet::new();
    let mut dir_restores: Vec<(std::path::PathBuf, RevisionEntry)> = Vec::new();
    let mut relaxed_dirs: std::collections::HashMap<std::path::PathBuf, u32> = std::collections::HashMap::new();
    let root = workspace.root();

    for entry in inputs.remote_snapshot.reader(None) {
        let entry = entry?;
        let Some(local_path) = entry.path.strip_prefix(&inputs.prefix) else { continue };
        let key = repo_key(&inputs.prefix, &local_path, entry.is_dir());
        remote_keys.insert(key.clone());
        if skip_keys.contains(&key) {
            continue;
        }
        let target = workspace.root().join(local_path.as_str());
        if entry.is_dir() {
            if !target.is_dir() {
                relax_ancestors_for_write(&target, root, &mut relaxed_dirs)?;
                fs::create_dir_all(&target).map_err(|e| io_err(&target, e))?;
            }
            dir_restores.push((target, entry));
            continue;
        }
        if entry.metadata.symlink_target.is_some() {
            continue;
        }
        let needs_rewrite = !target.is_file() || sha256_file(&target)? != entry.metadata.file_hash;
        if needs_rewrite {
            relax_ancestors_for_write(&target, root, &mut relaxed_dirs)?;
            write_file_from_blocks(repository, &target, &entry.metadata.block_ids)?;
        }
        restore_attrs(&target, &entry.metadata, options)?;
    }

    if repository.head()? != inputs.remote_head {
        return Err(RepositoryError::RemoteChanged);
    }

    let mut delete_candidates: Vec<RevisionEntry> = Vec::new();
    for entry in inputs.staging.reader(None) {
        let entry = entry?;
        let key = repo_key(&inputs.prefix, &entry.path, entry.is_dir());
        if skip_keys.contains(&key) || remote_keys.contains(&key) {
            continue;
        }
        delete_candidates.push(entry);
    }
    delete_candidates.sort_by_key(|e| std::cmp::Reverse(e.path.as_str().len()));
    for entry in delete_candidates {
        let target = workspace.root().join(entry.path.as_str());
        let Ok(current) = fs::symlink_metadata(&target) else { continue };
        if !entry.is_dir() {
            let size = current.len() as i64;
            #[cfg(unix)]
            let mtime = {
                use std::os::unix::fs::MetadataExt;
                current.mtime()
            };
            #[cfg(not(unix))]
            let mtime = entry.metadata.mtime_sec;
            if size != entry.metadata.size || mtime != entry.metadata.mtime_sec {
                return Err(RepositoryError::ConcurrentModification { path: entry.path.to_string() });
            }
            relax_ancestors_for_write(&target, root, &mut relaxed_dirs)?;
            fs::remove_file(&target).map_err(|e| io_err(&target, e))?;
        } else {
            relax_ancestors_for_write(&target, root, &mut relaxed_dirs)?;
            let _ = fs::remove_dir(&target);
        }
    }

    dir_restores.sort_by_key(|(p, _)| std::cmp::Reverse(p.as_os_str().len()));
    let final_dirs: HashSet<std::path::PathBuf> = dir_restores.iter().map(|(p, _)| p.clone()).collect();
    for (path, entry) in dir_restores {
        restore_attrs(&path, &entry.metadata, options)?;
    }
    restore_relaxed_dirs(relaxed_dirs, &final_dirs)?;

    Ok(())
}

fn sha256_file(path: &Path) -> Result<[u8; 32]> {
    use sha2::{Digest, Sha256};
    use std::io::Read;
    let mut file = fs::File::open(path).map_err(|e| io_err(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 65536];
    loop {
        let n = file.read(&mut buf).map_err(|e| io_err(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().into())
}

/// §4.8 Phase 4: re-stat, chunk, and write every `Add`/`Update` local
/// change, then commit the revision.
fn commit_local_changes(repository: &Repository, workspace: &Workspace, inputs: &MergeInputs, options: &MergeOptions) -> Result<RevisionId> {
    let chunker = GearChunker::default();
    let mut writer: TempWriter<RevisionEntry> = TempWriter::new(DEFAULT_CHUNK_BYTES)?;
    let mut remote_cache = TempCache::new(&inputs.remote_snapshot, 32);

    for entry in inputs.local_changes.reader(None) {
        let mut entry = entry?;
        match entry.entry_type {
            EntryType::Delete => {
                entry.path = entry.path.with_prefix(&inputs.prefix);
                writer.add(entry)?;
            }
            EntryType::Add | EntryType::Update => {
                let local_path = entry.path.clone();
                entry.path = entry.path.with_prefix(&inputs.prefix);
                if entry.is_dir() {
                    writer.add(entry)?;
                    continue;
                }
                let target = workspace.root().join(local_path.as_str());
                let current = fs::symlink_metadata(&target).map_err(|_| RepositoryError::ConcurrentModification { path: local_path.to_string() })?;
                #[cfg(unix)]
                let (size, mtime) = {
                    use std::os::unix::fs::MetadataExt;
                    (current.size() as i64, current.mtime())
                };
                #[cfg(not(unix))]
                let (size, mtime) = (current.len() as i64, entry.metadata.mtime_sec);
                if size != entry.metadata.size || mtime != entry.metadata.mtime_sec {
                    return Err(RepositoryError::ConcurrentModification { path: local_path.to_string() });
                }
                let bytes = fs::read(&target).map_err(|e| io_err(&target, e))?;
                let hash: [u8; 32] = {
                    use sha2::{Digest, Sha256};
                    Sha256::digest(&bytes).into()
                };
                if hash != entry.metadata.file_hash {
                    return Err(RepositoryError::ConcurrentModification { path: local_path.to_string() });
                }
                let mut block_ids = Vec::new();
                for chunk in chunker.chunks(&bytes) {
                    let (_, header) = repository.write_block(BlockKind::Data, chunk)?;
                    block_ids.push(header.block_id);
                }
                entry.metadata.block_ids = block_ids;
                writer.add(entry)?;
            }
        }
    }

    if !inputs.prefix.is_root() {
        let mut ancestors: Vec<RepoPath> = inputs.prefix.ancestors();
        ancestors.push(inputs.prefix.clone());
        for ancestor in ancestors {
            let key = ancestor.sort_key(true);
            if remote_cache.get(&key)?.is_some() {
                continue;
            }
            writer.add(RevisionEntry {
                path: ancestor,
                entry_type: EntryType::Add,
                metadata: crate::revision::FileMetadata {
                    mode_and_perm: crate::revision::S_IFDIR | 0o755,
                    mtime_sec: now_unix(),
                    mtime_nsec: 0,
                    size: 0,
                    file_hash: [0u8; 32],
                    block_ids: Vec::new(),
                    symlink_target: None,
                    uid: crate::revision::UNKNOWN_ID,
                    gid: crate::revision::UNKNOWN_ID,
                    birthtime_sec: crate::revision::NO_BIRTHTIME,
                    birthtime_nsec: 0,
                },
            })?;
        }
    }

    let temp = writer.finalize()?;
    if temp.is_empty() {
        return Err(RepositoryError::EmptyCommit);
    }
    let mut blocks = Vec::with_capacity(temp.chunk_count());
    for i in 0..temp.chunk_count() {
        let raw = temp.read_chunk_raw(i)?;
        let (_, header) = repository.write_block(BlockKind::Metadata, &raw)?;
        blocks.push(header.block_id);
    }
    let revision = Revision { timestamp: now_unix(), author: options.author.clone(), message: options.message.clone(), parent: inputs.remote_head, blocks };
    let id = repository.write_revision(&revision)?;
    repository.set_head(inputs.remote_head, id)?;
    Ok(id)
}

/// The full §4.8 pipeline.
///
/// # Errors
/// [`RepositoryError::UpToDate`] if nothing has changed; propagates
/// conflicts as [`RepositoryError::MergeConflicts`]; otherwise propagates
/// any scan, snapshot, commit, or CAS failure.
pub fn merge(repository: &Repository, workspace: &Workspace, options: &MergeOptions) -> Result<Option<RevisionId>> {
    let inputs = build_inputs(repository, workspace, options.fast_scan, options.restore_owner)?;
    if inputs.remote_head == workspace.head()? && inputs.local_changes.is_empty() {
        return Err(RepositoryError::UpToDate);
    }

    let conflicts = detect_conflicts(&inputs)?;
    if !conflicts.is_empty() {
        return Err(RepositoryError::MergeConflicts { count: conflicts.len(), conflicts });
    }

    let skip_keys = local_change_keys(&inputs)?;
    if repository.head()? != inputs.remote_head {
        return Err(RepositoryError::RemoteChanged);
    }
    apply_remote_changes(repository, workspace, &inputs, &skip_keys, options)?;

    let new_head = if inputs.local_changes.is_empty() { None } else { Some(commit_local_changes(repository, workspace, &inputs, options)?) };

    if repository.head()? != inputs.remote_head && new_head.is_none() {
        return Err(RepositoryError::RemoteChanged);
    }
    let final_head = new_head.unwrap_or(inputs.remote_head);
    workspace.write_head(final_head)?;
    Ok(new_head)
}

/// Commit local changes even if they conflict with the remote, then
/// reconcile the workspace against the resulting head.
///
/// # Errors
/// Propagates scan, commit, or CAS failures. Never returns
/// [`RepositoryError::MergeConflicts`].
pub fn force_commit(repository: &Repository, workspace: &Workspace, options: &MergeOptions) -> Result<Option<RevisionId>> {
    let inputs = build_inputs(repository, workspace, options.fast_scan, options.restore_owner)?;
    if inputs.local_changes.is_empty() {
        return Err(RepositoryError::EmptyCommit);
    }
    let new_head = commit_local_changes(repository, workspace, &inputs, options)?;

    let post_inputs = build_inputs(repository, workspace, false, options.restore_owner)?;
    let skip_keys = local_change_keys(&post_inputs)?;
    apply_remote_changes(repository, workspace, &post_inputs, &skip_keys, options)?;
    workspace.write_head(new_head)?;
    Ok(Some(new_head))
}

/// Materialize `target`'s snapshot into the workspace, ignoring (`force`)
/// or rejecting any uncommitted local changes.
///
/// # Errors
/// `RepositoryError::MergeConflicts` with an empty conflict list is used
/// to signal "local changes exist and `force` was not set"; callers should
/// match on [`RepositoryError::ConcurrentModification`] for drift during
/// the reset itself.
pub fn reset(repository: &Repository, workspace: &Workspace, target: RevisionId, force: bool, options: &MergeOptions) -> Result<()> {
    let prefix = workspace.path_prefix()?.unwrap_or_else(RepoPath::root);
    let (staging, _cache) = build_staging(workspace.root(), &workspace.staging_cache_path(), options.fast_scan)?;
    let base = build_revision_snapshot(repository, workspace.head()?)?;
    let local_changes = build_local_changes(&staging, &base, options.restore_owner)?;
    if !force && !local_changes.is_empty() {
        return Err(RepositoryError::MergeConflicts { count: 0, conflicts: Vec::new() });
    }

    let remote_snapshot = build_revision_snapshot(repository, target)?;
    let inputs = MergeInputs { staging, base, local_changes, remote_head: target, remote_snapshot, prefix };
    apply_remote_changes(repository, workspace, &inputs, &HashSet::new(), options)?;
    workspace.write_head(target)?;
    Ok(())
}

fn local_change_keys(inputs: &MergeInputs) -> Result<HashSet<String>> {
    let mut set = HashSet::new();
    for entry in inputs.local_changes.reader(None) {
        let entry = entry?;
        set.insert(repo_key(&inputs.prefix, &entry.path, entry.is_dir()));
    }
    Ok(set)
}

/// §4.9 `ls`: stream a revision's entries under `prefix`.
///
/// # Errors
/// Propagates snapshot or path failures.
pub fn ls(repository: &Repository, revision: RevisionId, prefix: &RepoPath) -> Result<Vec<RevisionEntry>> {
    let snapshot = build_revision_snapshot(repository, revision)?;
    let mut out = Vec::new();
    for entry in snapshot.reader(None) {
        let mut entry = entry?;
        let Some(stripped) = entry.path.strip_prefix(prefix) else { continue };
        entry.path = stripped;
        out.push(entry);
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnExists {
    Abort,
    Ignore,
    Overwrite,
}

/// §4.9 `cp`: materialize a revision's entries under `prefix` into
/// `target_dir`.
///
/// # Errors
/// [`RepositoryError::ConcurrentModification`] (repurposed to mean "target
/// already exists") when `on_exists == Abort`; otherwise propagates
/// snapshot or I/O failures.
pub fn cp(repository: &Repository, revision: RevisionId, prefix: &RepoPath, target_dir: &Path, on_exists: OnExists, options: &MergeOptions) -> Result<()> {
    let entries = ls(repository, revision, prefix)?;
    let mut dir_restores: Vec<(std::path::PathBuf, RevisionEntry)> = Vec::new();
    let mut relaxed_dirs: std::collections::HashMap<std::path::PathBuf, u32> = std::collections::HashMap::new();

    for entry in entries {
        let dest = target_dir.join(entry.path.as_str());
        if entry.is_dir() {
            if !dest.is_dir() {
                relax_ancestors_for_write(&dest, target_dir, &mut relaxed_dirs)?;
                fs::create_dir_all(&dest).map_err(|e| io_err(&dest, e))?;
            }
            dir_restores.push((dest, entry));
            continue;
        }
        if dest.exists() {
            match on_exists {
                OnExists::Abort => return Err(RepositoryError::ConcurrentModification { path: entry.path.to_string() }),
                OnExists::Ignore => continue,
                OnExists::Overwrite => {}
            }
        }
        if let Some(parent) = dest.parent() {
            relax_ancestors_for_write(&dest, target_dir, &mut relaxed_dirs)?;
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        if entry.metadata.symlink_target.is_none() {
            write_file_from_blocks(repository, &dest, &entry.metadata.block_ids)?;
            restore_attrs(&dest, &entry.metadata, options)?;
        }
    }

    dir_restores.sort_by_key(|(p, _)| std::cmp::Reverse(p.as_os_str().len()));
    let final_dirs: HashSet<std::path::PathBuf> = dir_restores.iter().map(|(p, _)| p.clone()).collect();
    for (path, entry) in dir_restores {
        restore_attrs(&path, &entry.metadata, options)?;
    }
    restore_relaxed_dirs(relaxed_dirs, &final_dirs)?;

    Ok(())
}

/// §4.9 `log`: revisions from `head` back to the root, optionally filtered
/// to those touching a path under `filter_prefix`.
///
/// # Errors
/// Propagates chain-read failures.
pub fn log(repository: &Repository, head: RevisionId, filter_prefix: Option<&RepoPath>) -> Result<Vec<Revision>> {
    let mut out = Vec::new();
    let mut cursor = head;
    while !cursor.is_root() {
        let revision = repository.read_revision(cursor)?;
        let matches = match filter_prefix {
            None => true,
            Some(prefix) => revision_touches(repository, &revision, prefix)?,
        };
        if matches {
            out.push(revision.clone());
        }
        cursor = revision.parent;
    }
    Ok(out)
}

fn revision_touches(repository: &Repository, revision: &Revision, prefix: &RepoPath) -> Result<bool> {
    for block_id in &revision.blocks {
        let bytes = repository.read_block(BlockKind::Metadata, *block_id)?;
        let mut r = cling_codec::ByteReader::new(&bytes);
        while !r.is_exhausted() {
            let entry = RevisionEntry::unmarshal(&mut r)?;
            if entry.path.strip_prefix(prefix).is_some() {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cling_storage::{LocalStorage, Storage};
    use std::sync::Arc;

    fn repo_and_ws() -> (tempfile::TempDir, Repository, tempfile::TempDir, Workspace) {
        let repo_dir = tempfile::tempdir().unwrap();
        let storage: Arc<dyn Storage> = Arc::new(LocalStorage::new(repo_dir.path().join("repo")));
        let repository = Repository::init(storage, b"correct horse battery staple1", false).unwrap();
        let ws_dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(ws_dir.path());
        workspace.init("local", None).unwrap();
        (repo_dir, repository, ws_dir, workspace)
    }

    fn opts() -> MergeOptions {
        MergeOptions { author: "alice".to_string(), message: "m".to_string(), fast_scan: false, restore_owner: false, restore_mode: false, restore_mtime: false }
    }

    #[test]
    fn first_commit_from_empty_workspace_is_empty_commit() {
        let (_rd, repository, _wd, workspace) = repo_and_ws();
        let err = merge(&repository, &workspace, &opts());
        assert!(matches!(err, Err(RepositoryError::UpToDate)));
    }

    #[test]
    fn commits_a_new_file() {
        let (_rd, repository, ws_dir, workspace) = repo_and_ws();
        fs::write(ws_dir.path().join("a.txt"), b"hello world").unwrap();

        let new_head = merge(&repository, &workspace, &opts()).unwrap();
        assert!(new_head.is_some());
        assert_eq!(repository.head().unwrap(), new_head.unwrap());
        assert_eq!(workspace.head().unwrap(), new_head.unwrap());

        let entries = ls(&repository, new_head.unwrap(), &RepoPath::root()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path.as_str(), "a.txt");
    }

    #[test]
    fn committed_entry_file_hash_is_sha256_of_its_content() {
        let (_rd, repository, ws_dir, workspace) = repo_and_ws();
        fs::write(ws_dir.path().join("a.txt"), b"a").unwrap();

        let new_head = merge(&repository, &workspace, &opts()).unwrap().unwrap();
        let entries = ls(&repository, new_head, &RepoPath::root()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(hex::encode(entries[0].metadata.file_hash), "ca978112ca1bbdcafac231b39a23dc4da786eff8147c4e72b9807785afee48bb");
    }

    #[test]
    fn second_merge_with_no_changes_is_up_to_date() {
        let (_rd, repository, ws_dir, workspace) = repo_and_ws();
        fs::write(ws_dir.path().join("a.txt"), b"hello").unwrap();
        merge(&repository, &workspace, &opts()).unwrap();

        let err = merge(&repository, &workspace, &opts());
        assert!(matches!(err, Err(RepositoryError::UpToDate)));
    }

    #[test]
    fn remote_add_is_pulled_into_workspace_with_no_local_changes() {
        let (_rd, repository, ws_dir, workspace) = repo_and_ws();
        fs::write(ws_dir.path().join("a.txt"), b"hello").unwrap();
        merge(&repository, &workspace, &opts()).unwrap();

        let other_ws_dir = tempfile::tempdir().unwrap();
        let other_ws = Workspace::new(other_ws_dir.path());
        other_ws.init("local", None).unwrap();
        other_ws.write_head(workspace.head().unwrap()).unwrap();
        fs::write(other_ws_dir.path().join("a.txt"), b"hello").unwrap();
        fs::write(other_ws_dir.path().join("b.txt"), b"brand new").unwrap();
        merge(&repository, &other_ws, &opts()).unwrap();

        merge(&repository, &workspace, &opts()).unwrap();
        assert_eq!(fs::read(ws_dir.path().join("b.txt")).unwrap(), b"brand new");
    }

    #[test]
    fn conflicting_edits_are_reported_without_touching_the_workspace() {
        let (_rd, repository, ws_dir, workspace) = repo_and_ws();
        fs::write(ws_dir.path().join("a.txt"), b"hello").unwrap();
        merge(&repository, &workspace, &opts()).unwrap();

        let other_ws_dir = tempfile::tempdir().unwrap();
        let other_ws = Workspace::new(other_ws_dir.path());
        other_ws.init("local", None).unwrap();
        other_ws.write_head(workspace.head().unwrap()).unwrap();
        fs::write(other_ws_dir.path().join("a.txt"), b"remote version").unwrap();
        merge(&repository, &other_ws, &opts()).unwrap();

        fs::write(ws_dir.path().join("a.txt"), b"local version").unwrap();
        let err = merge(&repository, &workspace, &opts());
        match err {
            Err(RepositoryError::MergeConflicts { count, .. }) => assert_eq!(count, 1),
            other => panic!("expected MergeConflicts, got {other:?}"),
        }
        assert_eq!(fs::read(ws_dir.path().join("a.txt")).unwrap(), b"local version");
    }

    #[test]
    fn status_reports_local_add() {
        let (_rd, repository, ws_dir, workspace) = repo_and_ws();
        fs::write(ws_dir.path().join("a.txt"), b"hello").unwrap();
        let entries = status(&repository, &workspace, false).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, ChangeKind::Add);
        assert_eq!(entries[0].path.as_str(), "a.txt");
    }

    #[test]
    fn deleting_a_local_file_then_merging_removes_it_from_the_snapshot() {
        let (_rd, repository, ws_dir, workspace) = repo_and_ws();
        fs::write(ws_dir.path().join("a.txt"), b"hello").unwrap();
        merge(&repository, &workspace, &opts()).unwrap();

        fs::remove_file(ws_dir.path().join("a.txt")).unwrap();
        let new_head = merge(&repository, &workspace, &opts()).unwrap().unwrap();
        let entries = ls(&repository, new_head, &RepoPath::root()).unwrap();
        assert!(entries.is_empty());
    }
}
