//! Persistent LRU cache of source bytes, keyed by a hash of the disk cache key.
//!
//! Layout of the cache directory:
//! - `<sha256>.data` / `<sha256>.meta`: committed entry data and JSON metadata
//! - `*.tmp`: in-progress edits, deleted on open
//! - `journal.jsonl`: insert/read/remove records used for accounting and recency
//! - `.lock`: advisory lock held by the one live handle on the directory

mod editor;
mod journal;
mod snapshot;

pub use editor::Editor;
pub use snapshot::Snapshot;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::{self, File, OpenOptions, TryLockError};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Weak};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, trace, warn};

use crate::domain::errors::{CacheError, CacheResult};
use journal::{JOURNAL_FILE, Journal, JournalEntry, JournalRecord};

/// Maximum disk cache size in bytes (200 MiB default).
pub const DEFAULT_MAX_SIZE: u64 = 200 * 1024 * 1024;

/// Redundant journal records tolerated before the journal is compacted.
const COMPACT_THRESHOLD: usize = 2000;

const LOCK_FILE: &str = ".lock";
const DATA_EXT: &str = "data";
const META_EXT: &str = "meta";

/// Handles opened through [`DiskCache::shared`], by canonical directory.
static SHARED: LazyLock<Mutex<HashMap<PathBuf, Weak<Inner>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Metadata stored next to each entry's data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskMetadata {
    /// The disk cache key the entry was written for.
    pub data_key: String,
    /// Mime type of the source bytes, if known.
    pub mime_type: Option<String>,
    /// When the entry was written.
    pub stored_at: DateTime<Utc>,
}

impl DiskMetadata {
    /// Creates metadata stamped with the current time.
    #[must_use]
    pub fn new(data_key: impl Into<String>, mime_type: Option<String>) -> Self {
        Self {
            data_key: data_key.into(),
            mime_type,
            stored_at: Utc::now(),
        }
    }
}

struct State {
    entries: HashMap<String, JournalEntry>,
    order: BTreeMap<u64, String>,
    /// Open editors by entry name, with the id of the edit.
    editing: HashMap<String, u64>,
    /// Entries whose files are being deleted; they cannot be edited meanwhile.
    deleting: HashSet<String>,
    /// Entries dropped while an editor was open. The editor's outcome decides
    /// their files: a commit replaces them, an abort deletes them.
    deferred: HashSet<String>,
    size: u64,
    max_size: u64,
    next_sequence: u64,
    next_edit: u64,
    journal: Journal,
}

impl State {
    fn next_sequence(&mut self) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        sequence
    }

    fn insert(&mut self, name: String, entry: JournalEntry) {
        if let Some(old) = self.entries.insert(name.clone(), entry) {
            self.order.remove(&old.sequence);
            self.size -= old.size;
        }
        self.order.insert(entry.sequence, name);
        self.size += entry.size;
    }

    fn take(&mut self, name: &str) -> Option<JournalEntry> {
        let entry = self.entries.remove(name)?;
        self.order.remove(&entry.sequence);
        self.size -= entry.size;
        Some(entry)
    }

    /// Drops `name` from the index. Its files are queued on `doomed` unless an
    /// editor is open on it.
    fn discard(&mut self, name: &str, doomed: &mut Vec<String>) -> Option<JournalEntry> {
        let entry = self.take(name)?;
        self.append(&JournalRecord::Remove {
            name: name.to_string(),
        });
        if self.editing.contains_key(name) {
            self.deferred.insert(name.to_string());
        } else {
            self.deleting.insert(name.to_string());
            doomed.push(name.to_string());
        }
        Some(entry)
    }

    /// Evicts least recently used entries until the cache fits its budget.
    fn trim(&mut self, doomed: &mut Vec<String>) {
        while self.size > self.max_size {
            let Some(name) = self.order.values().next().cloned() else {
                break;
            };
            let Some(entry) = self.discard(&name, doomed) else {
                break;
            };
            debug!(name = %name, size = entry.size, "Evicted disk cache entry");
        }
    }

    /// Closes edit `id` of `name`. Returns true if the entry's old files were
    /// left for this edit to dispose of.
    fn finish_edit(&mut self, name: &str, id: u64) -> bool {
        if self.editing.get(name) != Some(&id) {
            return false;
        }
        self.editing.remove(name);
        self.deferred.remove(name)
    }

    fn append(&mut self, record: &JournalRecord) {
        if let Err(e) = self.journal.append(record) {
            warn!(error = %e, "Failed to append disk cache journal record");
        }
    }

    fn compact_if_needed(&mut self, directory: &Path) {
        let redundant = self.journal.records().saturating_sub(self.entries.len());
        if redundant <= COMPACT_THRESHOLD || redundant <= self.entries.len() {
            return;
        }
        let path = self.journal.path().to_path_buf();
        match Journal::rewrite(path, &self.entries) {
            Ok(journal) => {
                debug!(redundant, entries = self.entries.len(), "Compacted disk cache journal");
                self.journal = journal;
            }
            Err(e) => {
                warn!(directory = %directory.display(), error = %e, "Failed to compact disk cache journal");
            }
        }
    }
}

struct Inner {
    directory: PathBuf,
    state: Mutex<State>,
    _lock: File,
}

/// Persistent LRU cache of source bytes.
///
/// Cheap to clone; clones share the same directory handle. At most one
/// [`Editor`] per key is open at a time. Only one handle may be open on a
/// directory: a second [`open`](Self::open) on a locked directory fails with
/// [`CacheError::Locked`]; use [`shared`](Self::shared) to reuse the live one.
///
/// The index lock only guards bookkeeping and journal appends. Entry files
/// are opened through `tokio::fs`, and journal and deletion work runs on the
/// blocking pool with deletions done after the lock is released.
#[derive(Clone)]
pub struct DiskCache {
    inner: Arc<Inner>,
}

impl DiskCache {
    /// Opens the cache in `directory`, creating it if needed.
    ///
    /// Replays the journal, rebuilding it from the files on disk if it is
    /// missing or corrupt, and trims the cache to `max_size`.
    ///
    /// # Errors
    /// Returns [`CacheError::Locked`] if another handle holds the directory,
    /// or an I/O error if the directory cannot be prepared.
    pub fn open(directory: impl AsRef<Path>, max_size: u64) -> CacheResult<Self> {
        let directory = directory.as_ref();
        fs::create_dir_all(directory)?;
        let directory = directory.canonicalize()?;

        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(directory.join(LOCK_FILE))?;
        match lock.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => {
                return Err(CacheError::Locked { path: directory });
            }
            Err(TryLockError::Error(e)) => return Err(e.into()),
        }

        remove_temp_files(&directory);

        let journal_path = directory.join(JOURNAL_FILE);
        let replayed = match journal::replay(&journal_path) {
            Ok(Some(replayed)) => Some(replayed),
            Ok(None) => None,
            Err(e) => {
                warn!(directory = %directory.display(), error = %e, "Disk cache journal is corrupt, rebuilding");
                None
            }
        };

        let (entries, records, next_sequence) = match replayed {
            Some(replayed) => (replayed.entries, Some(replayed.records), replayed.next_sequence),
            None => {
                let entries = scan_entries(&directory)?;
                let next = entries.values().map(|e| e.sequence + 1).max().unwrap_or(0);
                (entries, None, next)
            }
        };

        let known = entries.len();
        let entries = reconcile(&directory, entries);
        let journal = match records {
            Some(records) if entries.len() == known => Journal::open(journal_path, records)?,
            _ => Journal::rewrite(journal_path, &entries)?,
        };

        let mut state = State {
            entries: HashMap::new(),
            order: BTreeMap::new(),
            editing: HashMap::new(),
            deleting: HashSet::new(),
            deferred: HashSet::new(),
            size: 0,
            max_size,
            next_sequence,
            next_edit: 0,
            journal,
        };
        for (name, entry) in entries {
            state.insert(name, entry);
        }

        let cache = Self {
            inner: Arc::new(Inner {
                directory,
                state: Mutex::new(state),
                _lock: lock,
            }),
        };
        let doomed = {
            let mut state = cache.inner.state.lock();
            let mut doomed = Vec::new();
            state.trim(&mut doomed);
            state.compact_if_needed(&cache.inner.directory);
            info!(
                directory = %cache.inner.directory.display(),
                entries = state.entries.len(),
                size = state.size,
                "Opened disk cache"
            );
            doomed
        };
        let _ = cache.delete_entries(doomed);
        Ok(cache)
    }

    /// Returns the live handle on `directory` if this process has one,
    /// otherwise opens a new one.
    ///
    /// # Errors
    /// Same as [`open`](Self::open).
    pub fn shared(directory: impl AsRef<Path>, max_size: u64) -> CacheResult<Self> {
        let directory = directory.as_ref();
        fs::create_dir_all(directory)?;
        let canonical = directory.canonicalize()?;

        let mut shared = SHARED.lock();
        shared.retain(|_, weak| weak.strong_count() > 0);
        if let Some(inner) = shared.get(&canonical).and_then(Weak::upgrade) {
            trace!(directory = %canonical.display(), "Reusing shared disk cache");
            return Ok(Self { inner });
        }

        let cache = Self::open(&canonical, max_size)?;
        shared.insert(canonical, Arc::downgrade(&cache.inner));
        Ok(cache)
    }

    /// Returns a snapshot of the entry for `key`, marking it recently used.
    pub async fn get(&self, key: &str) -> Option<Snapshot> {
        let name = entry_name(key);
        if !self.inner.state.lock().entries.contains_key(&name) {
            trace!(key = %key, "Disk cache miss");
            return None;
        }

        let data = match tokio::fs::File::open(self.data_path(&name)).await {
            Ok(file) => file,
            Err(e) => {
                warn!(key = %key, error = %e, "Disk cache entry vanished");
                let forgotten = self.run_blocking(move |cache| cache.forget(&name)).await;
                if let Err(e) = forgotten {
                    warn!(key = %key, error = %e, "Failed to drop vanished disk cache entry");
                }
                return None;
            }
        };
        let data_len = data.metadata().await.map(|m| m.len()).unwrap_or(0);
        let metadata = tokio::fs::File::open(self.meta_path(&name)).await.ok();

        if let Err(e) = self.run_blocking(move |cache| cache.record_read(&name)).await {
            warn!(key = %key, error = %e, "Failed to record disk cache read");
        }

        trace!(key = %key, "Disk cache hit");
        Some(Snapshot::new(key.to_string(), data, metadata, data_len))
    }

    /// Opens an editor for `key`, or `None` if one is already open or the
    /// entry's files are still being deleted.
    pub fn edit(&self, key: &str) -> Option<Editor> {
        let name = entry_name(key);
        let id = {
            let mut state = self.inner.state.lock();
            if state.editing.contains_key(&name) || state.deleting.contains(&name) {
                debug!(key = %key, "Disk cache entry is busy, not editing");
                return None;
            }
            let id = state.next_edit;
            state.next_edit += 1;
            state.editing.insert(name.clone(), id);
            id
        };
        Some(Editor::new(self.clone(), key.to_string(), name, id))
    }

    /// Removes the entry for `key`. Returns true if one was present.
    ///
    /// # Errors
    /// Returns error if the entry's files cannot be deleted.
    pub async fn remove(&self, key: &str) -> CacheResult<bool> {
        let name = entry_name(key);
        self.run_blocking(move |cache| {
            let doomed = {
                let mut state = cache.inner.state.lock();
                let mut doomed = Vec::new();
                if state.discard(&name, &mut doomed).is_none() {
                    return Ok(false);
                }
                state.compact_if_needed(&cache.inner.directory);
                doomed
            };
            cache.delete_entries(doomed)?;
            debug!(name = %name, "Removed disk cache entry");
            Ok(true)
        })
        .await?
    }

    /// Removes every entry.
    ///
    /// # Errors
    /// Returns error if files cannot be deleted.
    pub async fn clear(&self) -> CacheResult<()> {
        self.run_blocking(|cache| {
            let doomed = {
                let mut state = cache.inner.state.lock();
                let names: Vec<String> = state.entries.keys().cloned().collect();
                let mut doomed = Vec::new();
                for name in names {
                    state.discard(&name, &mut doomed);
                }
                match Journal::rewrite(cache.inner.directory.join(JOURNAL_FILE), &HashMap::new()) {
                    Ok(journal) => state.journal = journal,
                    Err(e) => warn!(error = %e, "Failed to rewrite cleared disk cache journal"),
                }
                doomed
            };
            cache.delete_entries(doomed)?;
            debug!("Cleared disk cache");
            Ok(())
        })
        .await?
    }

    /// Total bytes of committed entries.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.inner.state.lock().size
    }

    /// Budget in bytes.
    #[must_use]
    pub fn max_size(&self) -> u64 {
        self.inner.state.lock().max_size
    }

    /// Number of committed entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    /// Returns true if there are no committed entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if `key` has a committed entry.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.inner.state.lock().entries.contains_key(&entry_name(key))
    }

    /// The cache directory.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.inner.directory
    }

    pub(super) fn data_path(&self, name: &str) -> PathBuf {
        self.inner.directory.join(format!("{name}.{DATA_EXT}"))
    }

    pub(super) fn meta_path(&self, name: &str) -> PathBuf {
        self.inner.directory.join(format!("{name}.{META_EXT}"))
    }

    /// Runs `work` on the blocking pool.
    pub(super) async fn run_blocking<T, F>(&self, work: F) -> CacheResult<T>
    where
        F: FnOnce(&Self) -> T + Send + 'static,
        T: Send + 'static,
    {
        let cache = self.clone();
        tokio::task::spawn_blocking(move || work(&cache))
            .await
            .map_err(|e| CacheError::Io(std::io::Error::other(e)))
    }

    fn record_read(&self, name: &str) {
        let mut state = self.inner.state.lock();
        let Some(entry) = state.take(name) else {
            return;
        };
        let sequence = state.next_sequence();
        state.insert(name.to_string(), JournalEntry { sequence, ..entry });
        state.append(&JournalRecord::Read {
            name: name.to_string(),
            sequence,
        });
        state.compact_if_needed(&self.inner.directory);
    }

    /// Drops an entry whose data file is gone.
    fn forget(&self, name: &str) {
        let mut state = self.inner.state.lock();
        if state.take(name).is_some() {
            state.append(&JournalRecord::Remove {
                name: name.to_string(),
            });
        }
    }

    /// Records the files of edit `id` as the committed entry for `name`.
    /// Called after the files were renamed into place.
    pub(super) fn commit_edit(&self, name: &str, id: u64, size: u64) {
        let doomed = {
            let mut state = self.inner.state.lock();
            state.finish_edit(name, id);
            let sequence = state.next_sequence();
            state.insert(name.to_string(), JournalEntry { size, sequence });
            state.append(&JournalRecord::Insert {
                name: name.to_string(),
                sequence,
                size,
            });
            let mut doomed = Vec::new();
            state.trim(&mut doomed);
            state.compact_if_needed(&self.inner.directory);
            doomed
        };
        let _ = self.delete_entries(doomed);
    }

    /// Closes edit `id` of `name` without publishing anything.
    pub(super) fn abort_edit(&self, name: &str, id: u64) {
        let stale = {
            let mut state = self.inner.state.lock();
            let stale = state.finish_edit(name, id);
            if stale {
                state.deleting.insert(name.to_string());
            }
            stale
        };
        if stale {
            let _ = self.delete_entries(vec![name.to_string()]);
        }
    }

    /// Deletes the files of `names`, then allows them to be edited again.
    fn delete_entries(&self, names: Vec<String>) -> std::io::Result<()> {
        let mut result = Ok(());
        for name in names {
            if let Err(e) = self.delete_files(&name) {
                warn!(name = %name, error = %e, "Failed to delete disk cache entry files");
                if result.is_ok() {
                    result = Err(e);
                }
            }
            self.inner.state.lock().deleting.remove(&name);
        }
        result
    }

    fn delete_files(&self, name: &str) -> std::io::Result<()> {
        for path in [self.data_path(name), self.meta_path(name)] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for DiskCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskCache")
            .field("directory", &self.inner.directory)
            .finish_non_exhaustive()
    }
}

/// File name stem for `key`.
fn entry_name(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

fn remove_temp_files(directory: &Path) {
    let Ok(entries) = fs::read_dir(directory) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "tmp") {
            if let Err(e) = fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "Failed to remove stale temp file");
            }
        }
    }
}

/// Rebuilds entries from the data files on disk, ordered by modification time.
fn scan_entries(directory: &Path) -> CacheResult<HashMap<String, JournalEntry>> {
    let mut found: Vec<(String, u64, std::time::SystemTime)> = Vec::new();
    for entry in fs::read_dir(directory)?.flatten() {
        let path = entry.path();
        if path.extension().is_none_or(|ext| ext != DATA_EXT) {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        let meta_len = fs::metadata(directory.join(format!("{name}.{META_EXT}")))
            .map(|m| m.len())
            .unwrap_or(0);
        let modified = meta.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH);
        found.push((name.to_string(), meta.len() + meta_len, modified));
    }
    found.sort_by_key(|(_, _, modified)| *modified);

    Ok(found
        .into_iter()
        .zip(0u64..)
        .map(|((name, size, _), sequence)| (name, JournalEntry { size, sequence }))
        .collect())
}

/// Drops journal entries whose data file is gone and deletes entry files the
/// journal does not know about.
fn reconcile(
    directory: &Path,
    mut entries: HashMap<String, JournalEntry>,
) -> HashMap<String, JournalEntry> {
    entries.retain(|name, _| directory.join(format!("{name}.{DATA_EXT}")).exists());

    if let Ok(listing) = fs::read_dir(directory) {
        for entry in listing.flatten() {
            let path = entry.path();
            let is_entry_file = path
                .extension()
                .is_some_and(|ext| ext == DATA_EXT || ext == META_EXT);
            let known = path
                .file_stem()
                .and_then(|s| s.to_str())
                .is_some_and(|name| entries.contains_key(name));
            if is_entry_file && !known {
                debug!(path = %path.display(), "Removing orphaned disk cache file");
                let _ = fs::remove_file(&path);
            }
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_cache(max_size: u64) -> (DiskCache, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let cache = DiskCache::open(temp_dir.path(), max_size).unwrap();
        (cache, temp_dir)
    }

    async fn put(cache: &DiskCache, key: &str, data: &[u8]) {
        let mut editor = cache.edit(key).unwrap();
        editor.write_data(data).await.unwrap();
        editor.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_round_trip_with_metadata() {
        let (cache, _temp) = create_test_cache(1024 * 1024);
        let data = b"test image data";

        let mut editor = cache.edit("https://example.com/a.png").unwrap();
        editor.write_data(data).await.unwrap();
        editor
            .write_metadata(&DiskMetadata::new(
                "https://example.com/a.png",
                Some("image/png".to_string()),
            ))
            .await
            .unwrap();
        editor.commit().await.unwrap();

        let mut snapshot = cache.get("https://example.com/a.png").await.unwrap();
        assert_eq!(snapshot.read_data().await.unwrap().as_ref(), data);
        let metadata = snapshot.read_metadata().await.unwrap().unwrap();
        assert_eq!(metadata.mime_type.as_deref(), Some("image/png"));
        assert_eq!(metadata.data_key, "https://example.com/a.png");
        assert!(cache.size() > data.len() as u64);
    }

    #[tokio::test]
    async fn test_aborted_edit_leaves_no_entry() {
        let (cache, temp) = create_test_cache(1024);

        let mut editor = cache.edit("k").unwrap();
        editor.write_data(b"partial").await.unwrap();
        editor.abort();

        assert!(cache.get("k").await.is_none());
        assert_eq!(cache.size(), 0);
        let leftovers: Vec<_> = fs::read_dir(temp.path())
            .unwrap()
            .flatten()
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp" || ext == DATA_EXT))
            .collect();
        assert!(leftovers.is_empty());

        // The key is editable again once the first editor is gone.
        assert!(cache.edit("k").is_some());
    }

    #[tokio::test]
    async fn test_second_edit_is_rejected_while_open() {
        let (cache, _temp) = create_test_cache(1024);

        let first = cache.edit("k").unwrap();
        assert!(cache.edit("k").is_none());
        assert!(cache.edit("other").is_some());
        drop(first);
        assert!(cache.edit("k").is_some());
    }

    #[tokio::test]
    async fn test_commit_without_data_fails() {
        let (cache, _temp) = create_test_cache(1024);
        let editor = cache.edit("k").unwrap();

        assert!(matches!(
            editor.commit().await,
            Err(CacheError::EditorClosed(_))
        ));
        assert!(cache.edit("k").is_some());
    }

    #[tokio::test]
    async fn test_evicts_least_recently_used() {
        let (cache, _temp) = create_test_cache(10);

        put(&cache, "a", b"1234").await;
        put(&cache, "b", b"1234").await;
        // Reading "a" makes "b" the oldest entry.
        assert!(cache.get("a").await.is_some());
        put(&cache, "c", b"1234").await;

        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
        assert_eq!(cache.size(), 8);
    }

    #[tokio::test]
    async fn test_snapshot_survives_removal_and_replacement() {
        let (cache, _temp) = create_test_cache(1024);
        put(&cache, "k", b"original").await;

        let mut snapshot = cache.get("k").await.unwrap();
        assert!(cache.remove("k").await.unwrap());
        put(&cache, "k", b"replacement").await;

        assert_eq!(snapshot.read_data().await.unwrap().as_ref(), b"original");
        assert_eq!(
            cache.get("k").await.unwrap().read_data().await.unwrap().as_ref(),
            b"replacement"
        );
    }

    #[tokio::test]
    async fn test_reopen_replays_journal() {
        let temp = TempDir::new().unwrap();
        {
            let cache = DiskCache::open(temp.path(), 1024).unwrap();
            put(&cache, "a", b"aaaa").await;
            put(&cache, "b", b"bb").await;
            assert!(cache.remove("a").await.unwrap());
        }

        let cache = DiskCache::open(temp.path(), 1024).unwrap();
        assert!(!cache.contains("a"));
        assert!(cache.contains("b"));
        assert_eq!(cache.size(), 2);
    }

    #[tokio::test]
    async fn test_corrupt_journal_is_rebuilt_from_files() {
        let temp = TempDir::new().unwrap();
        {
            let cache = DiskCache::open(temp.path(), 1024).unwrap();
            put(&cache, "a", b"aaaa").await;
        }
        fs::write(temp.path().join(JOURNAL_FILE), "garbage\n").unwrap();

        let cache = DiskCache::open(temp.path(), 1024).unwrap();
        assert!(cache.contains("a"));
        assert_eq!(cache.size(), 4);
        assert_eq!(
            cache.get("a").await.unwrap().read_data().await.unwrap().as_ref(),
            b"aaaa"
        );
    }

    #[test]
    fn test_second_handle_on_directory_is_rejected() {
        let (_cache, temp) = create_test_cache(1024);

        assert!(matches!(
            DiskCache::open(temp.path(), 1024),
            Err(CacheError::Locked { .. })
        ));
    }

    #[test]
    fn test_shared_reuses_live_handle() {
        let temp = TempDir::new().unwrap();
        let first = DiskCache::shared(temp.path(), 1024).unwrap();
        let second = DiskCache::shared(temp.path(), 1024).unwrap();

        assert!(Arc::ptr_eq(&first.inner, &second.inner));

        drop(first);
        drop(second);
        // The lock is released with the last handle.
        assert!(DiskCache::open(temp.path(), 1024).is_ok());
    }

    #[tokio::test]
    async fn test_clear_removes_everything() {
        let (cache, _temp) = create_test_cache(1024);
        put(&cache, "a", b"aaaa").await;
        put(&cache, "b", b"bb").await;

        cache.clear().await.unwrap();

        assert!(cache.is_empty());
        assert_eq!(cache.size(), 0);
        assert!(cache.get("a").await.is_none());
    }

    #[tokio::test]
    async fn test_remove_during_edit_leaves_commit_intact() {
        let (cache, _temp) = create_test_cache(1024);
        put(&cache, "k", b"old").await;

        let mut editor = cache.edit("k").unwrap();
        editor.write_data(b"new!").await.unwrap();
        assert!(cache.remove("k").await.unwrap());
        assert!(!cache.contains("k"));
        // The open edit owns the files until it finishes.
        assert!(cache.data_path(&entry_name("k")).exists());

        editor.commit().await.unwrap();

        assert!(cache.contains("k"));
        assert_eq!(cache.size(), 4);
        assert_eq!(
            cache.get("k").await.unwrap().read_data().await.unwrap().as_ref(),
            b"new!"
        );
    }

    #[tokio::test]
    async fn test_eviction_during_edit_leaves_commit_intact() {
        let (cache, _temp) = create_test_cache(8);
        put(&cache, "a", b"1234").await;

        let mut editor = cache.edit("a").unwrap();
        editor.write_data(b"5678").await.unwrap();
        put(&cache, "b", b"1234").await;
        put(&cache, "c", b"1234").await;
        assert!(!cache.contains("a"));

        editor.commit().await.unwrap();

        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
        assert_eq!(cache.size(), 8);
        assert!(!cache.data_path(&entry_name("b")).exists());
        assert_eq!(
            cache.get("a").await.unwrap().read_data().await.unwrap().as_ref(),
            b"5678"
        );
    }

    #[tokio::test]
    async fn test_aborted_edit_deletes_files_removed_meanwhile() {
        let (cache, _temp) = create_test_cache(1024);
        put(&cache, "k", b"old").await;
        let data_path = cache.data_path(&entry_name("k"));

        let editor = cache.edit("k").unwrap();
        assert!(cache.remove("k").await.unwrap());
        assert!(data_path.exists());

        drop(editor);

        assert!(!data_path.exists());
        assert!(cache.edit("k").is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reads_and_writes_keep_accounting() {
        let (cache, _temp) = create_test_cache(1024 * 1024);

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    let key = format!("key-{i}");
                    put(&cache, &key, b"data").await;
                    let mut snapshot = cache.get(&key).await.unwrap();
                    assert_eq!(snapshot.read_data().await.unwrap().as_ref(), b"data");
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(cache.len(), 16);
        assert_eq!(cache.size(), 16 * 4);
    }
}
