//! Content-addressable on-disk byte cache.
//!
//! Each entry is addressed by a caller-supplied key (typically the
//! canonical source URL) and stores two co-located byte streams: the raw
//! data and a metadata sidecar (see [`crate::cache::meta`]). On disk an
//! entry is `<sha256(key)>.data` plus `<sha256(key)>.meta` under the
//! cache root; writes stage into `.tmp` siblings and become visible via
//! rename, so readers only ever observe complete entries.
//!
//! Concurrency discipline:
//! - at most one live [`Editor`] per key; further `edit` calls return
//!   `None` until the editor commits or aborts,
//! - any number of [`Snapshot`]s may coexist; a snapshot owns its bytes,
//!   so a later commit never mutates data handed out earlier,
//! - dropping an editor without committing aborts it, which removes the
//!   staged files and releases the exclusive slot.
//!
//! The cache is a single shared instance; cloning shares storage and the
//! internal index, and all synchronization is internal.

use crate::error::{CacheError, Error, Result};
use lru::LruCache;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

const DEFAULT_MAX_BYTES: u64 = 512 * 1024 * 1024;

/// Shared handle to the on-disk cache.
#[derive(Clone)]
pub struct DiskCache {
  inner: Arc<Inner>,
}

struct Inner {
  root: PathBuf,
  max_bytes: u64,
  state: Mutex<State>,
}

struct State {
  /// Keys (hashed) with a live editor; these are excluded from reads,
  /// removal, and eviction until the editor finishes.
  editors: HashSet<String>,
  /// Committed entries in recency order, mapping hash to on-disk bytes.
  entries: LruCache<String, u64>,
  total_bytes: u64,
}

/// Read-only handle to one committed entry's two byte streams.
///
/// Snapshots own their bytes; clones share them.
#[derive(Clone)]
pub struct Snapshot {
  data: Arc<Vec<u8>>,
  metadata: Arc<Vec<u8>>,
}

impl Snapshot {
  pub fn data(&self) -> &[u8] {
    &self.data
  }

  pub fn metadata(&self) -> &[u8] {
    &self.metadata
  }

  /// Shares the data stream without copying.
  pub fn into_data(self) -> Arc<Vec<u8>> {
    self.data
  }
}

impl DiskCache {
  /// Opens (creating if needed) a cache rooted at `root` with the
  /// default byte budget.
  pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
    Self::with_max_bytes(root, DEFAULT_MAX_BYTES)
  }

  /// Opens a cache with an explicit byte budget. `0` disables eviction.
  pub fn with_max_bytes(root: impl Into<PathBuf>, max_bytes: u64) -> Result<Self> {
    let root = root.into();
    fs::create_dir_all(&root)?;
    let state = scan_entries(&root)?;
    Ok(Self {
      inner: Arc::new(Inner {
        root,
        max_bytes,
        state: Mutex::new(state),
      }),
    })
  }

  pub fn root(&self) -> &Path {
    &self.inner.root
  }

  pub fn max_bytes(&self) -> u64 {
    self.inner.max_bytes
  }

  /// Total bytes currently accounted to committed entries.
  pub fn size(&self) -> u64 {
    self.inner.lock_state().total_bytes
  }

  pub fn entry_count(&self) -> usize {
    self.inner.lock_state().entries.len()
  }

  /// Opens a snapshot of the committed entry under `key`, if any.
  ///
  /// Returns `Ok(None)` while an editor holds the key or when no entry
  /// exists. I/O failures on an indexed entry propagate; the entry is
  /// dropped from the index so a corrupt file is not retried forever.
  pub fn snapshot(&self, key: &str) -> Result<Option<Snapshot>> {
    let hash = hash_key(key);

    // An edit may land between the slot check and the file reads; the
    // post-read check below catches that window and retries once.
    for _ in 0..2 {
      {
        let mut state = self.inner.lock_state();
        if state.editors.contains(&hash) {
          return Ok(None);
        }
        if state.entries.get(&hash).is_none() {
          return Ok(None);
        }
      }

      let metadata = match read_entry_file(&self.inner.meta_path(&hash)) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => {
          self.inner.forget(&hash);
          return Ok(None);
        }
        Err(err) => {
          self.inner.forget(&hash);
          return Err(err);
        }
      };
      let data = match read_entry_file(&self.inner.data_path(&hash)) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => {
          self.inner.forget(&hash);
          return Ok(None);
        }
        Err(err) => {
          self.inner.forget(&hash);
          return Err(err);
        }
      };

      let clean = !self.inner.lock_state().editors.contains(&hash);
      if clean {
        return Ok(Some(Snapshot {
          data: Arc::new(data),
          metadata: Arc::new(metadata),
        }));
      }
    }

    Ok(None)
  }

  /// Claims the exclusive editor slot for `key`.
  ///
  /// Returns `None` while another editor for the same key is live.
  pub fn edit(&self, key: &str) -> Option<Editor> {
    let hash = hash_key(key);
    {
      let mut state = self.inner.lock_state();
      if !state.editors.insert(hash.clone()) {
        return None;
      }
    }
    Some(Editor {
      inner: Arc::clone(&self.inner),
      key: key.to_string(),
      hash,
      data_written: false,
      meta_written: false,
      finished: false,
    })
  }

  /// Removes the committed entry under `key`.
  ///
  /// Returns `Ok(false)` when the key has a live editor (the writer owns
  /// the slot) or no committed entry exists.
  pub fn remove(&self, key: &str) -> Result<bool> {
    let hash = hash_key(key);
    {
      let mut state = self.inner.lock_state();
      if state.editors.contains(&hash) {
        return Ok(false);
      }
      match state.entries.pop(&hash) {
        Some(bytes) => state.total_bytes = state.total_bytes.saturating_sub(bytes),
        None => return Ok(false),
      }
    }
    self.inner.remove_files(&hash);
    Ok(true)
  }

  /// Removes every committed entry not currently being edited.
  pub fn clear(&self) -> Result<()> {
    let hashes: Vec<String> = {
      let mut state = self.inner.lock_state();
      let mut hashes = Vec::with_capacity(state.entries.len());
      let mut kept = Vec::new();
      while let Some((hash, bytes)) = state.entries.pop_lru() {
        if state.editors.contains(&hash) {
          kept.push((hash, bytes));
          continue;
        }
        state.total_bytes = state.total_bytes.saturating_sub(bytes);
        hashes.push(hash);
      }
      for (hash, bytes) in kept {
        state.entries.put(hash, bytes);
      }
      hashes
    };
    for hash in &hashes {
      self.inner.remove_files(hash);
    }
    Ok(())
  }
}

impl Inner {
  fn lock_state(&self) -> std::sync::MutexGuard<'_, State> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn data_path(&self, hash: &str) -> PathBuf {
    self.root.join(format!("{hash}.data"))
  }

  fn meta_path(&self, hash: &str) -> PathBuf {
    self.root.join(format!("{hash}.meta"))
  }

  fn forget(&self, hash: &str) {
    let mut state = self.lock_state();
    if let Some(bytes) = state.entries.pop(hash) {
      state.total_bytes = state.total_bytes.saturating_sub(bytes);
    }
  }

  fn remove_files(&self, hash: &str) {
    let _ = fs::remove_file(self.data_path(hash));
    let _ = fs::remove_file(self.meta_path(hash));
  }

  fn release_editor(&self, hash: &str) {
    let mut state = self.lock_state();
    state.editors.remove(hash);
  }

  /// Records a committed entry and evicts least-recently-used entries
  /// past the byte budget. Entries with live editors are skipped.
  fn record_commit(&self, hash: &str, bytes: u64) {
    let evicted: Vec<String> = {
      let mut state = self.lock_state();
      if let Some(previous) = state.entries.put(hash.to_string(), bytes) {
        state.total_bytes = state.total_bytes.saturating_sub(previous);
      }
      state.total_bytes += bytes;

      if self.max_bytes == 0 {
        return;
      }

      let mut evicted = Vec::new();
      let mut skipped = Vec::new();
      while state.total_bytes > self.max_bytes {
        let Some((lru_hash, lru_bytes)) = state.entries.pop_lru() else {
          break;
        };
        if state.editors.contains(&lru_hash) || lru_hash == hash {
          skipped.push((lru_hash, lru_bytes));
          continue;
        }
        state.total_bytes = state.total_bytes.saturating_sub(lru_bytes);
        evicted.push(lru_hash);
      }
      for (skipped_hash, skipped_bytes) in skipped {
        state.entries.put(skipped_hash, skipped_bytes);
      }
      evicted
    };

    for hash in &evicted {
      self.remove_files(hash);
    }
    if !evicted.is_empty() {
      log::debug!("disk cache evicted {} entries", evicted.len());
    }
  }
}

/// Exclusive, uncommitted write handle for one entry.
///
/// Stream writes land in `.tmp` staging files; nothing becomes visible
/// until [`Editor::commit`]. Dropping the editor aborts it.
pub struct Editor {
  inner: Arc<Inner>,
  key: String,
  hash: String,
  data_written: bool,
  meta_written: bool,
  finished: bool,
}

impl Editor {
  pub fn key(&self) -> &str {
    &self.key
  }

  /// Stages the entry's data stream.
  pub fn write_data(&mut self, bytes: &[u8]) -> Result<()> {
    fs::write(self.data_tmp(), bytes)?;
    self.data_written = true;
    Ok(())
  }

  /// Stages the entry's metadata stream.
  pub fn write_metadata(&mut self, bytes: &[u8]) -> Result<()> {
    fs::write(self.meta_tmp(), bytes)?;
    self.meta_written = true;
    Ok(())
  }

  /// Atomically publishes the staged streams.
  pub fn commit(mut self) -> Result<()> {
    self.finish()?;
    Ok(())
  }

  /// Commits and immediately reopens the entry as a snapshot, so the
  /// caller can serve the just-written bytes without a second fetch.
  pub fn commit_and_open(mut self) -> Result<Snapshot> {
    let (data_path, meta_path) = self.finish()?;
    let metadata = fs::read(&meta_path).map_err(|err| corrupt(&self.key, &err))?;
    let data = fs::read(&data_path).map_err(|err| corrupt(&self.key, &err))?;
    Ok(Snapshot {
      data: Arc::new(data),
      metadata: Arc::new(metadata),
    })
  }

  /// Discards the staged streams and releases the exclusive slot.
  pub fn abort(mut self) {
    self.cleanup();
  }

  fn data_tmp(&self) -> PathBuf {
    self.inner.root.join(format!("{}.data.tmp", self.hash))
  }

  fn meta_tmp(&self) -> PathBuf {
    self.inner.root.join(format!("{}.meta.tmp", self.hash))
  }

  fn finish(&mut self) -> Result<(PathBuf, PathBuf)> {
    if !self.data_written {
      let key = self.key.clone();
      self.cleanup();
      return Err(Error::Cache(CacheError::EmptyEditor { key }));
    }
    if !self.meta_written {
      // An entry always carries both streams; absent metadata is stored
      // as an empty record.
      if let Err(err) = self.write_metadata(&crate::cache::meta::EntryMetadata::default().to_bytes()) {
        self.cleanup();
        return Err(err);
      }
    }

    let data_tmp = self.data_tmp();
    let meta_tmp = self.meta_tmp();
    let bytes = staged_len(&data_tmp).saturating_add(staged_len(&meta_tmp));

    let data_path = self.inner.data_path(&self.hash);
    let meta_path = self.inner.meta_path(&self.hash);

    if let Err(err) = fs::rename(&data_tmp, &data_path) {
      self.cleanup();
      return Err(err.into());
    }
    if let Err(err) = fs::rename(&meta_tmp, &meta_path) {
      // Half-published entries are unreadable; take the data file back out.
      let _ = fs::remove_file(&data_path);
      self.cleanup();
      return Err(err.into());
    }

    self.inner.record_commit(&self.hash, bytes);
    self.inner.release_editor(&self.hash);
    self.finished = true;
    Ok((data_path, meta_path))
  }

  fn cleanup(&mut self) {
    if self.finished {
      return;
    }
    let _ = fs::remove_file(self.data_tmp());
    let _ = fs::remove_file(self.meta_tmp());
    self.inner.release_editor(&self.hash);
    self.finished = true;
  }
}

impl Drop for Editor {
  fn drop(&mut self) {
    // Failure to commit or abort must not leak the exclusive slot.
    self.cleanup();
  }
}

fn corrupt(key: &str, err: &std::io::Error) -> Error {
  Error::Cache(CacheError::CorruptEntry {
    key: key.to_string(),
    reason: err.to_string(),
  })
}

fn staged_len(path: &Path) -> u64 {
  fs::metadata(path).map(|meta| meta.len()).unwrap_or(0)
}

fn hash_key(key: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(key.as_bytes());
  let digest = hasher.finalize();
  const HEX: &[u8; 16] = b"0123456789abcdef";
  let mut out = String::with_capacity(64);
  for &b in digest.iter() {
    out.push(HEX[(b >> 4) as usize] as char);
    out.push(HEX[(b & 0x0f) as usize] as char);
  }
  out
}

fn read_entry_file(path: &Path) -> Result<Option<Vec<u8>>> {
  match fs::read(path) {
    Ok(bytes) => Ok(Some(bytes)),
    Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
    Err(err) => Err(err.into()),
  }
}

/// Builds the initial index from the files already on disk.
///
/// Stale `.tmp` staging files from a previous crash are discarded;
/// data files without a metadata sibling (and vice versa) are dropped.
fn scan_entries(root: &Path) -> Result<State> {
  let mut found: Vec<(String, u64, SystemTime)> = Vec::new();

  for entry in fs::read_dir(root)? {
    let entry = entry?;
    let path = entry.path();
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
      continue;
    };

    if name.ends_with(".tmp") {
      let _ = fs::remove_file(&path);
      continue;
    }

    let Some(hash) = name.strip_suffix(".data") else {
      continue;
    };
    let meta_path = root.join(format!("{hash}.meta"));
    let Ok(meta_len) = fs::metadata(&meta_path).map(|m| m.len()) else {
      let _ = fs::remove_file(&path);
      continue;
    };
    let Ok(file_meta) = entry.metadata() else {
      continue;
    };
    let modified = file_meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
    found.push((hash.to_string(), file_meta.len() + meta_len, modified));
  }

  // Oldest entries first so they are the first eviction candidates.
  found.sort_by_key(|(_, _, modified)| *modified);

  let mut entries = LruCache::unbounded();
  let mut total_bytes = 0u64;
  for (hash, bytes, _) in found {
    total_bytes += bytes;
    entries.put(hash, bytes);
  }

  Ok(State {
    editors: HashSet::new(),
    entries,
    total_bytes,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::meta::EntryMetadata;

  fn cache() -> (tempfile::TempDir, DiskCache) {
    let dir = tempfile::tempdir().expect("temp dir");
    let cache = DiskCache::open(dir.path()).expect("open cache");
    (dir, cache)
  }

  fn write_entry(cache: &DiskCache, key: &str, data: &[u8], meta: &[u8]) {
    let mut editor = cache.edit(key).expect("editor");
    editor.write_data(data).unwrap();
    editor.write_metadata(meta).unwrap();
    editor.commit().unwrap();
  }

  #[test]
  fn commit_then_snapshot_round_trips_both_streams() {
    let (_dir, cache) = cache();
    let meta = EntryMetadata::new(10, 20, vec![("Content-Type".into(), "image/png".into())]);

    let mut editor = cache.edit("https://example.com/a.png").expect("editor");
    editor.write_data(b"payload").unwrap();
    editor.write_metadata(&meta.to_bytes()).unwrap();
    let snapshot = editor.commit_and_open().unwrap();

    assert_eq!(snapshot.data(), b"payload");
    assert_eq!(EntryMetadata::parse(snapshot.metadata()).unwrap(), meta);

    let reopened = cache.snapshot("https://example.com/a.png").unwrap().unwrap();
    assert_eq!(reopened.data(), b"payload");
    assert_eq!(EntryMetadata::parse(reopened.metadata()).unwrap(), meta);
  }

  #[test]
  fn abort_leaves_no_entry_behind() {
    let (_dir, cache) = cache();
    let mut editor = cache.edit("k").expect("editor");
    editor.write_data(b"partial").unwrap();
    editor.abort();

    assert!(cache.snapshot("k").unwrap().is_none());
    assert_eq!(cache.entry_count(), 0);
    // The slot is released: a new editor is available immediately.
    assert!(cache.edit("k").is_some());
  }

  #[test]
  fn abort_preserves_previously_committed_entry() {
    let (_dir, cache) = cache();
    write_entry(&cache, "k", b"old", &EntryMetadata::default().to_bytes());

    let mut editor = cache.edit("k").expect("editor");
    editor.write_data(b"new").unwrap();
    editor.abort();

    let snapshot = cache.snapshot("k").unwrap().expect("old entry intact");
    assert_eq!(snapshot.data(), b"old");
  }

  #[test]
  fn only_one_live_editor_per_key() {
    let (_dir, cache) = cache();
    let editor = cache.edit("k").expect("first editor");
    assert!(cache.edit("k").is_none(), "slot must be exclusive");
    // A different key is unaffected.
    assert!(cache.edit("other").is_some());
    drop(editor);
    assert!(cache.edit("k").is_some(), "drop releases the slot");
  }

  #[test]
  fn snapshot_misses_while_editor_is_live() {
    let (_dir, cache) = cache();
    write_entry(&cache, "k", b"data", &EntryMetadata::default().to_bytes());

    let editor = cache.edit("k").expect("editor");
    assert!(cache.snapshot("k").unwrap().is_none());
    drop(editor);
    assert!(cache.snapshot("k").unwrap().is_some());
  }

  #[test]
  fn snapshots_keep_bytes_across_commit() {
    let (_dir, cache) = cache();
    write_entry(&cache, "k", b"first", &EntryMetadata::default().to_bytes());
    let snapshot = cache.snapshot("k").unwrap().unwrap();

    write_entry(&cache, "k", b"second", &EntryMetadata::default().to_bytes());

    // The earlier snapshot still serves the bytes it was opened on.
    assert_eq!(snapshot.data(), b"first");
    let fresh = cache.snapshot("k").unwrap().unwrap();
    assert_eq!(fresh.data(), b"second");
  }

  #[test]
  fn commit_without_data_fails_and_releases_slot() {
    let (_dir, cache) = cache();
    let editor = cache.edit("k").expect("editor");
    let err = editor.commit().unwrap_err();
    assert!(matches!(err, Error::Cache(CacheError::EmptyEditor { .. })));
    assert!(cache.edit("k").is_some());
  }

  #[test]
  fn remove_deletes_entry_and_reports_absence() {
    let (_dir, cache) = cache();
    write_entry(&cache, "k", b"data", &EntryMetadata::default().to_bytes());

    assert!(cache.remove("k").unwrap());
    assert!(!cache.remove("k").unwrap());
    assert!(cache.snapshot("k").unwrap().is_none());
  }

  #[test]
  fn eviction_drops_least_recently_used_past_budget() {
    let dir = tempfile::tempdir().expect("temp dir");
    // Each entry costs its data plus a 6-byte default metadata record.
    let cache = DiskCache::with_max_bytes(dir.path(), 60).expect("open");

    write_entry(&cache, "a", &[0u8; 20], &EntryMetadata::default().to_bytes());
    write_entry(&cache, "b", &[0u8; 20], &EntryMetadata::default().to_bytes());
    // Touch "a" so "b" is the eviction candidate.
    assert!(cache.snapshot("a").unwrap().is_some());
    write_entry(&cache, "c", &[0u8; 20], &EntryMetadata::default().to_bytes());

    assert!(cache.snapshot("a").unwrap().is_some());
    assert!(cache.snapshot("b").unwrap().is_none(), "LRU entry evicted");
    assert!(cache.snapshot("c").unwrap().is_some());
    assert!(cache.size() <= 60);
  }

  #[test]
  fn reopen_rebuilds_index_from_disk() {
    let dir = tempfile::tempdir().expect("temp dir");
    {
      let cache = DiskCache::open(dir.path()).expect("open");
      write_entry(&cache, "k", b"persisted", &EntryMetadata::default().to_bytes());
    }

    let reopened = DiskCache::open(dir.path()).expect("reopen");
    assert_eq!(reopened.entry_count(), 1);
    let snapshot = reopened.snapshot("k").unwrap().expect("entry survives reopen");
    assert_eq!(snapshot.data(), b"persisted");
  }

  #[test]
  fn reopen_discards_stale_staging_files() {
    let dir = tempfile::tempdir().expect("temp dir");
    fs::write(dir.path().join("deadbeef.data.tmp"), b"stale").unwrap();
    fs::write(dir.path().join("orphan.data"), b"no meta").unwrap();

    let cache = DiskCache::open(dir.path()).expect("open");
    assert_eq!(cache.entry_count(), 0);
    assert!(!dir.path().join("deadbeef.data.tmp").exists());
    assert!(!dir.path().join("orphan.data").exists());
  }

  #[test]
  fn concurrent_snapshots_share_committed_bytes() {
    let (_dir, cache) = cache();
    write_entry(&cache, "k", b"shared", &EntryMetadata::default().to_bytes());

    let first = cache.snapshot("k").unwrap().unwrap();
    let second = cache.snapshot("k").unwrap().unwrap();
    let third = first.clone();
    assert_eq!(first.data(), second.data());
    assert_eq!(third.data(), b"shared");
  }

  #[test]
  fn clear_removes_all_committed_entries() {
    let (_dir, cache) = cache();
    write_entry(&cache, "a", b"1", &EntryMetadata::default().to_bytes());
    write_entry(&cache, "b", b"2", &EntryMetadata::default().to_bytes());

    cache.clear().unwrap();
    assert_eq!(cache.entry_count(), 0);
    assert_eq!(cache.size(), 0);
    assert!(cache.snapshot("a").unwrap().is_none());
  }
}
