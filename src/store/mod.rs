//! Persistent, compressed library of named reference images.
//!
//! The store keeps one immutable [`ReferenceSet`] behind an `RwLock<Arc<_>>`.
//! Writers (ingest, clear, load) build a complete new set off to the side,
//! persist it, and only then publish it with a single pointer swap. Readers
//! call [`ReferenceStore::snapshot`] once and keep using that `Arc`, so they
//! never observe a half-merged map.

pub mod codec;
mod ingest;
mod persist;

pub use ingest::{ingest_directory, IngestSummary, SUPPORTED_EXTENSIONS};

use crate::trace::{trace_event, trace_warn};
use crate::util::{SlotWatchError, SlotWatchResult};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::SystemTime;

/// Default name of the persisted cache file.
pub const DEFAULT_CACHE_FILE: &str = "image_cache.json";

/// One compressed reference image.
#[derive(Clone, Debug, PartialEq)]
pub struct ReferenceImage {
    name: String,
    compressed: Vec<u8>,
    original_size: u64,
    modified: SystemTime,
}

impl ReferenceImage {
    /// Compresses `data` at `level` and records its metadata.
    pub fn compress(
        name: impl Into<String>,
        data: &[u8],
        level: u32,
        modified: SystemTime,
    ) -> SlotWatchResult<Self> {
        let compressed = codec::compress(data, level)?;
        Ok(Self {
            name: name.into(),
            compressed,
            original_size: data.len() as u64,
            modified,
        })
    }

    pub(crate) fn from_parts(
        name: String,
        compressed: Vec<u8>,
        original_size: u64,
        modified: SystemTime,
    ) -> Self {
        Self {
            name,
            compressed,
            original_size,
            modified,
        }
    }

    /// Label of this reference (file stem at ingestion time).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Compressed payload.
    pub fn compressed_bytes(&self) -> &[u8] {
        &self.compressed
    }

    /// Size of the original file in bytes.
    pub fn original_size(&self) -> u64 {
        self.original_size
    }

    /// Size of the compressed payload in bytes.
    pub fn compressed_size(&self) -> u64 {
        self.compressed.len() as u64
    }

    /// Modification time of the source file.
    pub fn modified(&self) -> SystemTime {
        self.modified
    }

    /// Inflates the payload, verifying it reproduces `original_size` bytes.
    pub fn decompress(&self) -> SlotWatchResult<Vec<u8>> {
        codec::decompress(&self.name, &self.compressed, Some(self.original_size))
    }
}

/// Immutable, insertion-ordered map of reference images.
#[derive(Clone, Debug, Default)]
pub struct ReferenceSet {
    entries: Vec<ReferenceImage>,
    index: HashMap<String, usize>,
}

impl ReferenceSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `image`; returns `false` and leaves the set unchanged when the
    /// name is already present.
    pub fn insert(&mut self, image: ReferenceImage) -> bool {
        if self.index.contains_key(image.name()) {
            return false;
        }
        self.index.insert(image.name.clone(), self.entries.len());
        self.entries.push(image);
        true
    }

    /// Looks up a reference by name.
    pub fn get(&self, name: &str) -> Option<&ReferenceImage> {
        self.index.get(name).map(|&idx| &self.entries[idx])
    }

    /// Iterates references in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, ReferenceImage> {
        self.entries.iter()
    }

    /// Names in insertion order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(ReferenceImage::name).collect()
    }

    /// Number of references.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when the set holds no references.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of original sizes.
    pub fn total_original_size(&self) -> u64 {
        self.entries.iter().map(ReferenceImage::original_size).sum()
    }

    /// Sum of compressed sizes.
    pub fn total_compressed_size(&self) -> u64 {
        self.entries.iter().map(ReferenceImage::compressed_size).sum()
    }
}

impl<'a> IntoIterator for &'a ReferenceSet {
    type Item = &'a ReferenceImage;
    type IntoIter = std::slice::Iter<'a, ReferenceImage>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Reference library backed by exactly one cache file.
#[derive(Debug)]
pub struct ReferenceStore {
    cache_file: PathBuf,
    compression_level: u32,
    active: RwLock<Arc<ReferenceSet>>,
    // Serializes persist-then-swap sequences.
    writer: Mutex<()>,
}

impl ReferenceStore {
    /// Creates an empty store bound to `cache_file`. Nothing is read yet.
    pub fn open(cache_file: impl Into<PathBuf>, compression_level: u32) -> SlotWatchResult<Self> {
        codec::validate_level(compression_level)?;
        Ok(Self {
            cache_file: cache_file.into(),
            compression_level,
            active: RwLock::new(Arc::new(ReferenceSet::new())),
            writer: Mutex::new(()),
        })
    }

    /// Path of the persisted cache file.
    pub fn cache_file(&self) -> &Path {
        &self.cache_file
    }

    /// zlib level used for new references.
    pub fn compression_level(&self) -> u32 {
        self.compression_level
    }

    /// Returns the current set. The `Arc` stays valid across later swaps.
    pub fn snapshot(&self) -> Arc<ReferenceSet> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of references in the current set.
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// Returns true when the current set is empty.
    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Reads the persisted file and publishes its contents.
    ///
    /// A missing file yields an empty store. An unreadable or malformed file
    /// also leaves the store empty, and the error is returned for reporting.
    pub fn load(&self) -> SlotWatchResult<usize> {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        self.load_locked()
    }

    /// Alias of [`load`](Self::load) used by the reload command.
    pub fn reload(&self) -> SlotWatchResult<usize> {
        self.load()
    }

    fn load_locked(&self) -> SlotWatchResult<usize> {
        match persist::read(&self.cache_file) {
            Ok(Some(set)) => {
                let count = set.len();
                self.publish(set);
                trace_event!("store_loaded", count = count);
                Ok(count)
            }
            Ok(None) => {
                self.publish(ReferenceSet::new());
                Ok(0)
            }
            Err(err) => {
                trace_warn!(error = %err, "cache file unreadable; starting with an empty store");
                self.publish(ReferenceSet::new());
                Err(err)
            }
        }
    }

    /// Returns the decompressed bytes of `name`, or `None` if it is unknown.
    ///
    /// When the in-memory set is empty the persisted file is loaded first.
    /// Corrupt payloads surface as [`SlotWatchError::Decompress`].
    pub fn get(&self, name: &str) -> SlotWatchResult<Option<Vec<u8>>> {
        let mut snapshot = self.snapshot();
        if snapshot.is_empty() {
            let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
            // Another writer may have published while we waited.
            if self.snapshot().is_empty() {
                self.load_locked()?;
            }
            snapshot = self.snapshot();
        }
        snapshot.get(name).map(ReferenceImage::decompress).transpose()
    }

    /// Persists `set` and then publishes it.
    ///
    /// On a write failure neither the file nor the in-memory set change.
    pub fn replace(&self, set: ReferenceSet) -> SlotWatchResult<()> {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        persist::write(&self.cache_file, &set)?;
        self.publish(set);
        Ok(())
    }

    /// Removes the cache file, then empties the store. A missing file is fine.
    ///
    /// If the file cannot be removed the in-memory set is left as it was.
    pub fn clear(&self) -> SlotWatchResult<()> {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        match std::fs::remove_file(&self.cache_file) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(SlotWatchError::io(&self.cache_file, err)),
        }
        self.publish(ReferenceSet::new());
        Ok(())
    }

    fn publish(&self, set: ReferenceSet) {
        let mut active = self.active.write().unwrap_or_else(PoisonError::into_inner);
        *active = Arc::new(set);
    }
}

#[cfg(test)]
mod tests {
    use super::{ReferenceImage, ReferenceSet, ReferenceStore};
    use crate::util::SlotWatchError;
    use std::sync::Arc;
    use std::time::SystemTime;

    fn image(name: &str, fill: u8) -> ReferenceImage {
        let data = vec![fill; 64];
        ReferenceImage::compress(name, &data, 6, SystemTime::UNIX_EPOCH).unwrap()
    }

    #[test]
    fn set_preserves_insertion_order_and_rejects_duplicates() {
        let mut set = ReferenceSet::new();
        assert!(set.insert(image("rifle", 1)));
        assert!(set.insert(image("axe", 2)));
        assert!(!set.insert(image("rifle", 3)));
        assert_eq!(set.names(), vec!["rifle", "axe"]);
        assert_eq!(set.get("rifle").unwrap().decompress().unwrap(), vec![1u8; 64]);
    }

    #[test]
    fn open_rejects_invalid_level() {
        let err = ReferenceStore::open("unused.json", 11).unwrap_err();
        assert!(matches!(err, SlotWatchError::Config(_)));
    }

    #[test]
    fn snapshot_survives_swap() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReferenceStore::open(dir.path().join("cache.json"), 6).unwrap();
        let mut first = ReferenceSet::new();
        first.insert(image("a", 1));
        store.replace(first).unwrap();
        let before = store.snapshot();

        let mut second = ReferenceSet::new();
        second.insert(image("b", 2));
        store.replace(second).unwrap();

        assert_eq!(before.names(), vec!["a"]);
        assert_eq!(store.snapshot().names(), vec!["b"]);
        assert!(!Arc::ptr_eq(&before, &store.snapshot()));
    }

    #[test]
    fn get_lazily_loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let writer = ReferenceStore::open(&path, 6).unwrap();
        let mut set = ReferenceSet::new();
        set.insert(image("pickaxe", 9));
        writer.replace(set).unwrap();

        let reader = ReferenceStore::open(&path, 6).unwrap();
        assert!(reader.is_empty());
        assert_eq!(reader.get("pickaxe").unwrap(), Some(vec![9u8; 64]));
        assert_eq!(reader.get("missing").unwrap(), None);
        assert_eq!(reader.len(), 1);
    }

    #[test]
    fn clear_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReferenceStore::open(dir.path().join("never-written.json"), 6).unwrap();
        store.clear().unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn load_of_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReferenceStore::open(dir.path().join("absent.json"), 6).unwrap();
        assert_eq!(store.load().unwrap(), 0);
    }

    #[test]
    fn load_of_garbage_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, b"{ not json").unwrap();
        let store = ReferenceStore::open(&path, 6).unwrap();
        let err = store.load().unwrap_err();
        assert!(matches!(err, SlotWatchError::CacheFormat { .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn failed_clear_keeps_the_current_set() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let store = ReferenceStore::open(&path, 6).unwrap();
        let mut set = ReferenceSet::new();
        set.insert(image("rifle", 1));
        store.replace(set).unwrap();

        // A non-empty directory where the file was cannot be unlinked.
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), b"x").unwrap();

        let err = store.clear().unwrap_err();
        assert!(matches!(err, SlotWatchError::Io { .. }));
        assert_eq!(store.snapshot().names(), vec!["rifle"]);
    }
}
