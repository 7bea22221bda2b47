//! On-disk layout of the reference cache.
//!
//! The cache is one JSON document. Entry order is the set's insertion order;
//! payloads are base64 encoded. Writes go to a temp file in the destination
//! directory which is then renamed over the old file.

use super::{ReferenceImage, ReferenceSet};
use crate::util::{SlotWatchError, SlotWatchResult};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    entries: Vec<CacheEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    name: String,
    #[serde(with = "b64")]
    data: Vec<u8>,
    original_size: u64,
    compressed_size: u64,
    /// Seconds since the Unix epoch.
    modified: f64,
}

mod b64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD
            .decode(text.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// Reads the cache file. `Ok(None)` when it does not exist.
pub(crate) fn read(path: &Path) -> SlotWatchResult<Option<ReferenceSet>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(SlotWatchError::io(path, err)),
    };
    let file: CacheFile = serde_json::from_slice(&bytes).map_err(|err| format_error(path, err))?;
    if file.version != FORMAT_VERSION {
        return Err(format_error(
            path,
            format!("unsupported version {}", file.version),
        ));
    }

    let mut set = ReferenceSet::new();
    for entry in file.entries {
        if entry.data.len() as u64 != entry.compressed_size {
            return Err(format_error(
                path,
                format!(
                    "entry '{}' declares {} compressed bytes but holds {}",
                    entry.name,
                    entry.compressed_size,
                    entry.data.len()
                ),
            ));
        }
        let name = entry.name.clone();
        let image = ReferenceImage::from_parts(
            entry.name,
            entry.data,
            entry.original_size,
            from_epoch_secs(entry.modified),
        );
        if !set.insert(image) {
            return Err(format_error(path, format!("duplicate entry '{name}'")));
        }
    }
    Ok(Some(set))
}

/// Atomically replaces the cache file with `set`.
pub(crate) fn write(path: &Path, set: &ReferenceSet) -> SlotWatchResult<()> {
    let file = CacheFile {
        version: FORMAT_VERSION,
        entries: set
            .iter()
            .map(|image| CacheEntry {
                name: image.name().to_string(),
                data: image.compressed_bytes().to_vec(),
                original_size: image.original_size(),
                compressed_size: image.compressed_size(),
                modified: to_epoch_secs(image.modified()),
            })
            .collect(),
    };
    let json = serde_json::to_vec(&file).map_err(|err| format_error(path, err))?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|err| SlotWatchError::io(dir, err))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|err| SlotWatchError::io(dir, err))?;
    tmp.write_all(&json)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|err| SlotWatchError::io(tmp.path(), err))?;
    tmp.persist(path)
        .map_err(|err| SlotWatchError::io(path, err.error))?;
    Ok(())
}

fn format_error(path: &Path, reason: impl ToString) -> SlotWatchError {
    SlotWatchError::CacheFormat {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn to_epoch_secs(time: SystemTime) -> f64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

fn from_epoch_secs(secs: f64) -> SystemTime {
    Duration::try_from_secs_f64(secs)
        .ok()
        .and_then(|d| UNIX_EPOCH.checked_add(d))
        .unwrap_or(UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::{read, write};
    use crate::store::{ReferenceImage, ReferenceSet};
    use crate::util::SlotWatchError;
    use std::time::{Duration, UNIX_EPOCH};

    fn sample_set() -> ReferenceSet {
        let mut set = ReferenceSet::new();
        for (idx, name) in ["zeta", "alpha", "mid"].iter().enumerate() {
            let data: Vec<u8> = (0..300).map(|i| ((i * (idx + 3)) % 256) as u8).collect();
            let modified = UNIX_EPOCH + Duration::from_secs(1_700_000_000 + idx as u64);
            set.insert(ReferenceImage::compress(*name, &data, 6, modified).unwrap());
        }
        set
    }

    #[test]
    fn write_then_read_preserves_entries_and_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.json");
        let set = sample_set();
        write(&path, &set).unwrap();

        let loaded = read(&path).unwrap().unwrap();
        assert_eq!(loaded.names(), vec!["zeta", "alpha", "mid"]);
        for (a, b) in set.iter().zip(loaded.iter()) {
            assert_eq!(a.compressed_bytes(), b.compressed_bytes());
            assert_eq!(a.original_size(), b.original_size());
            assert_eq!(a.modified(), b.modified());
        }
    }

    #[test]
    fn missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read(&dir.path().join("nope.json")).unwrap().is_none());
    }

    #[test]
    fn unknown_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, br#"{"version": 99, "entries": []}"#).unwrap();
        assert!(matches!(read(&path), Err(SlotWatchError::CacheFormat { .. })));
    }

    #[test]
    fn size_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(
            &path,
            br#"{"version": 1, "entries": [{"name": "x", "data": "AAEC", "original_size": 3, "compressed_size": 7, "modified": 0.0}]}"#,
        )
        .unwrap();
        assert!(matches!(read(&path), Err(SlotWatchError::CacheFormat { .. })));
    }

    #[test]
    fn failed_write_leaves_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        write(&path, &sample_set()).unwrap();
        let before = std::fs::read(&path).unwrap();

        // A directory at the destination makes the final rename fail.
        let blocked = dir.path().join("blocked");
        std::fs::create_dir(&blocked).unwrap();
        std::fs::write(blocked.join("keep"), b"x").unwrap();
        assert!(write(&blocked, &ReferenceSet::new()).is_err());

        assert_eq!(std::fs::read(&path).unwrap(), before);
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
