//! Parallel bulk ingestion of a reference directory.

use super::{ReferenceImage, ReferenceSet, ReferenceStore};
use crate::trace::{trace_event, trace_span, trace_warn};
use crate::util::{SlotWatchError, SlotWatchResult};
use rayon::prelude::*;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// File extensions picked up by ingestion (compared case-insensitively).
pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

const MIB: f64 = 1024.0 * 1024.0;

/// Outcome of one ingestion batch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IngestSummary {
    /// References cached by this batch.
    pub images: usize,
    /// Files skipped because they could not be read or compressed.
    pub failed: usize,
    /// Wall time of the batch.
    pub elapsed: Duration,
    /// Sum of original file sizes.
    pub original_bytes: u64,
    /// Sum of compressed payload sizes.
    pub compressed_bytes: u64,
    /// True when the directory did not exist and was created empty.
    pub created_dir: bool,
}

impl IngestSummary {
    /// Compressed size as a percentage of the original size (0 when empty).
    pub fn compression_ratio(&self) -> f64 {
        if self.original_bytes == 0 {
            return 0.0;
        }
        self.compressed_bytes as f64 / self.original_bytes as f64 * 100.0
    }
}

impl fmt::Display for IngestSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Cached {} images in {:.2} seconds",
            self.images,
            self.elapsed.as_secs_f64()
        )?;
        if self.created_dir {
            writeln!(f, "Created empty reference directory")?;
        }
        if self.failed > 0 {
            writeln!(f, "Skipped {} unreadable files", self.failed)?;
        }
        writeln!(f, "Original size: {:.2}MB", self.original_bytes as f64 / MIB)?;
        writeln!(
            f,
            "Compressed size: {:.2}MB",
            self.compressed_bytes as f64 / MIB
        )?;
        write!(f, "Compression ratio: {:.1}%", self.compression_ratio())
    }
}

impl ReferenceStore {
    /// Rebuilds the store from every supported image in `dir`.
    ///
    /// Files are compressed on a dedicated pool of `workers` threads (rayon's
    /// default, the available parallelism, when `None`). Per-file failures are
    /// logged and counted in [`IngestSummary::failed`]. The new set is only
    /// published after the pool has drained and the cache file has been
    /// rewritten. A missing directory is created and reported as zero images;
    /// an empty directory leaves the store untouched.
    pub fn ingest(&self, dir: &Path, workers: Option<usize>) -> SlotWatchResult<IngestSummary> {
        let _span = trace_span!("ingest").entered();
        let start = Instant::now();

        if !dir.exists() {
            std::fs::create_dir_all(dir).map_err(|err| SlotWatchError::io(dir, err))?;
            return Ok(IngestSummary {
                created_dir: true,
                elapsed: start.elapsed(),
                ..IngestSummary::default()
            });
        }

        let paths = list_images(dir)?;
        if paths.is_empty() {
            return Ok(IngestSummary {
                elapsed: start.elapsed(),
                ..IngestSummary::default()
            });
        }

        let pool = build_pool(workers)?;
        let level = self.compression_level();
        // `collect` on an indexed parallel iterator keeps the input order and
        // returns only after every worker has finished.
        let results: Vec<(PathBuf, SlotWatchResult<ReferenceImage>)> = pool.install(|| {
            paths
                .par_iter()
                .map(|path| (path.clone(), process_file(path, level)))
                .collect()
        });

        let mut set = ReferenceSet::new();
        let mut failed = 0usize;
        for (path, result) in results {
            match result {
                Ok(image) => {
                    let name = image.name().to_string();
                    if !set.insert(image) {
                        trace_warn!(path = %path.display(), name = %name, "duplicate reference name; skipping");
                        failed += 1;
                    }
                }
                Err(err) => {
                    trace_warn!(path = %path.display(), error = %err, "failed to ingest reference");
                    failed += 1;
                }
            }
        }

        let summary = IngestSummary {
            images: set.len(),
            failed,
            elapsed: Duration::ZERO,
            original_bytes: set.total_original_size(),
            compressed_bytes: set.total_compressed_size(),
            created_dir: false,
        };
        self.replace(set)?;

        let summary = IngestSummary {
            elapsed: start.elapsed(),
            ..summary
        };
        trace_event!(
            "ingest_done",
            images = summary.images,
            failed = summary.failed,
            elapsed_ms = summary.elapsed.as_millis() as u64
        );
        Ok(summary)
    }
}

/// Ingest entry point: `(success, summary text)`.
///
/// Opens a store on `output` (or [`super::DEFAULT_CACHE_FILE`]) and ingests
/// `dir`. Errors are folded into the text instead of being returned.
pub fn ingest_directory(
    dir: &Path,
    output: Option<&Path>,
    workers: Option<usize>,
    compression_level: u32,
) -> (bool, String) {
    let cache_file = output.unwrap_or_else(|| Path::new(super::DEFAULT_CACHE_FILE));
    let result = ReferenceStore::open(cache_file, compression_level)
        .and_then(|store| store.ingest(dir, workers));
    match result {
        Ok(summary) => (true, summary.to_string()),
        Err(err) => (false, format!("Error: {err}")),
    }
}

fn build_pool(workers: Option<usize>) -> SlotWatchResult<rayon::ThreadPool> {
    if workers == Some(0) {
        return Err(SlotWatchError::Config(
            "worker count must be at least 1".to_string(),
        ));
    }
    rayon::ThreadPoolBuilder::new()
        .num_threads(workers.unwrap_or(0))
        .thread_name(|idx| format!("slotwatch-ingest-{idx}"))
        .build()
        .map_err(|err| SlotWatchError::Config(format!("cannot build ingest pool: {err}")))
}

fn list_images(dir: &Path) -> SlotWatchResult<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|err| SlotWatchError::io(dir, err))?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| SlotWatchError::io(dir, err))?;
        let path = entry.path();
        // Anything that is not a directory is attempted; unreadable entries
        // are counted as failures by the batch.
        if !path.is_dir() && is_supported(&path) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

fn process_file(path: &Path, level: u32) -> SlotWatchResult<ReferenceImage> {
    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .ok_or_else(|| SlotWatchError::Config(format!("{} has no file name", path.display())))?;
    let data = std::fs::read(path).map_err(|err| SlotWatchError::io(path, err))?;
    let modified = std::fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map_err(|err| SlotWatchError::io(path, err))?;
    ReferenceImage::compress(name, &data, level, modified)
}
