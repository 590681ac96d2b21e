// Copyright 2020-2023 Andrew D. Straw.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT
// or http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! On-disk cache of [FileSummary] values.
//!
//! Each frame file has two candidate cache files:
//!
//! - [CacheLocation::Export]: `<frame dir>/cache/<frame name>.cache`, i.e.
//!   stored alongside the data so every user of the data tree benefits.
//! - [CacheLocation::Local]: `<local root>/cache/<day>/<stream>/<frame
//!   name>.cache`, for data trees which are read-only.
//!
//! Both are consulted in that order. On a miss the frame file is parsed and
//! the summary written to the configured [CacheDestination].

use std::{
    io::Write,
    path::{Path, PathBuf},
};

use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    config::{CacheDestination, ScanConfig},
    summary::{read_frame_timestamps, FileSummary},
};

const CACHE_FILE_SUFFIX: &str = ".cache";

/// A place where a cached summary may be stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLocation {
    Export,
    Local,
}

impl From<CacheDestination> for CacheLocation {
    fn from(orig: CacheDestination) -> Self {
        match orig {
            CacheDestination::Export => CacheLocation::Export,
            CacheDestination::Local => CacheLocation::Local,
        }
    }
}

/// Counters of cache activity during one run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Number of summaries requested.
    pub searched: u64,
    /// Number of summaries read from a cache file.
    pub found: u64,
    /// Number of cache files written.
    pub created: u64,
}

/// Lookup and write-back of frame file summaries.
#[derive(Debug)]
pub struct SummaryCache {
    lookup_order: Vec<CacheLocation>,
    destination: CacheLocation,
    cache_dir_name: String,
    local_root: PathBuf,
    tolerance: f64,
    timestamp_column: usize,
    comment_marker: char,
    stats: CacheStats,
}

impl SummaryCache {
    pub fn new(cfg: &ScanConfig) -> Self {
        Self {
            lookup_order: vec![CacheLocation::Export, CacheLocation::Local],
            destination: cfg.cache_destination.into(),
            cache_dir_name: cfg.cache_dir_name.clone(),
            local_root: cfg.local_cache_root.clone(),
            tolerance: cfg.cadence_tolerance,
            timestamp_column: cfg.timestamp_column,
            comment_marker: cfg.comment_marker,
            stats: CacheStats::default(),
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Path of the cache file for `source` at `location`.
    ///
    /// Returns `None` if `source` has no file name.
    pub fn cache_path(&self, location: CacheLocation, source: &Path) -> Option<PathBuf> {
        let mut fname = source.file_name()?.to_os_string();
        fname.push(CACHE_FILE_SUFFIX);
        let path = match location {
            CacheLocation::Export => {
                let dir = source.parent().unwrap_or_else(|| Path::new(""));
                dir.join(&self.cache_dir_name).join(fname)
            }
            CacheLocation::Local => {
                // Mirror the `<day>/<stream>` directories of the source so that
                // equal file names from different days do not collide.
                let mut path = self.local_root.join(&self.cache_dir_name);
                let stream_dir = source.parent();
                let day_dir = stream_dir.and_then(Path::parent);
                for dir in [day_dir, stream_dir].into_iter().flatten() {
                    if let Some(name) = dir.file_name() {
                        path.push(name);
                    }
                }
                path.join(fname)
            }
        };
        Some(path)
    }

    /// Return the summary of `source`, from cache if possible.
    ///
    /// Never fails: an unreadable source gives [FileSummary::empty] and a
    /// failure to write the cache only logs a warning.
    pub fn get_summary(&mut self, source: &Path) -> FileSummary {
        self.stats.searched += 1;

        for location in self.lookup_order.iter() {
            let Some(path) = self.cache_path(*location, source) else {
                continue;
            };
            if let Some(summary) = read_cache_file(&path, source) {
                debug!("cache hit {}", path.display());
                self.stats.found += 1;
                return summary;
            }
        }

        let timestamps =
            match read_frame_timestamps(source, self.timestamp_column, self.comment_marker) {
                Ok(timestamps) => timestamps,
                Err(e) => {
                    debug!("cannot read {}: {e}", source.display());
                    return FileSummary::empty();
                }
            };
        let summary = FileSummary::from_timestamps(timestamps, self.tolerance);

        if let Some(path) = self.cache_path(self.destination, source) {
            match write_cache_file(&path, &summary) {
                Ok(()) => {
                    debug!("created cache {}", path.display());
                    self.stats.created += 1;
                }
                Err(e) => {
                    warn!("could not write cache file {}: {e}", path.display());
                }
            }
        }
        summary
    }
}

/// Create `dir` and its parents if needed. Succeeds if `dir` already exists.
pub fn ensure_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)
}

/// Write `summary` to `path`, replacing any previous content.
///
/// The content goes to a temporary file in the same directory which is then
/// renamed over `path`, so readers never see a partially written file.
pub fn write_cache_file(path: &Path, summary: &FileSummary) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    ensure_dir(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(summary.encode().as_bytes())?;
    tmp.persist(path)?;
    Ok(())
}

/// Read a cache file written by [write_cache_file].
///
/// Returns `None` if the cache file is missing, malformed, or older than
/// `source`.
pub fn read_cache_file(path: &Path, source: &Path) -> Option<FileSummary> {
    let buf = std::fs::read_to_string(path).ok()?;
    if is_stale(path, source) {
        debug!("stale cache {}", path.display());
        return None;
    }
    let summary = FileSummary::decode(&buf);
    if summary.is_none() {
        debug!("malformed cache {}", path.display());
    }
    summary
}

fn is_stale(cache: &Path, source: &Path) -> bool {
    let modified = |p: &Path| std::fs::metadata(p).and_then(|m| m.modified()).ok();
    match (modified(cache), modified(source)) {
        (Some(cache_time), Some(source_time)) => source_time > cache_time,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_in(root: &Path, destination: CacheDestination) -> SummaryCache {
        let cfg = ScanConfig {
            cache_destination: destination,
            local_cache_root: root.join("local"),
            ..Default::default()
        };
        SummaryCache::new(&cfg)
    }

    fn write_frames(path: &Path, timestamps: &[f64]) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut buf = String::from("# cnt a b c time\n");
        for (i, t) in timestamps.iter().enumerate() {
            buf.push_str(&format!("{i} 0 0 0 {t} 0\n"));
        }
        std::fs::write(path, buf).unwrap();
    }

    #[test]
    fn cache_paths() {
        let cache = cache_in(Path::new("/tmp/x"), CacheDestination::Local);
        let source = Path::new("/data/20240305/cam/cam_12:00:00.000000.txt");
        assert_eq!(
            cache.cache_path(CacheLocation::Export, source).unwrap(),
            Path::new("/data/20240305/cam/cache/cam_12:00:00.000000.txt.cache")
        );
        assert_eq!(
            cache.cache_path(CacheLocation::Local, source).unwrap(),
            Path::new("/tmp/x/local/cache/20240305/cam/cam_12:00:00.000000.txt.cache")
        );
    }

    #[test]
    fn miss_then_hit() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("20240305/cam/cam_12:00:00.000000.txt");
        write_frames(&source, &[100.0, 100.5, 101.0, 101.5]);

        let mut cache = cache_in(tmp.path(), CacheDestination::Local);
        let first = cache.get_summary(&source);
        assert_eq!(
            first,
            FileSummary::ConstantCadence {
                count: 4,
                start: 100.0,
                end: 101.5
            }
        );
        assert_eq!(
            cache.stats(),
            CacheStats {
                searched: 1,
                found: 0,
                created: 1
            }
        );
        assert!(cache
            .cache_path(CacheLocation::Local, &source)
            .unwrap()
            .exists());

        let second = cache.get_summary(&source);
        assert_eq!(first, second);
        assert_eq!(
            cache.stats(),
            CacheStats {
                searched: 2,
                found: 1,
                created: 1
            }
        );
    }

    #[test]
    fn export_location_wins() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("20240305/cam/cam_12:00:00.000000.txt");
        write_frames(&source, &[1.0, 2.0, 4.0]);

        let cache = cache_in(tmp.path(), CacheDestination::Export);
        let export = cache.cache_path(CacheLocation::Export, &source).unwrap();
        let local = cache.cache_path(CacheLocation::Local, &source).unwrap();
        let marker = FileSummary::Exact {
            timestamps: vec![7.0],
        };
        write_cache_file(&export, &marker).unwrap();
        write_cache_file(&local, &FileSummary::empty()).unwrap();

        let mut cache = cache;
        assert_eq!(cache.get_summary(&source), marker);
        assert_eq!(cache.stats().found, 1);
    }

    #[test]
    fn malformed_cache_is_a_miss() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("20240305/cam/cam_12:00:00.000000.txt");
        write_frames(&source, &[1.0, 2.0, 4.0]);

        let mut cache = cache_in(tmp.path(), CacheDestination::Export);
        let export = cache.cache_path(CacheLocation::Export, &source).unwrap();
        ensure_dir(export.parent().unwrap()).unwrap();
        std::fs::write(&export, "RAW\n5\n1.0\n").unwrap();

        let summary = cache.get_summary(&source);
        assert_eq!(
            summary,
            FileSummary::Exact {
                timestamps: vec![1.0, 2.0, 4.0]
            }
        );
        assert_eq!(cache.stats().found, 0);
        assert_eq!(cache.stats().created, 1);
        // Rewritten with valid content.
        assert_eq!(
            FileSummary::decode(&std::fs::read_to_string(&export).unwrap()),
            Some(summary)
        );
    }

    #[test]
    fn unreadable_source_is_empty_and_not_cached() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("20240305/cam/cam_12:00:00.000000.txt");

        let mut cache = cache_in(tmp.path(), CacheDestination::Local);
        assert_eq!(cache.get_summary(&source), FileSummary::empty());
        assert_eq!(cache.stats().created, 0);
        assert!(!cache
            .cache_path(CacheLocation::Local, &source)
            .unwrap()
            .exists());
    }

    #[test]
    fn stale_cache_is_a_miss() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("20240305/cam/cam_12:00:00.000000.txt");
        write_frames(&source, &[1.0, 2.0, 4.0]);

        let mut cache = cache_in(tmp.path(), CacheDestination::Local);
        cache.get_summary(&source);
        let cache_file = cache.cache_path(CacheLocation::Local, &source).unwrap();
        let cached_at = std::fs::metadata(&cache_file).unwrap().modified().unwrap();

        write_frames(&source, &[10.0, 11.0, 12.0, 13.0]);
        std::fs::File::options()
            .write(true)
            .open(&source)
            .unwrap()
            .set_modified(cached_at + std::time::Duration::from_secs(10))
            .unwrap();

        assert_eq!(
            cache.get_summary(&source),
            FileSummary::ConstantCadence {
                count: 4,
                start: 10.0,
                end: 13.0
            }
        );
        assert_eq!(
            cache.stats(),
            CacheStats {
                searched: 2,
                found: 0,
                created: 2
            }
        );
    }

    #[test]
    fn write_leaves_no_temporary_files() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("cache/a.txt.cache");
        write_cache_file(&path, &FileSummary::empty()).unwrap();
        write_cache_file(&path, &FileSummary::empty()).unwrap();
        let names: Vec<_> = std::fs::read_dir(tmp.path().join("cache"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("a.txt.cache")]);
        assert_eq!(
            read_cache_file(&path, &tmp.path().join("missing")),
            Some(FileSummary::empty())
        );
    }

    #[test]
    fn ensure_dir_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("a/b/c");
        ensure_dir(&dir).unwrap();
        ensure_dir(&dir).unwrap();
        assert!(dir.is_dir());
    }
}
