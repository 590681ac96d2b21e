// Copyright 2020-2023 Andrew D. Straw.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT
// or http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::{collections::BTreeMap, path::Path};

use serde::Serialize;
use tracing::info;

use crate::{
    binning::{ScannedFile, Stream},
    cache::{CacheStats, SummaryCache},
    config::ScanConfig,
    discovery::discover,
    keywords::{header_path, KeywordFilter, KeywordTracker, ReportLine},
    window::TimeWindow,
    Error, Result,
};

/// The result of a scan, ready for display.
#[derive(Debug, Clone, Serialize)]
pub struct ScanOutput {
    pub window: TimeWindow,
    /// Streams in order of first discovery.
    pub streams: Vec<Stream>,
    /// Keyword report in time order. Empty without a keyword filter.
    pub report: Vec<ReportLine>,
    pub cache_stats: CacheStats,
}

impl ScanOutput {
    /// Recount every stream into `num_bins` bins without touching the disk.
    pub fn rebin(&mut self, num_bins: usize) -> Result<()> {
        if num_bins == 0 {
            return Err(Error::ZeroBins);
        }
        for stream in self.streams.iter_mut() {
            stream.rebin(&self.window, num_bins);
        }
        Ok(())
    }

    pub fn num_bins(&self) -> Option<usize> {
        self.streams.first().map(|s| s.bins.len())
    }
}

/// All state of one scan.
///
/// Created once per run, filled by [Self::discover] and [Self::aggregate],
/// and consumed by [Self::finish].
#[derive(Debug)]
pub struct ScanContext {
    config: ScanConfig,
    window: TimeWindow,
    num_bins: usize,
    streams: Vec<Stream>,
    stream_index: BTreeMap<String, usize>,
    cache: SummaryCache,
    tracker: Option<KeywordTracker>,
}

impl ScanContext {
    pub fn new(
        config: ScanConfig,
        window: TimeWindow,
        num_bins: usize,
        keyword_filter: Option<KeywordFilter>,
    ) -> Result<Self> {
        config.validate()?;
        if num_bins == 0 {
            return Err(Error::ZeroBins);
        }
        let cache = SummaryCache::new(&config);
        Ok(Self {
            config,
            window,
            num_bins,
            streams: vec![],
            stream_index: BTreeMap::new(),
            cache,
            tracker: keyword_filter.map(KeywordTracker::new),
        })
    }

    pub fn window(&self) -> &TimeWindow {
        &self.window
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn stream_mut(&mut self, name: &str) -> &mut Stream {
        let idx = match self.stream_index.get(name) {
            Some(idx) => *idx,
            None => {
                let idx = self.streams.len();
                self.streams.push(Stream::new(name, self.num_bins));
                self.stream_index.insert(name.to_string(), idx);
                idx
            }
        };
        &mut self.streams[idx]
    }

    /// First pass: find frame files below `root` and obtain their summaries,
    /// populating the cache as needed.
    pub fn discover(&mut self, root: &Path) -> Result<()> {
        if !root.is_dir() {
            return Err(Error::NotDirectory(root.display().to_string()));
        }
        let window = self.window;
        for stream_day in discover(root, &window, &self.config.frame_extension) {
            let mut scanned = Vec::with_capacity(stream_day.files.len());
            for file in stream_day.files {
                let summary = self.cache.get_summary(&file.path);
                scanned.push(ScannedFile { file, summary });
            }
            self.stream_mut(&stream_day.stream).files.extend(scanned);
        }
        Ok(())
    }

    /// Second pass: bin all summaries and, with a keyword filter, scan the
    /// header of every file whose time lies in the window.
    pub fn aggregate(&mut self) {
        let window = self.window;
        let cfg = &self.config;
        for stream in self.streams.iter_mut() {
            let files = std::mem::take(&mut stream.files);
            for scanned in files.iter() {
                stream.bin(&scanned.summary, &window);
                if let Some(tracker) = self.tracker.as_mut() {
                    let Some(t) = scanned.representative_timestamp() else {
                        continue;
                    };
                    if window.contains(t) {
                        let header =
                            header_path(&scanned.file.path, &cfg.frame_extension, &cfg.header_suffix);
                        tracker.scan_header(&header, &stream.name, t);
                    }
                }
            }
            stream.files = files;
        }
    }

    /// Close the keyword report and return the aggregates.
    pub fn finish(self) -> ScanOutput {
        let stats = self.cache.stats();
        info!(
            "cache: {} searched, {} found, {} created",
            stats.searched, stats.found, stats.created
        );
        let report = match self.tracker {
            Some(tracker) => tracker.finish(self.window.end()),
            None => vec![],
        };
        ScanOutput {
            window: self.window,
            streams: self.streams,
            report,
            cache_stats: stats,
        }
    }
}

/// Run a complete scan of the data tree below `root`.
pub fn scan(
    root: &Path,
    config: ScanConfig,
    window: TimeWindow,
    num_bins: usize,
    keyword_filter: Option<KeywordFilter>,
) -> Result<ScanOutput> {
    let mut ctx = ScanContext::new(config, window, num_bins, keyword_filter)?;
    ctx.discover(root)?;
    ctx.aggregate();
    Ok(ctx.finish())
}
