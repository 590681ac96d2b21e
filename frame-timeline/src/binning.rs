// Copyright 2020-2023 Andrew D. Straw.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT
// or http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Per-stream frame counts in fixed-width time bins.

use serde::Serialize;

use crate::{discovery::FrameFile, summary::FileSummary, window::TimeWindow};

/// A frame file together with its summary.
#[derive(Debug, Clone, PartialEq)]
pub struct ScannedFile {
    pub file: FrameFile,
    pub summary: FileSummary,
}

impl ScannedFile {
    /// The file name time, or the first frame time if the name does not
    /// encode one.
    pub fn representative_timestamp(&self) -> Option<f64> {
        self.file.name_timestamp.or_else(|| self.summary.start())
    }
}

/// Aggregated frame counts of one stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stream {
    pub name: String,
    pub total_frames: u64,
    pub bins: Vec<u64>,
    pub max_bin_count: u64,
    #[serde(skip)]
    pub files: Vec<ScannedFile>,
}

impl Stream {
    /// A stream without frames. `num_bins` must be non-zero.
    pub fn new(name: impl Into<String>, num_bins: usize) -> Self {
        Self {
            name: name.into(),
            total_frames: 0,
            bins: vec![0; num_bins],
            max_bin_count: 0,
            files: vec![],
        }
    }

    #[inline]
    fn increment_bin(&mut self, t: f64, window: &TimeWindow) {
        let idx = window.bin_index(t, self.bins.len());
        self.bins[idx] += 1;
        self.max_bin_count = self.max_bin_count.max(self.bins[idx]);
    }

    /// Count one frame at `t` if it lies in `window`.
    #[inline]
    fn add_frame(&mut self, t: f64, window: &TimeWindow) {
        if window.contains(t) {
            self.total_frames += 1;
            self.increment_bin(t, window);
        }
    }

    /// Add the frames of `summary` which lie in `window`.
    pub fn bin(&mut self, summary: &FileSummary, window: &TimeWindow) {
        match summary {
            FileSummary::Exact { timestamps } => {
                for t in timestamps {
                    self.add_frame(*t, window);
                }
            }
            FileSummary::ConstantCadence { count, start, end } => {
                self.bin_constant_cadence(*count, *start, *end, window)
            }
        }
    }

    /// Recount all frames of the stored [Self::files] into `num_bins` bins.
    pub fn rebin(&mut self, window: &TimeWindow, num_bins: usize) {
        self.total_frames = 0;
        self.max_bin_count = 0;
        self.bins = vec![0; num_bins];
        let files = std::mem::take(&mut self.files);
        for scanned in files.iter() {
            self.bin(&scanned.summary, window);
        }
        self.files = files;
    }

    fn bin_constant_cadence(&mut self, count: usize, start: f64, end: f64, window: &TimeWindow) {
        if count == 0 {
            return;
        }
        let dt = (end - start) / (count - 1).max(1) as f64;
        if count == 1 || dt.is_nan() || dt <= 0.0 {
            self.add_frame(start, window);
            return;
        }
        let frame_time = |k: usize| start + k as f64 * dt;

        if window.contains(start) && window.contains(end) {
            self.total_frames += count as u64;
            for k in 0..count {
                self.increment_bin(frame_time(k), window);
            }
            return;
        }
        if end < window.start() || start > window.end() {
            return;
        }

        let last_idx = (count - 1) as f64;
        let first = ((window.start() - start) / dt).ceil().clamp(0.0, last_idx) as usize;
        let last = ((window.end() - start) / dt).floor().clamp(0.0, last_idx) as usize;
        // Rounding in the index computation may be off by one at either end,
        // so widen by one and test each frame.
        let lo = first.saturating_sub(1);
        let hi = (last + 1).min(count - 1);
        for k in lo..=hi {
            self.add_frame(frame_time(k), window);
        }
    }
}
