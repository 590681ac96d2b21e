// Copyright 2020-2023 Andrew D. Straw.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT
// or http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Per-file timestamp summaries and their text serialization.
//!
//! The cache file format is whitespace separated. The first token is a tag:
//!
//! ```text
//! CONSTANT
//! <count>
//! <start>
//! <end>
//! ```
//!
//! or
//!
//! ```text
//! RAW
//! <count>
//! <timestamp 0>
//! ...
//! <timestamp count-1>
//! ```
//!
//! Floats are written with the shortest representation which parses back to
//! the identical value.

use std::{
    fmt::Write as _,
    io::{BufRead, BufReader},
    path::Path,
};

const TAG_CONSTANT: &str = "CONSTANT";
const TAG_RAW: &str = "RAW";

/// The frame timestamps of one frame file.
#[derive(Debug, Clone, PartialEq)]
pub enum FileSummary {
    /// Every timestamp, in file order.
    Exact { timestamps: Vec<f64> },
    /// Frames `start + k * dt` for `k` in `0..count`, with
    /// `dt = (end - start) / max(count - 1, 1)`.
    ConstantCadence { count: usize, start: f64, end: f64 },
}

impl FileSummary {
    /// A file without frames.
    pub fn empty() -> Self {
        FileSummary::Exact { timestamps: vec![] }
    }

    /// Summarize `timestamps`, collapsing to [FileSummary::ConstantCadence]
    /// when [is_constant_cadence] holds.
    pub fn from_timestamps(timestamps: Vec<f64>, tolerance: f64) -> Self {
        if is_constant_cadence(&timestamps, tolerance) {
            FileSummary::ConstantCadence {
                count: timestamps.len(),
                start: timestamps[0],
                end: timestamps[timestamps.len() - 1],
            }
        } else {
            FileSummary::Exact { timestamps }
        }
    }

    pub fn is_constant_cadence(&self) -> bool {
        matches!(self, FileSummary::ConstantCadence { .. })
    }

    pub fn count(&self) -> usize {
        match self {
            FileSummary::Exact { timestamps } => timestamps.len(),
            FileSummary::ConstantCadence { count, .. } => *count,
        }
    }

    /// First timestamp, `None` if there are no frames.
    pub fn start(&self) -> Option<f64> {
        match self {
            FileSummary::Exact { timestamps } => timestamps.first().copied(),
            FileSummary::ConstantCadence { count: 0, .. } => None,
            FileSummary::ConstantCadence { start, .. } => Some(*start),
        }
    }

    /// Last timestamp, `None` if there are no frames.
    pub fn end(&self) -> Option<f64> {
        match self {
            FileSummary::Exact { timestamps } => timestamps.last().copied(),
            FileSummary::ConstantCadence { count: 0, .. } => None,
            FileSummary::ConstantCadence { end, .. } => Some(*end),
        }
    }

    /// Interval between reconstructed frames of a constant-cadence summary.
    pub fn cadence(&self) -> Option<f64> {
        match self {
            FileSummary::Exact { .. } => None,
            FileSummary::ConstantCadence { count, start, end } => {
                Some((end - start) / (count.saturating_sub(1).max(1)) as f64)
            }
        }
    }

    /// Serialize to the cache file format.
    pub fn encode(&self) -> String {
        match self {
            FileSummary::ConstantCadence { count, start, end } => {
                format!("{TAG_CONSTANT}\n{count}\n{start}\n{end}\n")
            }
            FileSummary::Exact { timestamps } => {
                let mut buf = format!("{TAG_RAW}\n{}\n", timestamps.len());
                for t in timestamps {
                    // Writing to a String cannot fail.
                    let _ = writeln!(buf, "{t}");
                }
                buf
            }
        }
    }

    /// Parse the cache file format. Returns `None` for anything malformed or
    /// truncated.
    pub fn decode(buf: &str) -> Option<Self> {
        // [Self::encode] always ends with a newline; without one the last
        // number may be cut short.
        if !buf.ends_with('\n') {
            return None;
        }
        let mut tokens = buf.split_whitespace();
        let tag = tokens.next()?;
        let count: usize = tokens.next()?.parse().ok()?;
        let summary = match tag {
            TAG_CONSTANT => {
                let start: f64 = tokens.next()?.parse().ok()?;
                let end: f64 = tokens.next()?.parse().ok()?;
                if !start.is_finite() || !end.is_finite() || end < start {
                    return None;
                }
                FileSummary::ConstantCadence { count, start, end }
            }
            TAG_RAW => {
                let mut timestamps = Vec::with_capacity(count.min(1 << 20));
                for _ in 0..count {
                    timestamps.push(tokens.next()?.parse().ok()?);
                }
                FileSummary::Exact { timestamps }
            }
            _ => return None,
        };
        if tokens.next().is_some() {
            return None;
        }
        Some(summary)
    }
}

/// True when there are at least two timestamps, the mean interval is
/// positive and every interval is within `tolerance * mean` of the mean.
pub fn is_constant_cadence(timestamps: &[f64], tolerance: f64) -> bool {
    let (first, last) = match (timestamps.first(), timestamps.last()) {
        (Some(first), Some(last)) if timestamps.len() >= 2 => (*first, *last),
        _ => return false,
    };
    let mean = (last - first) / (timestamps.len() - 1) as f64;
    if mean.is_nan() || mean <= 0.0 {
        return false;
    }
    let max_dev = tolerance * mean;
    timestamps
        .windows(2)
        .all(|w| ((w[1] - w[0]) - mean).abs() <= max_dev)
}

/// Extract the timestamp column of a single frame file line.
///
/// Returns `None` for comment lines, short lines and unparsable timestamps.
pub fn parse_frame_line(line: &str, column: usize, comment_marker: char) -> Option<f64> {
    if line.starts_with(comment_marker) {
        return None;
    }
    let t: f64 = line.split_whitespace().nth(column)?.parse().ok()?;
    t.is_finite().then_some(t)
}

/// Read all frame timestamps of a frame file, in file order.
pub fn read_frame_timestamps<P: AsRef<Path>>(
    path: P,
    column: usize,
    comment_marker: char,
) -> std::io::Result<Vec<f64>> {
    let rdr = BufReader::new(std::fs::File::open(path)?);
    let mut timestamps = Vec::new();
    for line in rdr.lines() {
        if let Some(t) = parse_frame_line(&line?, column, comment_marker) {
            timestamps.push(t);
        }
    }
    Ok(timestamps)
}
