// Copyright 2020-2023 Andrew D. Straw.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT
// or http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Summarize the temporal density of telemetry frame files.
//!
//! Frame files are plain text files stored as
//! `root/YYYYMMDD/<stream>/<stream>_HH:MM:SS.ffffff.txt`, one frame per line
//! with the frame timestamp (seconds since the epoch) in the fifth column. For
//! a requested time window, this crate
//!
//! - finds the frame files which may contain frames in the window
//!   ([discovery]),
//! - summarizes each file once and caches the summary on disk, storing only
//!   `count`, `start` and `end` for files recorded at a constant cadence
//!   ([cache], [summary]),
//! - counts frames in fixed-width time bins per stream ([binning]), and
//! - optionally follows the values of header keywords stored in sidecar
//!   files next to each frame file ([keywords]).
//!
//! A run is driven by a [ScanContext], which is consumed into a [ScanOutput]
//! for display.

pub mod binning;
pub mod cache;
pub mod config;
pub mod discovery;
pub mod keywords;
pub mod summary;
pub mod window;

mod context;

pub use crate::{
    binning::Stream,
    cache::{CacheLocation, CacheStats, SummaryCache},
    config::{CacheDestination, ScanConfig},
    context::{scan, ScanContext, ScanOutput},
    discovery::FrameFile,
    keywords::{KeywordFilter, KeywordTracker, ReportLine, Status, ValueRecord},
    summary::FileSummary,
    window::TimeWindow,
};

/// A type alias to wrap return types.
pub type Result<M> = std::result::Result<M, Error>;

/// The possible error types.
///
/// All of these are configuration errors detected before a scan starts.
/// Problems with individual frame, header or cache files are recovered
/// locally and never abort a scan.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("start time {start} must be less than end time {end}")]
    InvalidWindow { start: f64, end: f64 },
    #[error("the timeline needs at least one bin")]
    ZeroBins,
    #[error("{source}")]
    ParseTime {
        #[from]
        source: datetime_conversion::ParseTimeError,
    },
    #[error("invalid keyword pattern \"{pattern}\": {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("From {path}: {source}")]
    IoPath {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("TOML deserialization error: {source}")]
    TomlDe {
        #[from]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("directory does not exist: {0}")]
    NotDirectory(String),
}
