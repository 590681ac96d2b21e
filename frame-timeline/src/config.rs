// Copyright 2020-2023 Andrew D. Straw.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT
// or http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Scan configuration, optionally loaded from a TOML file.
//!
//! Every field has a default, so an empty file (or no file at all) describes
//! the standard layout:
//!
//! ```toml
//! cadence_tolerance = 0.05
//! timestamp_column = 4
//! comment_marker = "#"
//! frame_extension = ".txt"
//! header_suffix = ".fits.header"
//! cache_dir_name = "cache"
//! cache_destination = "local"
//! local_cache_root = "."
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// The default value for [ScanConfig::cadence_tolerance].
pub const DEFAULT_CADENCE_TOLERANCE: f64 = 0.05;

/// The default value for [ScanConfig::timestamp_column].
pub const DEFAULT_TIMESTAMP_COLUMN: usize = 4;

/// The default value for [ScanConfig::header_suffix].
pub const DEFAULT_HEADER_SUFFIX: &str = ".fits.header";

/// Where newly computed summaries are written.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheDestination {
    /// Next to the frame file, in `<frame dir>/cache/`.
    Export,
    /// Below [ScanConfig::local_cache_root], in `cache/<day>/<stream>/`.
    #[default]
    Local,
}

/// Parameters of a scan which describe the on-disk formats and cache policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScanConfig {
    /// Maximum relative deviation of any inter-frame interval from the mean
    /// interval for a file to be stored in constant-cadence form.
    pub cadence_tolerance: f64,
    /// Zero-based column of the frame timestamp in frame files.
    pub timestamp_column: usize,
    /// Lines of frame files starting with this character are ignored.
    pub comment_marker: char,
    /// File name suffix of frame files.
    pub frame_extension: String,
    /// Replaces [Self::frame_extension] to give the header sidecar file name.
    pub header_suffix: String,
    /// Name of the cache subdirectory at both cache locations.
    pub cache_dir_name: String,
    /// Where newly computed summaries are written.
    pub cache_destination: CacheDestination,
    /// Base directory of the local cache location.
    pub local_cache_root: PathBuf,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            cadence_tolerance: DEFAULT_CADENCE_TOLERANCE,
            timestamp_column: DEFAULT_TIMESTAMP_COLUMN,
            comment_marker: '#',
            frame_extension: ".txt".to_string(),
            header_suffix: DEFAULT_HEADER_SUFFIX.to_string(),
            cache_dir_name: "cache".to_string(),
            cache_destination: CacheDestination::default(),
            local_cache_root: PathBuf::from("."),
        }
    }
}

impl ScanConfig {
    /// Parse and validate a TOML configuration.
    pub fn from_toml_str(buf: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(buf)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read, parse and validate a TOML configuration file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let buf = std::fs::read_to_string(path).map_err(|source| Error::IoPath {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&buf)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.cadence_tolerance.is_finite() || self.cadence_tolerance < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "cadence_tolerance must be a non-negative number, not {}",
                self.cadence_tolerance
            )));
        }
        for (name, value) in [
            ("frame_extension", &self.frame_extension),
            ("header_suffix", &self.header_suffix),
            ("cache_dir_name", &self.cache_dir_name),
        ] {
            if value.is_empty() {
                return Err(Error::InvalidConfig(format!("{name} must not be empty")));
            }
        }
        if self.cache_dir_name.contains(['/', '\\']) {
            return Err(Error::InvalidConfig(
                "cache_dir_name must be a single path component".into(),
            ));
        }
        Ok(())
    }
}
