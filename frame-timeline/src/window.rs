// Copyright 2020-2023 Andrew D. Straw.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT
// or http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use serde::Serialize;

use datetime_conversion::{parse_time_arg, utc_day_start, SECONDS_PER_DAY};

use crate::{Error, Result};

/// An inclusive time window `[start, end]` in seconds since the epoch.
///
/// Construction guarantees `start < end`, both finite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimeWindow {
    start: f64,
    end: f64,
}

impl TimeWindow {
    pub fn new(start: f64, end: f64) -> Result<Self> {
        if !start.is_finite() || !end.is_finite() || start >= end {
            return Err(Error::InvalidWindow { start, end });
        }
        Ok(Self { start, end })
    }

    /// Parse both ends with [datetime_conversion::parse_time_arg].
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Self::new(parse_time_arg(start)?, parse_time_arg(end)?)
    }

    #[inline]
    pub fn start(&self) -> f64 {
        self.start
    }

    #[inline]
    pub fn end(&self) -> f64 {
        self.end
    }

    #[inline]
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    #[inline]
    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t <= self.end
    }

    /// Project `t` onto `[0, num_bins)`, clamped at both ends.
    ///
    /// `t == end` falls into the last bin. `num_bins` must be non-zero.
    #[inline]
    pub fn bin_index(&self, t: f64, num_bins: usize) -> usize {
        let pos = ((t - self.start) / self.duration() * num_bins as f64).floor();
        if pos <= 0.0 {
            0
        } else {
            (pos as usize).min(num_bins - 1)
        }
    }

    /// UTC midnights of all calendar days overlapping the window.
    pub fn days(&self) -> impl Iterator<Item = f64> {
        let first = utc_day_start(self.start);
        let last = utc_day_start(self.end);
        let n_days = ((last - first) / SECONDS_PER_DAY).round() as u64;
        (0..=n_days).map(move |i| first + i as f64 * SECONDS_PER_DAY)
    }
}
