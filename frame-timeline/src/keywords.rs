// Copyright 2020-2023 Andrew D. Straw.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT
// or http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Follow the values of header keywords across the frame files of a stream.
//!
//! Each frame file may have a header sidecar file with FITS-style
//! `KEY = value / comment` cards. For every (stream, key) pair matching a
//! [KeywordFilter], the value of the first file is reported as
//! [Status::Initial] and every later value differing from its predecessor is
//! reported as [Status::Change], preceded by the number of files which had the
//! previous value. At the end of the scan, the last value of each key is
//! reported as [Status::End].

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::{Error, Result};

/// FITS header cards are 80 characters wide.
const FITS_CARD_LEN: usize = 80;

/// Which keys (and optionally which stream) to follow.
#[derive(Debug, Clone)]
pub struct KeywordFilter {
    stream: Option<String>,
    pattern: Regex,
}

impl KeywordFilter {
    pub fn new(pattern: &str, stream: Option<&str>) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|source| Error::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self {
            stream: stream.map(Into::into),
            pattern: regex,
        })
    }

    /// Parse `PATTERN` or `STREAM:PATTERN`.
    ///
    /// The text before the first `:` is taken as a stream name only if it
    /// is a plain name, so patterns such as `(?:EXP|GAIN)` stay whole.
    pub fn parse(arg: &str) -> Result<Self> {
        match arg.split_once(':') {
            Some((stream, pattern)) if is_stream_name(stream) => Self::new(pattern, Some(stream)),
            Some(("", pattern)) => Self::new(pattern, None),
            _ => Self::new(arg, None),
        }
    }

    pub fn stream(&self) -> Option<&str> {
        self.stream.as_deref()
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn applies_to(&self, stream: &str) -> bool {
        self.stream.as_deref().map_or(true, |s| s == stream)
    }

    pub fn matches(&self, key: &str) -> bool {
        self.pattern.is_match(key)
    }
}

fn is_stream_name(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Initial,
    Change,
    End,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let s = match self {
            Status::Initial => "INITIAL",
            Status::Change => "CHANGE",
            Status::End => "END",
        };
        f.pad(s)
    }
}

/// The value of a key at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueRecord {
    pub stream: String,
    pub keyword: String,
    pub timestamp: f64,
    pub status: Status,
    pub value: String,
    /// Header file name. Empty for [Status::End].
    pub source_file: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ReportLine {
    /// Number of consecutive files which had the value of the previous
    /// record of this key.
    Count {
        stream: String,
        keyword: String,
        run_length: u64,
    },
    Value(ValueRecord),
}

/// Run-length state of one (stream, key) pair.
#[derive(Debug, Clone, Default, PartialEq)]
enum TrackedKey {
    #[default]
    Empty,
    Tracking {
        value: String,
        run_length: u64,
    },
}

enum Transition {
    Initial,
    Unchanged,
    Changed { closed_run: u64 },
}

impl TrackedKey {
    fn observe(&mut self, new_value: &str) -> Transition {
        match self {
            TrackedKey::Empty => {
                *self = TrackedKey::Tracking {
                    value: new_value.to_string(),
                    run_length: 1,
                };
                Transition::Initial
            }
            TrackedKey::Tracking { value, run_length } if *value == new_value => {
                *run_length += 1;
                Transition::Unchanged
            }
            TrackedKey::Tracking { value, run_length } => {
                let closed_run = *run_length;
                *value = new_value.to_string();
                *run_length = 1;
                Transition::Changed { closed_run }
            }
        }
    }
}

/// A value record with the count marker which precedes it, kept together so
/// that sorting by time cannot separate them.
#[derive(Debug)]
struct ReportGroup {
    marker: Option<ReportLine>,
    record: ValueRecord,
}

/// Collects keyword observations into a report.
#[derive(Debug)]
pub struct KeywordTracker {
    filter: KeywordFilter,
    keys: BTreeMap<(String, String), TrackedKey>,
    groups: Vec<ReportGroup>,
}

impl KeywordTracker {
    pub fn new(filter: KeywordFilter) -> Self {
        Self {
            filter,
            keys: BTreeMap::new(),
            groups: vec![],
        }
    }

    pub fn filter(&self) -> &KeywordFilter {
        &self.filter
    }

    /// Record that the header of `source_file` in `stream` has `key = value`
    /// at `timestamp`.
    ///
    /// Observations of one (stream, key) pair must be made in time order.
    pub fn observe(
        &mut self,
        stream: &str,
        key: &str,
        value: &str,
        timestamp: f64,
        source_file: &str,
    ) {
        let state = self
            .keys
            .entry((stream.to_string(), key.to_string()))
            .or_default();
        let (status, marker) = match state.observe(value) {
            Transition::Unchanged => return,
            Transition::Initial => (Status::Initial, None),
            Transition::Changed { closed_run } => (
                Status::Change,
                Some(ReportLine::Count {
                    stream: stream.to_string(),
                    keyword: key.to_string(),
                    run_length: closed_run,
                }),
            ),
        };
        self.groups.push(ReportGroup {
            marker,
            record: ValueRecord {
                stream: stream.to_string(),
                keyword: key.to_string(),
                timestamp,
                status,
                value: value.to_string(),
                source_file: source_file.to_string(),
            },
        });
    }

    /// Read the header file at `header_path` and observe all matching keys.
    ///
    /// Does nothing if the filter excludes `stream` or the file cannot be
    /// read.
    pub fn scan_header(&mut self, header_path: &Path, stream: &str, timestamp: f64) {
        if !self.filter.applies_to(stream) {
            return;
        }
        let buf = match std::fs::read(header_path) {
            Ok(buf) => buf,
            Err(e) => {
                debug!("cannot read header {}: {e}", header_path.display());
                return;
            }
        };
        let text = String::from_utf8_lossy(&buf);
        let source_file = header_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        for card in header_cards(&text) {
            if let Some((key, value)) = parse_header_card(card) {
                if self.filter.matches(key) {
                    self.observe(stream, key, &value, timestamp, &source_file);
                }
            }
        }
    }

    /// Close all runs and return the report in time order.
    ///
    /// Every tracked key gets a final count marker and an [Status::End]
    /// record at `end_timestamp`. A count marker always directly precedes its
    /// record. At equal timestamps, records preceded by a marker come first,
    /// otherwise the observation order is kept.
    pub fn finish(mut self, end_timestamp: f64) -> Vec<ReportLine> {
        for ((stream, keyword), state) in std::mem::take(&mut self.keys) {
            if let TrackedKey::Tracking { value, run_length } = state {
                self.groups.push(ReportGroup {
                    marker: Some(ReportLine::Count {
                        stream: stream.clone(),
                        keyword: keyword.clone(),
                        run_length,
                    }),
                    record: ValueRecord {
                        stream,
                        keyword,
                        timestamp: end_timestamp,
                        status: Status::End,
                        value,
                        source_file: String::new(),
                    },
                });
            }
        }

        self.groups.sort_by(|a, b| {
            a.record
                .timestamp
                .total_cmp(&b.record.timestamp)
                .then_with(|| a.marker.is_none().cmp(&b.marker.is_none()))
        });
        self.groups
            .into_iter()
            .flat_map(|g| g.marker.into_iter().chain(Some(ReportLine::Value(g.record))))
            .collect()
    }
}

/// The header sidecar path of a frame file: `frame_extension` replaced by
/// `header_suffix`.
pub fn header_path(frame_path: &Path, frame_extension: &str, header_suffix: &str) -> PathBuf {
    let name = frame_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = name.strip_suffix(frame_extension).unwrap_or(&name);
    frame_path.with_file_name(format!("{stem}{header_suffix}"))
}

/// Split header text into cards: one per line, or fixed-width 80 character
/// cards if the text has no line breaks.
fn header_cards(text: &str) -> Vec<&str> {
    if text.contains('\n') {
        return text.lines().collect();
    }
    let mut cards = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        let mut split = rest.len().min(FITS_CARD_LEN);
        while !rest.is_char_boundary(split) {
            split += 1;
        }
        let (card, tail) = rest.split_at(split);
        cards.push(card);
        rest = tail;
    }
    cards
}

/// Parse a `KEY = value / comment` card into the trimmed key and value.
///
/// Returns `None` for cards without `=` or with an empty key.
pub fn parse_header_card(card: &str) -> Option<(&str, String)> {
    let (key, rest) = card.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key, parse_value(rest)))
}

fn parse_value(raw: &str) -> String {
    let raw = raw.trim_start();
    if let Some(quote) = raw.chars().next().filter(|c| *c == '\'' || *c == '"') {
        if let Some(value) = quoted_value(&raw[quote.len_utf8()..], quote) {
            return value;
        }
    }
    let uncommented = raw.split_once('/').map_or(raw, |(value, _comment)| value);
    let trimmed = uncommented.trim();
    for quote in ['\'', '"'] {
        if let Some(inner) = trimmed
            .strip_prefix(quote)
            .and_then(|t| t.strip_suffix(quote))
        {
            return inner.trim_end().to_string();
        }
    }
    trimmed.to_string()
}

/// Contents of a quoted string up to the closing quote, with a doubled quote
/// standing for a literal one. `None` if the string is not terminated.
fn quoted_value(body: &str, quote: char) -> Option<String> {
    let mut value = String::new();
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if c != quote {
            value.push(c);
        } else if chars.peek() == Some(&quote) {
            value.push(quote);
            chars.next();
        } else {
            return Some(value.trim_end().to_string());
        }
    }
    None
}
