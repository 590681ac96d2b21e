// Copyright 2020-2023 Andrew D. Straw.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT
// or http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Convert between [chrono::DateTime] and the f64 epoch-seconds representation
//! used in frame files, and parse the time strings found on the command line
//! and in the `YYYYMMDD/<stream>/<stream>_HH:MM:SS.ffffff.txt` directory
//! layout.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

/// Seconds in one UTC day.
pub const SECONDS_PER_DAY: f64 = 86400.0;

/// Format of the per-day directories.
const DAY_DIR_FORMAT: &str = "%Y%m%d";

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ParseTimeError {
    #[error("failed to parse UT time \"{0}\" (expected UTYYYYMMDDTHH[:MM[:SS]])")]
    Ut(String),
    #[error("failed to parse \"{0}\" as seconds since the epoch")]
    Epoch(String),
}

/// Converts a [chrono::DateTime] to an f64 timestamp representation.
///
/// The integer part is seconds since the Unix epoch and the fractional part
/// is the sub-second remainder.
pub fn datetime_to_f64<TZ>(dt: &DateTime<TZ>) -> f64
where
    TZ: TimeZone,
{
    let secs = dt.timestamp();
    let nsecs = dt.timestamp_subsec_nanos();
    (secs as f64) + (nsecs as f64 * 1e-9)
}

/// Converts an f64 timestamp to a [chrono::DateTime] in UTC.
///
/// Returns `None` for non-finite or out-of-range values.
pub fn f64_to_datetime(timestamp_f64: f64) -> Option<DateTime<Utc>> {
    if !timestamp_f64.is_finite() {
        return None;
    }
    let secs_f = timestamp_f64.floor();
    let secs = secs_f as i64;
    let nsecs = ((timestamp_f64 - secs_f) * 1e9) as u32;
    DateTime::from_timestamp(secs, nsecs.min(999_999_999))
}

/// Timestamp of the UTC midnight at or before `timestamp_f64`.
pub fn utc_day_start(timestamp_f64: f64) -> f64 {
    (timestamp_f64 / SECONDS_PER_DAY).floor() * SECONDS_PER_DAY
}

/// Name of the day directory (`YYYYMMDD`) containing `timestamp_f64`.
pub fn day_dir_name(timestamp_f64: f64) -> Option<String> {
    f64_to_datetime(timestamp_f64).map(|dt| dt.format(DAY_DIR_FORMAT).to_string())
}

/// Parse a day directory name (`YYYYMMDD`) into the timestamp of its UTC
/// midnight.
pub fn parse_day_dir_name(name: &str) -> Option<f64> {
    if name.len() != 8 || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let date = NaiveDate::parse_from_str(name, DAY_DIR_FORMAT).ok()?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp() as f64)
}

/// Parse `HH[:MM[:SS[.ffffff]]]` into seconds since midnight.
fn parse_clock(clock: &str) -> Option<f64> {
    let mut fields = clock.split(':');
    let hour: u32 = fields.next()?.parse().ok()?;
    let minute: u32 = match fields.next() {
        Some(m) => m.parse().ok()?,
        None => 0,
    };
    let second: f64 = match fields.next() {
        Some(s) => s.parse().ok()?,
        None => 0.0,
    };
    if fields.next().is_some() || hour > 23 || minute > 59 || !(0.0..61.0).contains(&second) {
        return None;
    }
    Some(hour as f64 * 3600.0 + minute as f64 * 60.0 + second)
}

/// Parse a time of day written as `HH:MM:SS.ffffff` (all three clock fields
/// required) into seconds since midnight.
pub fn parse_time_of_day(clock: &str) -> Option<f64> {
    if clock.split(':').count() != 3 {
        return None;
    }
    parse_clock(clock)
}

/// Parse a time given either as `UTYYYYMMDDTHH[:MM[:SS]]` or as plain seconds
/// since the epoch.
pub fn parse_time_arg(arg: &str) -> Result<f64, ParseTimeError> {
    let arg = arg.trim();
    if let Some(rest) = arg.strip_prefix("UT") {
        let parsed = rest.split_once('T').and_then(|(date, clock)| {
            let midnight = parse_day_dir_name(date)?;
            Some(midnight + parse_clock(clock)?)
        });
        return parsed.ok_or_else(|| ParseTimeError::Ut(arg.to_string()));
    }
    match arg.parse::<f64>() {
        Ok(ts) if ts.is_finite() => Ok(ts),
        _ => Err(ParseTimeError::Epoch(arg.to_string())),
    }
}

/// Format a timestamp as `UTYYYYMMDDTHH:MM:SS` (truncated to whole seconds).
pub fn format_ut(timestamp_f64: f64) -> String {
    match f64_to_datetime(timestamp_f64) {
        Some(dt) => dt.format("UT%Y%m%dT%H:%M:%S").to_string(),
        None => format!("{timestamp_f64}"),
    }
}

#[test]
fn test_roundtrip() {
    for orig in &[0.0, 123.456, 456.789, 1634378218.4130154] {
        let rt = datetime_to_f64(&f64_to_datetime(*orig).unwrap());
        assert!((orig - rt).abs() < 1e-6);
    }
}

#[test]
fn test_day_helpers() {
    // 2024-03-05T12:34:56Z
    let ts = 1709642096.25;
    assert_eq!(utc_day_start(ts), 1709596800.0);
    assert_eq!(day_dir_name(ts).as_deref(), Some("20240305"));
    assert_eq!(parse_day_dir_name("20240305"), Some(1709596800.0));
    assert_eq!(parse_day_dir_name("2024035"), None);
    assert_eq!(parse_day_dir_name("cache"), None);
}

#[test]
fn test_time_of_day() {
    assert_eq!(parse_time_of_day("12:34:56.25"), Some(45296.25));
    assert_eq!(parse_time_of_day("12:34"), None);
    assert_eq!(parse_time_of_day("25:00:00"), None);
}
