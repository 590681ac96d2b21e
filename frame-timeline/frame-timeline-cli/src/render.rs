// Copyright 2020-2023 Andrew D. Straw.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT
// or http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Text rendering of a [ScanOutput].

use std::fmt::Write;

use ansi_term::{Colour, Style};
use chrono::{DateTime, Timelike, Utc};

use datetime_conversion::{f64_to_datetime, format_ut};
use frame_timeline::{ReportLine, ScanOutput, Status, Stream, TimeWindow, ValueRecord};

const BLOCKS: [char; 9] = [' ', '▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
/// 256-color palette entries for density levels 1 to 8, blue to red.
const LEVEL_COLORS: [u8; 8] = [21, 27, 39, 46, 118, 154, 220, 196];

const MIN_NAME_WIDTH: usize = 10;
const MIN_COUNT_WIDTH: usize = 5;
const MIN_TIMELINE_WIDTH: usize = 10;
/// Width of `"   "`, `"   "` and `"{:6.1} Hz "` around the name and count.
const PREFIX_PADDING: usize = 3 + 3 + 10;

/// Column widths of the timeline display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub name_width: usize,
    pub count_width: usize,
    pub prefix_width: usize,
    pub timeline_width: usize,
}

impl Layout {
    /// Fit the stream labels and the timeline into `term_width` columns.
    ///
    /// Only streams with frames are shown and contribute to the label width.
    pub fn new(streams: &[Stream], term_width: usize) -> Self {
        let shown = streams.iter().filter(|s| s.total_frames > 0);
        let name_width = shown
            .clone()
            .map(|s| s.name.chars().count())
            .fold(MIN_NAME_WIDTH, usize::max);
        let count_width = shown
            .map(|s| s.total_frames.to_string().len())
            .fold(MIN_COUNT_WIDTH, usize::max);
        let prefix_width = name_width + count_width + PREFIX_PADDING;
        let timeline_width = term_width
            .saturating_sub(prefix_width)
            .max(MIN_TIMELINE_WIDTH);
        Self {
            name_width,
            count_width,
            prefix_width,
            timeline_width,
        }
    }
}

/// Density level `0..=8` of a bin, relative to the stream peak.
fn level(count: u64, max_count: u64) -> usize {
    if count == 0 {
        return 0;
    }
    if max_count == 0 {
        return 1;
    }
    let level = 1 + (count as f64 * 7.999 / max_count as f64) as usize;
    level.clamp(1, 8)
}

fn paint_level(buf: &mut String, level: usize, color: bool) {
    let glyph = BLOCKS[level].to_string();
    if color && level > 0 {
        let _ = write!(buf, "{}", Colour::Fixed(LEVEL_COLORS[level - 1]).paint(glyph));
    } else {
        buf.push_str(&glyph);
    }
}

fn whole_second(t: f64) -> Option<DateTime<Utc>> {
    f64_to_datetime(t.floor())
}

/// One character per bin: `D`, `H`, `M` or `S` where a day, hour, minute or
/// second boundary falls inside the bin.
///
/// Hour, minute and second marks are only shown when bins are short enough
/// for them to be meaningful.
pub fn tick_row(window: &TimeWindow, width: usize) -> String {
    let dt = window.duration() / width as f64;
    let show_s = dt < 2.0;
    let show_m = dt < 120.0;
    let show_h = dt < 7200.0;

    (0..width)
        .map(|i| {
            let t0 = window.start() + i as f64 * dt;
            let t1 = window.start() + (i + 1) as f64 * dt;
            let (Some(a), Some(b)) = (whole_second(t0), whole_second(t1)) else {
                return ' ';
            };
            if a == b {
                ' '
            } else if a.date_naive() != b.date_naive() {
                'D'
            } else if a.hour() != b.hour() {
                if show_h {
                    'H'
                } else {
                    ' '
                }
            } else if a.minute() != b.minute() {
                if show_m {
                    'M'
                } else {
                    ' '
                }
            } else if show_s {
                'S'
            } else {
                ' '
            }
        })
        .collect()
}

/// Timeline row of one key: `|` at each value record, followed by as much of
/// the value as fits before the next mark.
///
/// `records` must be in time order. Returns `None` if no record falls in the
/// window.
pub fn key_row(window: &TimeWindow, width: usize, records: &[&ValueRecord]) -> Option<String> {
    let mut row = vec![' '; width];
    let mut any = false;
    for r in records {
        if !window.contains(r.timestamp) {
            continue;
        }
        let bin = ((r.timestamp - window.start()) / window.duration() * width as f64) as usize;
        if bin < width {
            row[bin] = '|';
            any = true;
        }
    }
    if !any {
        return None;
    }

    let dt = window.duration() / width as f64;
    let mut last_mark = None;
    for b in 0..width {
        if row[b] == '|' {
            last_mark = Some(b);
            continue;
        }
        let bin_time = window.start() + (b as f64 + 0.5) * dt;
        let Some(value) = records
            .iter()
            .take_while(|r| r.timestamp <= bin_time)
            .last()
            .map(|r| &r.value)
        else {
            continue;
        };
        let offset = match last_mark {
            Some(mark) => b - mark - 1,
            None => b,
        };
        if let Some(c) = value.chars().nth(offset) {
            row[b] = c;
        }
    }
    Some(row.into_iter().collect())
}

/// Value records of `stream` grouped by key, keys in order of first
/// appearance. [Status::End] records are left out.
fn key_records<'a>(report: &'a [ReportLine], stream: &str) -> Vec<(&'a str, Vec<&'a ValueRecord>)> {
    let mut keys: Vec<(&str, Vec<&ValueRecord>)> = vec![];
    for line in report {
        let ReportLine::Value(r) = line else {
            continue;
        };
        if r.stream != stream || r.status == Status::End {
            continue;
        }
        match keys.iter_mut().find(|(k, _)| *k == r.keyword) {
            Some((_, records)) => records.push(r),
            None => keys.push((r.keyword.as_str(), vec![r])),
        }
    }
    keys
}

fn write_stream_row(
    buf: &mut String,
    stream: &Stream,
    layout: &Layout,
    bin_width: f64,
    color: bool,
) {
    let name = format!("{:<width$}", stream.name, width = layout.name_width);
    if color {
        let _ = write!(buf, "{}", Style::new().bold().paint(name));
    } else {
        buf.push_str(&name);
    }
    let peak_hz = if bin_width > 0.0 {
        stream.max_bin_count as f64 / bin_width
    } else {
        0.0
    };
    let _ = write!(
        buf,
        "   {:>cw$}   {:6.1} Hz ",
        stream.total_frames,
        peak_hz,
        cw = layout.count_width
    );
    for count in stream.bins.iter() {
        paint_level(buf, level(*count, stream.max_bin_count), color);
    }
    buf.push('\n');
}

fn write_report(buf: &mut String, report: &[ReportLine]) {
    buf.push_str("\nKeyword Scan Report:\n");
    for line in report {
        let _ = match line {
            ReportLine::Count { run_length, .. } => writeln!(buf, "        {run_length} files"),
            ReportLine::Value(r) => writeln!(
                buf,
                "{:<12} {:<20} {:<24} {:<18.6} {:<10} {:<20} {}",
                r.stream,
                r.keyword,
                format_ut(r.timestamp),
                r.timestamp,
                r.status,
                r.value,
                r.source_file
            ),
        };
    }
}

/// Render the full text display of `out`.
///
/// The bins of `out` must already match `layout.timeline_width`.
pub fn render(out: &ScanOutput, layout: &Layout, color: bool) -> String {
    let window = &out.window;
    let width = layout.timeline_width;
    let bin_width = window.duration() / width as f64;
    let mut buf = String::new();

    let _ = writeln!(buf, "\nSummary:");
    let _ = writeln!(
        buf,
        "Start: {}  End: {}  Duration: {:.3} s  Bin: {:.3} s",
        format_ut(window.start()),
        format_ut(window.end()),
        window.duration(),
        bin_width
    );

    let _ = writeln!(buf, "\nTimeline:");
    let _ = writeln!(
        buf,
        "{:pw$}{}",
        "",
        tick_row(window, width),
        pw = layout.prefix_width
    );

    for stream in out.streams.iter().filter(|s| s.total_frames > 0) {
        write_stream_row(&mut buf, stream, layout, bin_width, color);
        for (key, records) in key_records(&out.report, &stream.name) {
            if let Some(row) = key_row(window, width, &records) {
                let _ = writeln!(buf, "{key:>kw$} {row}", kw = layout.prefix_width - 1);
            }
        }
    }

    let _ = writeln!(
        buf,
        "\nLegend: ' ' = 0 frames. Blocks show relative density (normalized to peak frame rate per stream)."
    );
    buf.push_str("Scale: ");
    for level in 0..BLOCKS.len() {
        paint_level(&mut buf, level, color);
    }
    buf.push_str(" (Low -> High density)\n");

    if !out.report.is_empty() {
        write_report(&mut buf, &out.report);
    }

    let stats = &out.cache_stats;
    let _ = writeln!(
        buf,
        "\nCache: {} searched, {} found, {} created",
        stats.searched, stats.found, stats.created
    );
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2024-03-05T11:30:00Z
    const T: f64 = 1709638200.0;

    fn record(timestamp: f64, status: Status, value: &str) -> ValueRecord {
        ValueRecord {
            stream: "cam".into(),
            keyword: "MODE".into(),
            timestamp,
            status,
            value: value.into(),
            source_file: String::new(),
        }
    }

    fn stream(name: &str, bins: Vec<u64>) -> Stream {
        let mut s = Stream::new(name, bins.len());
        s.total_frames = bins.iter().sum();
        s.max_bin_count = bins.iter().copied().max().unwrap_or(0);
        s.bins = bins;
        s
    }

    #[test]
    fn density_levels() {
        assert_eq!(level(0, 10), 0);
        assert_eq!(level(1, 10), 1);
        assert_eq!(level(5, 10), 4);
        assert_eq!(level(10, 10), 8);
        assert_eq!(level(3, 0), 1);
    }

    #[test]
    fn layout_widths() {
        let l = Layout::new(&[stream("cam", vec![1, 2])], 80);
        assert_eq!(l.name_width, 10);
        assert_eq!(l.count_width, 5);
        assert_eq!(l.prefix_width, 31);
        assert_eq!(l.timeline_width, 49);

        let long = Layout::new(
            &[
                stream("a_rather_long_stream_name", vec![1_000_000]),
                stream("ignored_because_it_has_no_frames", vec![0]),
            ],
            80,
        );
        assert_eq!(long.name_width, 25);
        assert_eq!(long.count_width, 7);
        assert_eq!(long.timeline_width, 80 - 48);

        assert_eq!(Layout::new(&[], 20).timeline_width, 10);
    }

    #[test]
    fn ticks_per_second() {
        // 11:30:00 .. 11:31:00, one second per character
        let w = TimeWindow::new(T, T + 60.0).unwrap();
        let row = tick_row(&w, 60);
        assert_eq!(row, format!("{}M", "S".repeat(59)));
    }

    #[test]
    fn ticks_hide_fine_units() {
        // 11:30 .. 12:30, ten minutes per character
        let w = TimeWindow::new(T, T + 3600.0).unwrap();
        assert_eq!(tick_row(&w, 6), "  H   ");

        // day boundary is always shown
        let w = TimeWindow::new(T, T + 2.0 * 86400.0).unwrap();
        let row = tick_row(&w, 4);
        assert_eq!(row.matches('D').count(), 2);
        assert!(!row.contains('H'));
    }

    #[test]
    fn key_row_spells_values() {
        let w = TimeWindow::new(0.0, 100.0).unwrap();
        let a = record(0.0, Status::Initial, "abc");
        let b = record(50.0, Status::Change, "xy");
        assert_eq!(key_row(&w, 10, &[&a, &b]).unwrap(), "|abc |xy  ");

        let outside = record(200.0, Status::Initial, "z");
        assert_eq!(key_row(&w, 10, &[&outside]), None);
    }

    #[test]
    fn plain_render() {
        let window = TimeWindow::new(T, T + 100.0).unwrap();
        let mut cam = stream("cam", vec![0; 10]);
        cam.bins = vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 0];
        cam.total_frames = 36;
        cam.max_bin_count = 8;
        let out = ScanOutput {
            window,
            streams: vec![cam, stream("empty", vec![0; 10])],
            report: vec![ReportLine::Value(record(T + 55.0, Status::Initial, "fast"))],
            cache_stats: frame_timeline::CacheStats {
                searched: 3,
                found: 2,
                created: 1,
            },
        };
        let layout = Layout {
            name_width: 10,
            count_width: 5,
            prefix_width: 31,
            timeline_width: 10,
        };
        let text = render(&out, &layout, false);

        assert!(text.contains("Start: UT20240305T11:30:00  End: UT20240305T11:31:40"));
        assert!(text.contains("Bin: 10.000 s"));
        assert!(text.contains("cam             36      0.8 Hz  ▁▂▃▄▅▆▇█ \n"));
        assert!(!text.contains("empty"));
        assert!(text.contains(&format!("{:>30} {}", "MODE", "     |fast\n")));
        assert!(text.contains("Keyword Scan Report:"));
        assert!(text.contains("Cache: 3 searched, 2 found, 1 created"));
        assert!(!text.contains('\x1b'));
    }

    #[test]
    fn key_records_skip_end() {
        let report = vec![
            ReportLine::Value(record(0.0, Status::Initial, "a")),
            ReportLine::Count {
                stream: "cam".into(),
                keyword: "MODE".into(),
                run_length: 3,
            },
            ReportLine::Value(record(100.0, Status::End, "a")),
        ];
        let keys = key_records(&report, "cam");
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].0, "MODE");
        assert_eq!(keys[0].1.len(), 1);
        assert!(key_records(&report, "other").is_empty());
    }
}
