// Copyright 2020-2023 Andrew D. Straw.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT
// or http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Find the frame files relevant to a time window.
//!
//! The data tree is laid out as
//! `root/YYYYMMDD/<stream>/<stream>_HH:MM:SS.ffffff.txt`. Within one
//! stream-day directory, sorting file names gives chronological order, and
//! the time in the file name is the time of the first frame. This allows
//! skipping files outside the window without opening them.

use std::path::{Path, PathBuf};

use tracing::debug;

use datetime_conversion::{day_dir_name, parse_time_of_day};

use crate::window::TimeWindow;

/// A frame file selected for a scan.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameFile {
    pub path: PathBuf,
    /// Time derived from the day directory and the file name, if parsable.
    pub name_timestamp: Option<f64>,
}

/// The frame files of one stream within one day directory.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamDay {
    pub stream: String,
    pub files: Vec<FrameFile>,
}

/// Immediate children of `dir`, sorted by name, excluding names starting
/// with `.`.
///
/// A missing or unreadable directory has no children. Names which are not
/// valid UTF-8 are skipped.
pub fn list_sorted(dir: &Path) -> Vec<(String, PathBuf)> {
    let rd = match std::fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) => {
            debug!("cannot list {}: {e}", dir.display());
            return vec![];
        }
    };
    let mut children: Vec<(String, PathBuf)> = rd
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().into_string().ok()?;
            (!name.starts_with('.')).then(|| (name, entry.path()))
        })
        .collect();
    children.sort();
    children
}

/// Time encoded in a frame file name `<stream>_HH:MM:SS.ffffff<extension>`,
/// relative to the UTC midnight `day_start`.
pub fn frame_file_timestamp(day_start: f64, file_name: &str, extension: &str) -> Option<f64> {
    let stem = file_name.strip_suffix(extension)?;
    let (_stream, clock) = stem.rsplit_once('_')?;
    Some(day_start + parse_time_of_day(clock)?)
}

/// Drop files which cannot have frames in `window`.
///
/// `files` must be sorted by name. A file is skipped if its name time is
/// after the window end, or if the next file's name time is before the window
/// start (the next file starts after this one ends). Files without a name
/// time are always kept.
pub fn select_in_window(files: Vec<FrameFile>, window: &TimeWindow) -> Vec<FrameFile> {
    let next_times: Vec<Option<f64>> = files
        .iter()
        .skip(1)
        .map(|f| f.name_timestamp)
        .chain(std::iter::once(None))
        .collect();
    files
        .into_iter()
        .zip(next_times)
        .filter(|(file, next)| {
            if matches!(file.name_timestamp, Some(t) if t > window.end()) {
                debug!("after window: {}", file.path.display());
                return false;
            }
            if matches!(next, Some(t) if *t < window.start()) {
                debug!("before window: {}", file.path.display());
                return false;
            }
            true
        })
        .map(|(file, _)| file)
        .collect()
}

/// Frame files of one stream-day directory, in name order.
pub fn list_frame_files(stream_dir: &Path, day_start: f64, extension: &str) -> Vec<FrameFile> {
    list_sorted(stream_dir)
        .into_iter()
        .filter(|(name, path)| {
            name.len() > extension.len() && name.ends_with(extension) && path.is_file()
        })
        .map(|(name, path)| FrameFile {
            name_timestamp: frame_file_timestamp(day_start, &name, extension),
            path,
        })
        .collect()
}

/// Walk all day directories overlapping `window` and return the selected
/// frame files per stream, ordered by day and then by stream name.
pub fn discover(root: &Path, window: &TimeWindow, extension: &str) -> Vec<StreamDay> {
    let mut result = Vec::new();
    for day_start in window.days() {
        let Some(day_name) = day_dir_name(day_start) else {
            continue;
        };
        let day_dir = root.join(&day_name);
        if !day_dir.is_dir() {
            debug!("no day directory {}", day_dir.display());
            continue;
        }
        for (stream, stream_dir) in list_sorted(&day_dir) {
            if !stream_dir.is_dir() {
                continue;
            }
            let all = list_frame_files(&stream_dir, day_start, extension);
            let n_all = all.len();
            let files = select_in_window(all, window);
            debug!(
                "{day_name}/{stream}: {} of {n_all} frame files selected",
                files.len()
            );
            result.push(StreamDay { stream, files });
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: f64 = 1709596800.0; // 2024-03-05T00:00:00Z

    fn ff(name: &str, t: Option<f64>) -> FrameFile {
        FrameFile {
            path: PathBuf::from(name),
            name_timestamp: t,
        }
    }

    #[test]
    fn name_timestamps() {
        assert_eq!(
            frame_file_timestamp(DAY, "cam_a_12:00:01.500000.txt", ".txt"),
            Some(DAY + 43201.5)
        );
        assert_eq!(frame_file_timestamp(DAY, "cam_12:00:01.5.header", ".txt"), None);
        assert_eq!(frame_file_timestamp(DAY, "notes.txt", ".txt"), None);
        assert_eq!(frame_file_timestamp(DAY, "cam_noon.txt", ".txt"), None);
    }

    #[test]
    fn pruning_rules() {
        let window = TimeWindow::new(100.0, 200.0).unwrap();
        let files = vec![
            ff("a", Some(10.0)),  // next starts before window: skipped
            ff("b", Some(50.0)),  // next starts inside window: may span into it
            ff("c", Some(150.0)), // inside
            ff("d", None),        // unknown: kept
            ff("e", Some(250.0)), // after window: skipped
        ];
        let kept: Vec<_> = select_in_window(files, &window)
            .into_iter()
            .map(|f| f.path)
            .collect();
        assert_eq!(
            kept,
            vec![PathBuf::from("b"), PathBuf::from("c"), PathBuf::from("d")]
        );
    }

    #[test]
    fn last_file_before_window_is_kept() {
        let window = TimeWindow::new(100.0, 200.0).unwrap();
        let kept = select_in_window(vec![ff("a", Some(10.0)), ff("b", Some(20.0))], &window);
        assert_eq!(kept, vec![ff("b", Some(20.0))]);
    }

    #[test]
    fn walk_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        for rel in [
            "20240305/zcam/zcam_10:00:00.000000.txt",
            "20240305/acam/acam_10:00:00.000000.txt",
            "20240305/acam/acam_11:00:00.000000.txt",
            "20240305/acam/acam_11:00:00.000000.fits.header",
            "20240305/acam/.hidden.txt",
            "20240305/notes.txt",
            "20240306/acam/acam_00:00:00.000000.txt",
        ] {
            let p = root.join(rel);
            std::fs::create_dir_all(p.parent().unwrap()).unwrap();
            std::fs::write(p, "").unwrap();
        }
        std::fs::create_dir_all(root.join("20240305/acam/cache")).unwrap();

        let window = TimeWindow::new(DAY + 10.5 * 3600.0, DAY + 11.5 * 3600.0).unwrap();
        let found = discover(root, &window, ".txt");
        let summary: Vec<(String, Vec<String>)> = found
            .iter()
            .map(|sd| {
                let names = sd
                    .files
                    .iter()
                    .map(|f| f.path.file_name().unwrap().to_string_lossy().into_owned())
                    .collect();
                (sd.stream.clone(), names)
            })
            .collect();
        assert_eq!(
            summary,
            vec![
                (
                    "acam".to_string(),
                    vec![
                        "acam_10:00:00.000000.txt".to_string(),
                        "acam_11:00:00.000000.txt".to_string()
                    ]
                ),
                (
                    "zcam".to_string(),
                    vec!["zcam_10:00:00.000000.txt".to_string()]
                ),
            ]
        );
    }
}
