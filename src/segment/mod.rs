//! Month segmentation: routes reconstructed lines into per-calendar-month
//! files and drives the classify -> reconstruct -> route pipeline over raw
//! input files.
//!
//! Output files are named `log_<start>_to_<end>.txt` after their clipped
//! month sub-range so downstream extraction can order and window-filter them
//! by name alone.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use tracing::{debug, info};

use crate::classify::classify_line;
use crate::config::Window;
use crate::reconstruct::{ReconstructError, Reconstructor};
use crate::stats::{Outcome, RunStats};

/// One calendar-month sub-range, clipped to the requested window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl MonthRange {
    /// Deterministic output file name for this sub-range.
    pub fn file_name(&self) -> String {
        format!("log_{}_to_{}.txt", self.start, self.end)
    }

    fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Partition the window into consecutive month sub-ranges.
///
/// The first sub-range starts at the window start (not necessarily day 1 of
/// its month); the last ends at the window end.
pub fn month_ranges(window: &Window) -> Vec<MonthRange> {
    let mut ranges = Vec::new();
    let end = window.end_date();
    let mut cur = window.start_date();

    while cur <= end {
        let month_last = last_day_of_month(cur);
        ranges.push(MonthRange {
            start: cur,
            end: end.min(month_last),
        });

        cur = match first_day_of_next_month(cur) {
            Some(d) => d,
            None => break,
        };
    }

    ranges
}

fn last_day_of_month(d: NaiveDate) -> NaiveDate {
    match first_day_of_next_month(d) {
        Some(next) => next - Duration::days(1),
        None => d,
    }
}

fn first_day_of_next_month(d: NaiveDate) -> Option<NaiveDate> {
    if d.month() == 12 {
        NaiveDate::from_ymd_opt(d.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(d.year(), d.month() + 1, 1)
    }
}

/// Routes reconstructed lines to per-month output files.
///
/// Files are created lazily on first write. Handles close when the router is
/// dropped on any exit path; call [`MonthRouter::finish`] on the success path
/// to flush and surface write errors.
#[derive(Debug)]
pub struct MonthRouter {
    output_dir: PathBuf,
    slots: Vec<(MonthRange, Option<BufWriter<File>>)>,
}

impl MonthRouter {
    /// Create a router for the window's month sub-ranges under `output_dir`.
    pub fn new(output_dir: &Path, window: &Window) -> Result<Self> {
        std::fs::create_dir_all(output_dir)
            .with_context(|| format!("creating output directory {}", output_dir.display()))?;

        let slots = month_ranges(window)
            .into_iter()
            .map(|r| (r, None))
            .collect();

        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            slots,
        })
    }

    /// Append a reconstructed line to the sub-range containing `date`.
    ///
    /// Returns `true` when the line was written; dates outside every
    /// sub-range are dropped.
    pub fn write_line(
        &mut self,
        date: NaiveDate,
        timestamp: NaiveDateTime,
        message: &str,
    ) -> Result<bool> {
        let Some((range, writer)) = self.slots.iter_mut().find(|(r, _)| r.contains(date)) else {
            return Ok(false);
        };

        if writer.is_none() {
            let path = self.output_dir.join(range.file_name());
            let file = File::create(&path)
                .with_context(|| format!("creating output file {}", path.display()))?;
            debug!(path = %path.display(), "opened month output file");
            *writer = Some(BufWriter::new(file));
        }

        if let Some(w) = writer {
            writeln!(w, "{} - {}", timestamp.format("%Y-%m-%d %H:%M:%S"), message)
                .with_context(|| format!("writing to {}", range.file_name()))?;
        }

        Ok(true)
    }

    /// Paths of the output files written so far.
    pub fn written_files(&self) -> Vec<PathBuf> {
        self.slots
            .iter()
            .filter(|(_, w)| w.is_some())
            .map(|(r, _)| self.output_dir.join(r.file_name()))
            .collect()
    }

    /// Flush and close all output files, surfacing any write error.
    pub fn finish(mut self) -> Result<Vec<PathBuf>> {
        for (range, writer) in &mut self.slots {
            if let Some(w) = writer.as_mut() {
                w.flush()
                    .with_context(|| format!("flushing {}", range.file_name()))?;
            }
        }

        Ok(self.written_files())
    }
}

/// Result of a segmentation run.
#[derive(Debug)]
pub struct SplitSummary {
    /// Month files that received at least one line, in range order.
    pub files: Vec<PathBuf>,

    /// Line counters for the run.
    pub stats: RunStats,
}

/// Split raw input files into per-month reconstructed files.
///
/// Inputs are processed in file-name-sorted order through a single
/// reconstruction session, so counters may continue across file boundaries.
/// Every input path must exist before any output is touched, and each input
/// must contain at least one Init marker to anchor reconstruction.
pub fn split_files(inputs: &[PathBuf], output_dir: &Path, window: &Window) -> Result<SplitSummary> {
    if inputs.is_empty() {
        bail!("no input files given");
    }

    for path in inputs {
        if !path.is_file() {
            bail!("input not found: {}", path.display());
        }
    }

    let mut ordered: Vec<PathBuf> = inputs.to_vec();
    ordered.sort_by_key(|p| p.file_name().map(|n| n.to_ascii_lowercase()));

    // Anchor check up front so no partial output is left behind.
    for path in &ordered {
        ensure_has_init(path)?;
    }

    let mut session = Reconstructor::new(window.start);
    let mut router = MonthRouter::new(output_dir, window)?;
    let mut stats = RunStats::new();

    for path in &ordered {
        split_one(path, window, &mut session, &mut router, &mut stats)?;
    }

    let files = router.finish()?;

    info!(
        inputs = ordered.len(),
        outputs = files.len(),
        written = stats.get(Outcome::LineWritten),
        skipped = stats.get(Outcome::LineUnparseable),
        out_of_window = stats.get(Outcome::LineOutOfWindow),
        "split complete",
    );

    Ok(SplitSummary { files, stats })
}

/// Drive one input file through the session and router.
fn split_one(
    input: &Path,
    window: &Window,
    session: &mut Reconstructor,
    router: &mut MonthRouter,
    stats: &mut RunStats,
) -> Result<()> {
    let file =
        File::open(input).with_context(|| format!("opening input {}", input.display()))?;
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let n = reader
            .read_until(b'\n', &mut buf)
            .with_context(|| format!("reading {}", input.display()))?;
        if n == 0 {
            break;
        }

        // Device logs occasionally carry bytes that are not valid UTF-8.
        let line = String::from_utf8_lossy(&buf);

        let Some(raw) = classify_line(&line) else {
            stats.record(Outcome::LineUnparseable);
            continue;
        };
        stats.record(Outcome::LineClassified);

        let out = session.observe(&raw);

        // Reconstructed for state continuity, but only emitted in-window.
        if !window.contains_date(out.logical_date) {
            stats.record(Outcome::LineOutOfWindow);
            continue;
        }

        if router.write_line(out.logical_date, out.timestamp, &raw.message)? {
            stats.record(Outcome::LineWritten);
        } else {
            stats.record(Outcome::LineOutOfWindow);
        }
    }

    debug!(input = %input.display(), "input file processed");

    Ok(())
}

/// Verify the input contains at least one Init marker.
fn ensure_has_init(path: &Path) -> Result<()> {
    let file = File::open(path).with_context(|| format!("opening input {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let n = reader
            .read_until(b'\n', &mut buf)
            .with_context(|| format!("reading {}", path.display()))?;
        if n == 0 {
            break;
        }

        let line = String::from_utf8_lossy(&buf);
        if classify_line(&line).is_some_and(|raw| raw.is_init) {
            return Ok(());
        }
    }

    Err(ReconstructError::NoAnchor {
        path: path.to_path_buf(),
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(start: &str, end: &str) -> Window {
        Window::parse(start, end).unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_single_month_range() {
        let ranges = month_ranges(&window("2025-10-05", "2025-10-20"));
        assert_eq!(
            ranges,
            vec![MonthRange {
                start: date("2025-10-05"),
                end: date("2025-10-20"),
            }]
        );
    }

    #[test]
    fn test_ranges_clip_to_window_edges() {
        let ranges = month_ranges(&window("2025-10-05", "2025-12-09 23:59:59"));
        assert_eq!(ranges.len(), 3);
        assert_eq!(ranges[0].start, date("2025-10-05"));
        assert_eq!(ranges[0].end, date("2025-10-31"));
        assert_eq!(ranges[1].start, date("2025-11-01"));
        assert_eq!(ranges[1].end, date("2025-11-30"));
        assert_eq!(ranges[2].start, date("2025-12-01"));
        assert_eq!(ranges[2].end, date("2025-12-09"));
    }

    #[test]
    fn test_ranges_cross_year_boundary() {
        let ranges = month_ranges(&window("2025-12-20", "2026-01-10"));
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[0].end, date("2025-12-31"));
        assert_eq!(ranges[1].start, date("2026-01-01"));
        assert_eq!(ranges[1].end, date("2026-01-10"));
    }

    #[test]
    fn test_february_leap_year() {
        let ranges = month_ranges(&window("2024-02-01", "2024-02-29"));
        assert_eq!(
            ranges,
            vec![MonthRange {
                start: date("2024-02-01"),
                end: date("2024-02-29"),
            }]
        );
    }

    #[test]
    fn test_file_name_encodes_clipped_range() {
        let r = MonthRange {
            start: date("2025-10-05"),
            end: date("2025-10-31"),
        };
        assert_eq!(r.file_name(), "log_2025-10-05_to_2025-10-31.txt");
    }

    #[test]
    fn test_router_drops_out_of_range_dates() {
        let dir = tempfile::tempdir().unwrap();
        let w = window("2025-10-05", "2025-10-31");
        let mut router = MonthRouter::new(dir.path(), &w).unwrap();

        let ts = date("2025-11-02").and_hms_opt(10, 0, 0).unwrap();
        let written = router.write_line(date("2025-11-02"), ts, "late line").unwrap();
        assert!(!written);
        assert!(router.finish().unwrap().is_empty());
    }

    #[test]
    fn test_router_creates_files_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let w = window("2025-10-05", "2025-11-30");
        let mut router = MonthRouter::new(dir.path(), &w).unwrap();

        let ts = date("2025-10-06").and_hms_opt(9, 0, 0).unwrap();
        assert!(router.write_line(date("2025-10-06"), ts, "msg").unwrap());

        let files = router.finish().unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("log_2025-10-05_to_2025-10-31.txt"));
        // The November range received nothing, so no file exists for it.
        assert!(!dir.path().join("log_2025-11-01_to_2025-11-30.txt").exists());
    }

    #[test]
    fn test_split_missing_input_fails_before_output() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let w = window("2025-10-05", "2025-10-31");

        let result = split_files(&[dir.path().join("nope.txt")], &out, &w);
        assert!(result.is_err());
        assert!(!out.exists());
    }

    #[test]
    fn test_split_requires_init_marker() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("LOG.TXT");
        std::fs::write(&input, "100 ms; sw1 pushed\n200 ms; sw1 released\n").unwrap();

        let out = dir.path().join("out");
        let w = window("2025-10-05", "2025-10-31");
        let err = split_files(&[input], &out, &w).unwrap_err();
        assert!(err.to_string().contains("no Init marker"));
        assert!(!out.exists());
    }

    #[test]
    fn test_split_writes_reconstructed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("LOG.TXT");
        std::fs::write(
            &input,
            "100 ms; Init\n200 ms; SW1 Pushed\n3500 ms; SW1 Released\njunk line\n",
        )
        .unwrap();

        let out = dir.path().join("out");
        let w = window("2025-10-05", "2025-10-31");
        let summary = split_files(&[input], &out, &w).unwrap();

        assert_eq!(summary.files.len(), 1);
        let content = std::fs::read_to_string(&summary.files[0]).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines,
            vec![
                "2025-10-05 09:00:00 - init",
                "2025-10-05 09:00:00 - sw1 pushed",
                "2025-10-05 09:00:03 - sw1 released",
            ]
        );
        assert_eq!(summary.stats.get(Outcome::LineWritten), 3);
        assert_eq!(summary.stats.get(Outcome::LineUnparseable), 1);
    }
}
