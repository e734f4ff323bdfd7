//! Day-level aggregation over extracted cycles.
//!
//! Buckets cycles by the date of their push and writes the plain-text
//! summary consumed by downstream reporting. Spreadsheet export and plotting
//! live outside this crate.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;

use crate::config::Window;
use crate::cycle::{Channel, Cycle};

/// Per-day cycle counts, overall and per channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayCounts {
    pub date: NaiveDate,
    /// All cycles that day.
    pub general: u64,
    /// Cycles at or above the extended threshold.
    pub extended: u64,
    /// (channel, general, extended) triples for channels active that day.
    pub channels: Vec<(Channel, u64, u64)>,
}

/// Bucket cycles into per-day counts, ordered by date.
pub fn day_counts(cycles: &[Cycle]) -> Vec<DayCounts> {
    let mut days: BTreeMap<NaiveDate, BTreeMap<Channel, (u64, u64)>> = BTreeMap::new();

    for c in cycles {
        let per_channel = days.entry(c.date).or_default();
        let entry = per_channel.entry(c.channel).or_insert((0, 0));
        entry.0 += 1;
        if c.extended {
            entry.1 += 1;
        }
    }

    days.into_iter()
        .map(|(date, per_channel)| {
            let general = per_channel.values().map(|(g, _)| g).sum();
            let extended = per_channel.values().map(|(_, e)| e).sum();
            DayCounts {
                date,
                general,
                extended,
                channels: per_channel
                    .into_iter()
                    .map(|(c, (g, e))| (c, g, e))
                    .collect(),
            }
        })
        .collect()
}

/// Write the plain-text run summary to `path`.
///
/// An empty cycle list is reported as "no data in range", not an error.
pub fn write_summary(
    cycles: &[Cycle],
    window: &Window,
    threshold_secs: f64,
    path: &Path,
) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("creating summary file {}", path.display()))?;
    let mut out = std::io::BufWriter::new(file);

    let calendar_days = (window.end_date() - window.start_date()).num_days() + 1;

    writeln!(
        out,
        "Summary from {} to {} ({} days calendar)",
        window.start_date(),
        window.end_date(),
        calendar_days,
    )?;

    if cycles.is_empty() {
        writeln!(out, "No push/release cycles detected in the interval.")?;
        out.flush().context("flushing summary file")?;
        return Ok(());
    }

    let first = cycles
        .iter()
        .map(|c| c.push_at)
        .min()
        .unwrap_or(window.start);
    let last = cycles
        .iter()
        .map(|c| c.release_at)
        .max()
        .unwrap_or(window.end);

    let total_general = cycles.len() as u64;
    let total_extended = cycles.iter().filter(|c| c.extended).count() as u64;

    let days = day_counts(cycles);
    let days_present = days.len().max(1) as i64;

    let dur_sum: f64 = cycles.iter().map(|c| c.duration_secs).sum();
    let dur_mean = dur_sum / cycles.len() as f64;
    let dur_max = cycles.iter().map(|c| c.duration_secs).fold(0.0, f64::max);

    writeln!(out, "Log cycles time range: {} to {}", first.date(), last.date())?;
    writeln!(out)?;
    writeln!(out, "Extended threshold (seconds): {threshold_secs}")?;
    writeln!(out)?;
    writeln!(out, "Total general cycles (push+release): {total_general}")?;
    writeln!(out, "Total extended cycles (>= threshold): {total_extended}")?;
    writeln!(out)?;
    writeln!(out, "Days present (unique dates with cycles): {days_present}")?;
    writeln!(out, "Difference (calendar - present): {}", calendar_days - days_present)?;
    writeln!(out)?;
    writeln!(
        out,
        "Average general cycles per day: {:.2}",
        total_general as f64 / days_present as f64,
    )?;
    writeln!(
        out,
        "Average extended cycles per day: {:.2}",
        total_extended as f64 / days_present as f64,
    )?;
    writeln!(out)?;
    writeln!(out, "Duration mean (s): {dur_mean:.2}")?;
    writeln!(out, "Duration max (s): {dur_max:.2}")?;

    out.flush().context("flushing summary file")?;

    Ok(())
}
