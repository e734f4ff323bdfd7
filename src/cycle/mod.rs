//! Push/release cycle extraction over reconstructed log files.
//!
//! Reconstructed files carry `YYYY-MM-DD HH:MM:SS - message` lines in
//! chronological order. Each line is classified into a (channel, action)
//! pair by vocabulary matching; a per-channel state machine then pairs each
//! push with the next release on the same channel and emits a timed cycle.
//!
//! Only the most recent unmatched push per channel is remembered: a second
//! push overwrites it, and a release without a pending push is ignored.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Serialize, Serializer};
use tracing::{debug, info};

use crate::config::Window;
use crate::stats::{Outcome, RunStats};

/// Push-action vocabulary, matched on word boundaries.
const PUSH_KEYWORDS: &[&str] = &["push", "pushed", "pressed", "down"];

/// Release-action vocabulary, matched on word boundaries.
const RELEASE_KEYWORDS: &[&str] = &["release", "released", "up"];

/// Switch channel identifier. The vocabulary is fixed at four channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Channel {
    Sw1 = 0,
    Sw2 = 1,
    Sw3 = 2,
    Sw4 = 3,
}

/// Number of known channels, used for pending-push table sizing.
pub const CHANNEL_COUNT: usize = 4;

impl Channel {
    /// Returns the canonical display name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sw1 => "SW1",
            Self::Sw2 => "SW2",
            Self::Sw3 => "SW3",
            Self::Sw4 => "SW4",
        }
    }

    /// Returns the lower-case token matched in log messages.
    pub const fn token(self) -> &'static str {
        match self {
            Self::Sw1 => "sw1",
            Self::Sw2 => "sw2",
            Self::Sw3 => "sw3",
            Self::Sw4 => "sw4",
        }
    }

    /// Convert from a channel token, case-insensitively.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "sw1" => Some(Self::Sw1),
            "sw2" => Some(Self::Sw2),
            "sw3" => Some(Self::Sw3),
            "sw4" => Some(Self::Sw4),
            _ => None,
        }
    }

    /// Return all channels in numeric order.
    pub fn all() -> &'static [Self] {
        &[Self::Sw1, Self::Sw2, Self::Sw3, Self::Sw4]
    }
}

impl Serialize for Channel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Action carried by a classified line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Push,
    Release,
}

/// One matched push/release pair. Immutable once emitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cycle {
    pub channel: Channel,
    pub push_at: NaiveDateTime,
    pub release_at: NaiveDateTime,
    pub duration_secs: f64,
    /// True when duration_secs is at or above the configured threshold.
    pub extended: bool,
    /// Calendar date of the push, used for day bucketing.
    pub date: NaiveDate,
    pub push_message: String,
    pub release_message: String,
}

/// Classify a message into its channel and action.
///
/// The first known channel token (by position) decides the channel. A line
/// carrying both push and release keywords counts as a release; device logs
/// phrase some releases that way, so the tie-break favors release.
pub fn classify_action(message: &str) -> Option<(Channel, Action)> {
    let msg = message.to_ascii_lowercase();

    let channel = Channel::all()
        .iter()
        .filter_map(|c| find_word(&msg, c.token()).map(|pos| (pos, *c)))
        .min_by_key(|(pos, _)| *pos)
        .map(|(_, c)| c)?;

    let is_push = PUSH_KEYWORDS.iter().any(|k| contains_word(&msg, k));
    let is_release = RELEASE_KEYWORDS.iter().any(|k| contains_word(&msg, k));

    match (is_push, is_release) {
        (_, true) => Some((channel, Action::Release)),
        (true, false) => Some((channel, Action::Push)),
        (false, false) => None,
    }
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Byte offset of `word` in `haystack` with non-word bytes on both sides.
fn find_word(haystack: &str, word: &str) -> Option<usize> {
    let hay = haystack.as_bytes();
    let mut from = 0;

    while let Some(rel) = haystack[from..].find(word) {
        let start = from + rel;
        let end = start + word.len();

        let left_ok = start == 0 || !is_word_byte(hay[start - 1]);
        let right_ok = end == hay.len() || !is_word_byte(hay[end]);
        if left_ok && right_ok {
            return Some(start);
        }

        from = start + 1;
    }

    None
}

fn contains_word(haystack: &str, word: &str) -> bool {
    find_word(haystack, word).is_some()
}

/// Parse one reconstructed line into (timestamp, message).
///
/// Expects `YYYY-MM-DD HH:MM:SS - message`; whitespace around the dash is
/// flexible. Returns `None` for anything else.
pub fn parse_reconstructed_line(line: &str) -> Option<(NaiveDateTime, &str)> {
    let line = line.trim();
    let stamp = line.get(..19)?;
    let timestamp = NaiveDateTime::parse_from_str(stamp, "%Y-%m-%d %H:%M:%S").ok()?;

    let rest = line[19..].trim_start();
    let message = rest.strip_prefix('-')?.trim();
    if message.is_empty() {
        return None;
    }

    Some((timestamp, message))
}

/// The most recent unmatched push on a channel.
#[derive(Debug, Clone)]
struct PendingPush {
    at: NaiveDateTime,
    message: String,
}

/// Per-channel push/release pairing state machine.
///
/// Input lines must arrive in chronological order; emitted cycle durations
/// are then always non-negative.
#[derive(Debug)]
pub struct CycleExtractor {
    threshold_secs: f64,
    enabled: Vec<Channel>,
    pending: [Option<PendingPush>; CHANNEL_COUNT],
    cycles: Vec<Cycle>,
}

impl CycleExtractor {
    /// Create an extractor for the given channels and extended threshold.
    pub fn new(threshold_secs: f64, enabled: &[Channel]) -> Self {
        Self {
            threshold_secs,
            enabled: enabled.to_vec(),
            pending: std::array::from_fn(|_| None),
            cycles: Vec::new(),
        }
    }

    /// Feed one chronologically ordered reconstructed line.
    pub fn observe(&mut self, timestamp: NaiveDateTime, message: &str, stats: &mut RunStats) {
        let Some((channel, action)) = classify_action(message) else {
            return;
        };

        if !self.enabled.contains(&channel) {
            return;
        }

        let slot = &mut self.pending[channel as usize];

        match action {
            Action::Push => {
                // A push while one is already pending overwrites it.
                *slot = Some(PendingPush {
                    at: timestamp,
                    message: message.to_string(),
                });
                stats.record(Outcome::PushRecorded);
            }
            Action::Release => {
                let Some(push) = slot.take() else {
                    stats.record(Outcome::ReleaseUnmatched);
                    return;
                };

                let duration_secs =
                    (timestamp - push.at).num_milliseconds() as f64 / 1000.0;

                self.cycles.push(Cycle {
                    channel,
                    push_at: push.at,
                    release_at: timestamp,
                    duration_secs,
                    extended: duration_secs >= self.threshold_secs,
                    date: push.at.date(),
                    push_message: push.message,
                    release_message: message.to_string(),
                });
                stats.record(Outcome::CycleEmitted);
            }
        }
    }

    /// Consume the extractor, returning emitted cycles in emission order.
    /// Unmatched pending pushes are discarded.
    pub fn into_cycles(self) -> Vec<Cycle> {
        self.cycles
    }
}

/// Result of a cycle extraction run.
#[derive(Debug)]
pub struct CycleReport {
    /// Emitted cycles, chronologically ordered by release time.
    pub cycles: Vec<Cycle>,

    /// Line counters for the run.
    pub stats: RunStats,
}

/// Extract cycles from reconstructed files or directories of them.
///
/// Directories contribute their `.txt` files; everything is deduplicated and
/// read in file-name-sorted order. Files named `log_<start>_to_<end>.txt`
/// whose range lies wholly outside the window are skipped without opening.
/// An empty result is not an error: it means no data in range.
pub fn extract_cycles(
    inputs: &[PathBuf],
    window: &Window,
    threshold_secs: f64,
    channels: &[Channel],
) -> Result<CycleReport> {
    let files = collect_input_files(inputs)?;
    let mut extractor = CycleExtractor::new(threshold_secs, channels);
    let mut stats = RunStats::new();

    for path in &files {
        if let Some((file_start, file_end)) = file_date_range(path) {
            if file_end < window.start_date() || file_start > window.end_date() {
                debug!(file = %path.display(), "skipping file outside window");
                continue;
            }
        }

        scan_file(path, window, &mut extractor, &mut stats)?;
    }

    let cycles = extractor.into_cycles();

    info!(
        files = files.len(),
        cycles = cycles.len(),
        unmatched_releases = stats.get(Outcome::ReleaseUnmatched),
        "cycle extraction complete",
    );

    Ok(CycleReport { cycles, stats })
}

/// Feed one reconstructed file into the extractor.
fn scan_file(
    path: &Path,
    window: &Window,
    extractor: &mut CycleExtractor,
    stats: &mut RunStats,
) -> Result<()> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
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
        let Some((timestamp, message)) = parse_reconstructed_line(&line) else {
            stats.record(Outcome::LineUnparseable);
            continue;
        };
        stats.record(Outcome::LineClassified);

        if timestamp < window.start {
            stats.record(Outcome::LineOutOfWindow);
            continue;
        }
        if timestamp > window.end {
            // Files are chronological, so nothing later can be in-window.
            stats.record(Outcome::LineOutOfWindow);
            break;
        }

        extractor.observe(timestamp, message, stats);
    }

    Ok(())
}

/// Resolve input paths into a deduplicated, name-sorted file list.
pub fn collect_input_files(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    if inputs.is_empty() {
        bail!("no input files given");
    }

    let mut files = Vec::new();

    for input in inputs {
        if input.is_dir() {
            let mut entries: Vec<PathBuf> = std::fs::read_dir(input)
                .with_context(|| format!("reading directory {}", input.display()))?
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| {
                    p.is_file()
                        && p.extension()
                            .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"))
                })
                .collect();
            entries.sort();
            files.extend(entries);
        } else if input.is_file() {
            files.push(input.clone());
        } else {
            bail!("input not found: {}", input.display());
        }
    }

    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    for f in files {
        let key = f.canonicalize().unwrap_or_else(|_| f.clone());
        if seen.insert(key) {
            unique.push(f);
        }
    }

    unique.sort_by_key(|p| {
        p.file_name()
            .map(|n| n.to_ascii_lowercase())
            .unwrap_or_default()
    });

    Ok(unique)
}

/// Parse the clipped date range out of a `log_<start>_to_<end>.txt` name.
pub fn file_date_range(path: &Path) -> Option<(NaiveDate, NaiveDate)> {
    let name = path.file_name()?.to_str()?.to_ascii_lowercase();
    let middle = name.strip_prefix("log_")?.strip_suffix(".txt")?;
    let (start, end) = middle.split_once("_to_")?;

    Some((start.parse().ok()?, end.parse().ok()?))
}
