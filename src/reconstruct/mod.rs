//! Timestamp reconstruction for counter-based device logs.
//!
//! Device counters restart at every boot and drift across days, so absolute
//! timestamps must be rebuilt from an anchor: a (wall-clock, counter) pair
//! treated as the zero-offset reference. The reconstructor advances a logical
//! day index on day-boundary signals (isolated Init markers separated by more
//! than [`INIT_GAP_THRESHOLD_MS`] of counter time) and guards against counter
//! overflow by never attributing a line to a point more than 24h past its
//! anchor. Counter regressions (reboots) re-anchor at the last reconstructed
//! timestamp so the output stream never runs backwards.

use std::path::PathBuf;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use thiserror::Error;

use crate::classify::RawLine;

/// Logical days start at 09:00 local time.
pub const DAY_START_HOUR: u32 = 9;

/// Counter gap between Init references that signals a new logical day: 5h.
pub const INIT_GAP_THRESHOLD_MS: i64 = 5 * 3600 * 1000;

/// One logical day of counter time.
pub const DAY_MS: i64 = 24 * 3600 * 1000;

/// Errors raised when a reconstruction session cannot be driven.
#[derive(Error, Debug)]
pub enum ReconstructError {
    #[error("no Init marker found in {}: reconstruction cannot be anchored", path.display())]
    NoAnchor { path: PathBuf },
}

/// One reconstructed line: an absolute timestamp plus the logical date used
/// for routing and window filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconstructed {
    /// Absolute timestamp assigned to the line.
    pub timestamp: NaiveDateTime,

    /// Calendar date of the current logical day (window start + day index).
    pub logical_date: NaiveDate,
}

/// Stateful counter-to-wall-clock mapper.
///
/// Owned by the segmentation driver and fed classified lines in file order.
/// One session may span multiple input files; the anchor and day index carry
/// over so a logically ordered multi-file stream reconstructs seamlessly.
#[derive(Debug)]
pub struct Reconstructor {
    start_date: NaiveDate,
    day_index: i64,
    anchor_wall_clock: NaiveDateTime,
    anchor_counter_ms: Option<i64>,
    last_init_ref_ms: Option<i64>,
    consecutive_init_run: bool,
    first_init_seen: bool,
    /// Counter of the previous classified line, sampled before Init handling.
    prev_counter_ms: Option<i64>,
    last_counter_seen: Option<i64>,
    last_reconstructed: Option<NaiveDateTime>,
}

impl Reconstructor {
    /// Create a session anchored at 09:00 on the window's start date.
    pub fn new(window_start: NaiveDateTime) -> Self {
        let start_date = window_start.date();

        Self {
            start_date,
            day_index: 0,
            anchor_wall_clock: day_base(start_date, 0),
            anchor_counter_ms: None,
            last_init_ref_ms: None,
            consecutive_init_run: false,
            first_init_seen: false,
            prev_counter_ms: None,
            last_counter_seen: None,
            last_reconstructed: None,
        }
    }

    /// Current logical day index.
    pub fn day_index(&self) -> i64 {
        self.day_index
    }

    /// Whether any Init marker has been observed yet.
    pub fn anchored(&self) -> bool {
        self.first_init_seen
    }

    /// Map one classified line to an absolute timestamp, updating state.
    ///
    /// Every classified line updates the session, including lines whose
    /// logical date falls outside the caller's window; the caller decides
    /// whether to emit the result.
    pub fn observe(&mut self, raw: &RawLine) -> Reconstructed {
        let counter = raw.counter_ms;

        if self.anchor_counter_ms.is_none() {
            self.anchor_counter_ms = Some(counter);
        }

        // Reboot: the counter went backwards. Continue from the last
        // reconstructed timestamp instead of regressing to 09:00.
        if self.last_counter_seen.is_some_and(|last| counter < last) {
            self.anchor_wall_clock = self
                .last_reconstructed
                .unwrap_or_else(|| day_base(self.start_date, self.day_index));
            self.anchor_counter_ms = Some(counter);
        }
        self.last_counter_seen = Some(counter);

        if raw.is_init {
            self.observe_init(counter);
        } else {
            self.consecutive_init_run = false;
        }

        self.prev_counter_ms = Some(counter);

        // Overflow guard: more than 24h of counter time since the anchor
        // means whole days elapsed without a day-boundary signal.
        let anchor_counter = self.anchor_counter_ms.unwrap_or(counter);
        let elapsed_ms = counter - anchor_counter;
        if elapsed_ms >= DAY_MS {
            let extra_days = elapsed_ms / DAY_MS;
            self.day_index += extra_days;
            self.anchor_wall_clock = day_base(self.start_date, self.day_index);
            // Keep the sub-day remainder instead of snapping to the counter.
            self.anchor_counter_ms = Some(anchor_counter + extra_days * DAY_MS);
        }

        let elapsed_ms = (counter - self.anchor_counter_ms.unwrap_or(counter)).max(0);
        let timestamp = self
            .anchor_wall_clock
            .checked_add_signed(Duration::milliseconds(elapsed_ms))
            .unwrap_or(NaiveDateTime::MAX);
        self.last_reconstructed = Some(timestamp);

        Reconstructed {
            timestamp,
            logical_date: day_base(self.start_date, self.day_index).date(),
        }
    }

    /// Init-marker bookkeeping: burst tracking and isolated-Init day advance.
    fn observe_init(&mut self, counter: i64) {
        if !self.first_init_seen || self.consecutive_init_run {
            // Global first Init, or a continuation of an Init burst.
            if !self.first_init_seen {
                self.first_init_seen = true;
                self.anchor_wall_clock = day_base(self.start_date, self.day_index);
                self.anchor_counter_ms = Some(counter);
            }
        } else {
            // Isolated Init: measure the counter gap from the line before
            // this one back to the previous Init reference.
            let prev = self.prev_counter_ms.unwrap_or(counter);
            let gap = prev - self.last_init_ref_ms.unwrap_or(prev);

            if gap > INIT_GAP_THRESHOLD_MS {
                self.day_index += 1;
                self.anchor_wall_clock = day_base(self.start_date, self.day_index);
                self.anchor_counter_ms = Some(counter);
            }
        }

        self.last_init_ref_ms = Some(counter);
        self.consecutive_init_run = true;
    }
}

/// 09:00:00 on logical day `day_index` counted from `start_date`.
///
/// Saturates at the calendar limit instead of overflowing, so an absurd
/// counter can push the day index arbitrarily far without aborting the run.
fn day_base(start_date: NaiveDate, day_index: i64) -> NaiveDateTime {
    let date = Duration::try_days(day_index)
        .and_then(|d| start_date.checked_add_signed(d))
        .unwrap_or(NaiveDate::MAX);
    date.and_hms_opt(DAY_START_HOUR, 0, 0)
        .unwrap_or_else(|| date.and_time(chrono::NaiveTime::MIN))
}
