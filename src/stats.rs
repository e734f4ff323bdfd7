/// Per-line processing outcome, used to index run counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Outcome {
    LineClassified = 0,
    LineUnparseable = 1,
    LineOutOfWindow = 2,
    LineWritten = 3,
    PushRecorded = 4,
    ReleaseUnmatched = 5,
    CycleEmitted = 6,
}

/// Number of outcome kinds, used for array sizing.
const OUTCOME_COUNT: usize = 7;

impl Outcome {
    /// Returns the canonical log label name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LineClassified => "line_classified",
            Self::LineUnparseable => "line_unparseable",
            Self::LineOutOfWindow => "line_out_of_window",
            Self::LineWritten => "line_written",
            Self::PushRecorded => "push_recorded",
            Self::ReleaseUnmatched => "release_unmatched",
            Self::CycleEmitted => "cycle_emitted",
        }
    }

    fn from_index(i: usize) -> Option<Self> {
        match i {
            0 => Some(Self::LineClassified),
            1 => Some(Self::LineUnparseable),
            2 => Some(Self::LineOutOfWindow),
            3 => Some(Self::LineWritten),
            4 => Some(Self::PushRecorded),
            5 => Some(Self::ReleaseUnmatched),
            6 => Some(Self::CycleEmitted),
            _ => None,
        }
    }
}

/// Per-outcome counters for one processing run.
///
/// The session is single-threaded by contract, so these are plain counters;
/// `snapshot()` returns only the non-zero entries for compact reporting.
#[derive(Debug, Default)]
pub struct RunStats {
    counts: [u64; OUTCOME_COUNT],
}

impl RunStats {
    /// Create a new zeroed RunStats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the counter for the given outcome by one.
    pub fn record(&mut self, o: Outcome) {
        if let Some(counter) = self.counts.get_mut(o as usize) {
            *counter += 1;
        }
    }

    /// Read the counter for the given outcome.
    pub fn get(&self, o: Outcome) -> u64 {
        self.counts.get(o as usize).copied().unwrap_or(0)
    }

    /// Return all non-zero counters.
    pub fn snapshot(&self) -> Vec<(Outcome, u64)> {
        let mut result = Vec::new();

        for (i, &v) in self.counts.iter().enumerate() {
            if v > 0 {
                if let Some(o) = Outcome::from_index(i) {
                    result.push((o, v));
                }
            }
        }

        result
    }
}
