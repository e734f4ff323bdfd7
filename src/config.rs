use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;

use crate::cycle::Channel;

/// Accepted window datetime formats, tried in order. The `bool` marks
/// date-only formats, which resolve to midnight of that day.
const WINDOW_FORMATS: &[(&str, bool)] = &[
    ("%Y-%m-%d %H:%M:%S", false),
    ("%Y-%m-%d", true),
    ("%d-%m-%Y %H:%M:%S", false),
    ("%d-%m-%Y", true),
    ("%d/%m/%Y %H:%M:%S", false),
    ("%d/%m/%Y", true),
    ("%Y/%m/%d %H:%M:%S", false),
    ("%Y/%m/%d", true),
];

/// Top-level configuration for a logstitch run.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Logging verbosity (debug, info, warn, error). Default: "info".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Analysis window, applied to both splitting and cycle extraction.
    #[serde(default)]
    pub window: WindowConfig,

    /// Duration at or above which a cycle is classified as extended.
    /// Default: 3.0 seconds.
    #[serde(default = "default_extended_threshold_secs")]
    pub extended_threshold_secs: f64,

    /// Switch channels to track. Default: sw1-sw4.
    #[serde(default = "default_channels")]
    pub channels: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            window: WindowConfig::default(),
            extended_threshold_secs: default_extended_threshold_secs(),
            channels: default_channels(),
        }
    }
}

/// Requested analysis window configuration.
#[derive(Debug, Default, Deserialize)]
pub struct WindowConfig {
    /// Window start (e.g. "2025-10-05" or "2025-10-05 00:00:00").
    #[serde(default)]
    pub start: String,

    /// Window end (e.g. "2026-02-09 23:59:59").
    #[serde(default)]
    pub end: String,
}

/// Resolved, validated analysis window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Window {
    /// Parse and validate a window from raw start/end strings.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        if start.trim().is_empty() {
            bail!("window start is required");
        }
        if end.trim().is_empty() {
            bail!("window end is required");
        }

        let start = parse_window_datetime(start)
            .with_context(|| format!("invalid window start: {start:?}"))?;
        let end = parse_window_datetime(end)
            .with_context(|| format!("invalid window end: {end:?}"))?;

        if start > end {
            bail!("window start {start} is after window end {end}");
        }

        Ok(Self { start, end })
    }

    /// First calendar date covered by the window.
    pub fn start_date(&self) -> NaiveDate {
        self.start.date()
    }

    /// Last calendar date covered by the window.
    pub fn end_date(&self) -> NaiveDate {
        self.end.date()
    }

    /// Whether the given date falls inside the window's date span.
    pub fn contains_date(&self, date: NaiveDate) -> bool {
        date >= self.start_date() && date <= self.end_date()
    }
}

/// Parse a window boundary, trying each accepted format in order.
pub fn parse_window_datetime(value: &str) -> Result<NaiveDateTime> {
    let s = value.trim();

    for (format, date_only) in WINDOW_FORMATS {
        if *date_only {
            if let Ok(d) = NaiveDate::parse_from_str(s, format) {
                if let Some(dt) = d.and_hms_opt(0, 0, 0) {
                    return Ok(dt);
                }
            }
        } else if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(dt);
        }
    }

    bail!(
        "unrecognized datetime {s:?} (accepted: YYYY-MM-DD [HH:MM:SS], \
         DD-MM-YYYY [HH:MM:SS], DD/MM/YYYY [HH:MM:SS], YYYY/MM/DD [HH:MM:SS])"
    )
}

// --- Default value functions ---

fn default_log_level() -> String {
    "info".to_string()
}

fn default_extended_threshold_secs() -> f64 {
    3.0
}

fn default_channels() -> Vec<String> {
    Channel::all().iter().map(|c| c.token().to_string()).collect()
}

// --- Validation and loading ---

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;

        let cfg: Config = serde_yaml::from_str(&data)
            .with_context(|| format!("parsing config file {}", path.display()))?;

        cfg.validate()?;

        Ok(cfg)
    }

    /// Validate the configuration for required fields and consistency.
    pub fn validate(&self) -> Result<()> {
        if !self.extended_threshold_secs.is_finite() || self.extended_threshold_secs < 0.0 {
            bail!(
                "extended_threshold_secs must be a non-negative number, got {}",
                self.extended_threshold_secs
            );
        }

        if self.channels.is_empty() {
            bail!("channels must not be empty");
        }

        for token in &self.channels {
            if Channel::from_token(token).is_none() {
                bail!("unknown channel: {token}");
            }
        }

        Ok(())
    }

    /// Resolve the configured channel tokens into channel identifiers.
    pub fn resolved_channels(&self) -> Vec<Channel> {
        let mut out = Vec::with_capacity(self.channels.len());
        for token in &self.channels {
            if let Some(c) = Channel::from_token(token) {
                if !out.contains(&c) {
                    out.push(c);
                }
            }
        }
        out
    }
}
