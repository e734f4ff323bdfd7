//! Line classification for raw device log lines.
//!
//! A raw line optionally carries a decimal millisecond counter, an "Init"
//! boot marker, and a free-text message after the first semicolon. Lines
//! without a counter are unparseable and silently skipped by callers; many
//! device lines legitimately carry no timestamp.

/// One classified raw log line. Ephemeral; discarded after reconstruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    /// Device counter in milliseconds since an arbitrary boot.
    pub counter_ms: i64,

    /// Whether the line is an "Init" (device boot) marker.
    pub is_init: bool,

    /// Lower-cased message payload, stripped of line endings.
    pub message: String,
}

/// Counters beyond ten years of device time are corrupt, not real uptime.
const MAX_COUNTER_MS: i64 = 10 * 365 * 24 * 3600 * 1000;

/// Classify one raw text line.
///
/// Returns `None` when the line carries no parseable counter token. The
/// counter is the first decimal integer run in the line; an Init marker is
/// a counter followed by `; Init`, with an optional `ms` unit before the
/// semicolon (whitespace optional, case-insensitive).
pub fn classify_line(line: &str) -> Option<RawLine> {
    let counter_ms = first_integer_token(line)?;

    Some(RawLine {
        counter_ms,
        is_init: is_init_marker(line),
        message: extract_message(line),
    })
}

/// Extract the first run of ASCII digits as an i64.
///
/// Runs too long to fit an i64, or values past [`MAX_COUNTER_MS`], make the
/// line unparseable.
fn first_integer_token(line: &str) -> Option<i64> {
    let bytes = line.as_bytes();
    let start = bytes.iter().position(|b| b.is_ascii_digit())?;
    let len = bytes[start..]
        .iter()
        .take_while(|b| b.is_ascii_digit())
        .count();

    line[start..start + len]
        .parse()
        .ok()
        .filter(|&v| v <= MAX_COUNTER_MS)
}

/// Whether the line contains `<digits> [ms] ; Init` (case-insensitive).
fn is_init_marker(line: &str) -> bool {
    let bytes = line.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if !bytes[i].is_ascii_digit() {
            i += 1;
            continue;
        }

        // Consume the digit run, then try to match the marker tail.
        let mut j = i;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }

        if matches_marker_tail(&line[j..]) {
            return true;
        }

        i = j;
    }

    false
}

/// Match `\s* [ms] \s* ; \s* init` (case-insensitive) at the start of `rest`.
fn matches_marker_tail(rest: &str) -> bool {
    let rest = rest.trim_start();
    let rest = strip_prefix_ignore_case(rest, "ms").unwrap_or(rest);
    let rest = rest.trim_start();
    let Some(rest) = rest.strip_prefix(';') else {
        return false;
    };

    strip_prefix_ignore_case(rest.trim_start(), "init").is_some()
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if s.len() >= prefix.len() && s[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

/// Extract the message payload: everything after the first semicolon,
/// or the whole line when no semicolon exists. Lower-cased, trimmed.
fn extract_message(line: &str) -> String {
    let msg = match line.split_once(';') {
        Some((_, rest)) => rest,
        None => line,
    };

    msg.trim()
        .replace(['\r', '\n'], "")
        .trim()
        .to_lowercase()
}
