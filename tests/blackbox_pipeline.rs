use std::path::{Path, PathBuf};

use logstitch::config::Window;
use logstitch::cycle::{extract_cycles, Channel};
use logstitch::segment::split_files;
use logstitch::stats::Outcome;

fn window(start: &str, end: &str) -> Window {
    Window::parse(start, end).expect("valid window")
}

fn write_input(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).expect("writing fixture");
    path
}

fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .expect("reading output")
        .lines()
        .map(str::to_string)
        .collect()
}

/// Split the given raw content and run extraction over the result.
fn split_then_extract(
    raw: &str,
    w: &Window,
    threshold_secs: f64,
) -> (Vec<PathBuf>, Vec<logstitch::cycle::Cycle>) {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = write_input(dir.path(), "LOG.TXT", raw);
    let out = dir.path().join("split");

    let summary = split_files(&[input], &out, w).expect("split");
    let report =
        extract_cycles(&[out.clone()], w, threshold_secs, Channel::all()).expect("extract");

    (summary.files, report.cycles)
}

#[test]
fn test_single_extended_cycle_end_to_end() {
    let w = window("2025-10-05", "2025-10-31 23:59:59");
    let (files, cycles) = split_then_extract(
        "100;Init\n200;sw1 pushed\n3500;sw1 released\n",
        &w,
        3.0,
    );

    assert_eq!(files.len(), 1);
    assert!(files[0].ends_with("log_2025-10-05_to_2025-10-31.txt"));

    assert_eq!(cycles.len(), 1);
    let c = &cycles[0];
    assert_eq!(c.channel, Channel::Sw1);
    // The reconstructed-file format carries whole seconds: the 3.3s raw
    // counter span lands as 09:00:00 -> 09:00:03.
    assert_eq!(c.push_at.to_string(), "2025-10-05 09:00:00");
    assert_eq!(c.release_at.to_string(), "2025-10-05 09:00:03");
    assert_eq!(c.duration_secs, 3.0);
    assert!(c.extended);
}

#[test]
fn test_single_normal_cycle_end_to_end() {
    let w = window("2025-10-05", "2025-10-31 23:59:59");
    let (_, cycles) = split_then_extract(
        "100;Init\n200;sw1 pushed\n2900;sw1 released\n",
        &w,
        3.0,
    );

    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0].duration_secs, 2.0);
    assert!(!cycles[0].extended);
}

#[test]
fn test_isolated_init_advances_to_next_calendar_day() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = write_input(
        dir.path(),
        "LOG.TXT",
        "100 ms; Init\n\
         18200000 ms; sw1 pushed\n\
         18200100 ms; Init\n\
         18200200 ms; sw2 pushed\n",
    );
    let out = dir.path().join("split");
    let w = window("2025-10-05", "2025-10-31 23:59:59");

    let summary = split_files(&[input], &out, &w).expect("split");
    let lines = read_lines(&summary.files[0]);

    assert_eq!(lines[0], "2025-10-05 09:00:00 - init");
    // ~5h03m after the anchor, still day 0.
    assert_eq!(lines[1], "2025-10-05 14:03:19 - sw1 pushed");
    // The isolated Init more than 5h past the previous Init reference
    // re-anchors at 09:00 of the next logical day.
    assert_eq!(lines[2], "2025-10-06 09:00:00 - init");
    assert_eq!(lines[3], "2025-10-06 09:00:00 - sw2 pushed");
}

#[test]
fn test_reboot_continues_from_last_timestamp() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = write_input(
        dir.path(),
        "LOG.TXT",
        "1000 ms; Init\n\
         5000 ms; sw1 pushed\n\
         5050 ms; sw1 released\n\
         100 ms; sw2 pushed\n",
    );
    let out = dir.path().join("split");
    let w = window("2025-10-05", "2025-10-31 23:59:59");

    let summary = split_files(&[input], &out, &w).expect("split");
    let lines = read_lines(&summary.files[0]);

    assert_eq!(lines[2], "2025-10-05 09:00:04 - sw1 released");
    // The counter regressed (reboot), but the reconstructed stream does
    // not: the rebooted line continues from the last timestamp, not 09:00.
    assert_eq!(lines[3], "2025-10-05 09:00:04 - sw2 pushed");
}

#[test]
fn test_counter_overflow_routes_into_next_month_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    // 27 full days of counter time without an Init lands on November 1.
    let overflow_counter: i64 = 27 * 24 * 3600 * 1000;
    let input = write_input(
        dir.path(),
        "LOG.TXT",
        &format!("0 ms; Init\n{overflow_counter} ms; sw3 pushed\n"),
    );
    let out = dir.path().join("split");
    let w = window("2025-10-05", "2025-11-30 23:59:59");

    let summary = split_files(&[input], &out, &w).expect("split");
    assert_eq!(summary.files.len(), 2);
    assert!(summary.files[0].ends_with("log_2025-10-05_to_2025-10-31.txt"));
    assert!(summary.files[1].ends_with("log_2025-11-01_to_2025-11-30.txt"));

    let october = read_lines(&summary.files[0]);
    assert_eq!(october, vec!["2025-10-05 09:00:00 - init"]);

    let november = read_lines(&summary.files[1]);
    assert_eq!(november, vec!["2025-11-01 09:00:00 - sw3 pushed"]);
}

#[test]
fn test_out_of_window_lines_reconstructed_but_not_emitted() {
    let dir = tempfile::tempdir().expect("tempdir");
    // Day 0 is in-window; the overflow pushes later lines past the end.
    let day3: i64 = 3 * 24 * 3600 * 1000;
    let input = write_input(
        dir.path(),
        "LOG.TXT",
        &format!(
            "0 ms; Init\n\
             1000 ms; sw1 pushed\n\
             {day3} ms; sw1 released\n"
        ),
    );
    let out = dir.path().join("split");
    let w = window("2025-10-05", "2025-10-06 23:59:59");

    let summary = split_files(&[input], &out, &w).expect("split");
    let lines = read_lines(&summary.files[0]);
    assert_eq!(
        lines,
        vec![
            "2025-10-05 09:00:00 - init",
            "2025-10-05 09:00:01 - sw1 pushed",
        ]
    );
    assert_eq!(summary.stats.get(Outcome::LineOutOfWindow), 1);
}

#[test]
fn test_cycle_pairs_across_month_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_input(
        dir.path(),
        "log_2025-10-05_to_2025-10-31.txt",
        "2025-10-31 23:59:58 - sw1 pushed\n",
    );
    write_input(
        dir.path(),
        "log_2025-11-01_to_2025-11-30.txt",
        "2025-11-01 00:00:01 - sw1 released\n",
    );

    let w = window("2025-10-05", "2025-11-30 23:59:59");
    let report = extract_cycles(&[dir.path().to_path_buf()], &w, 3.0, Channel::all())
        .expect("extract");

    // The pending push survives the file boundary in name-sorted order.
    assert_eq!(report.cycles.len(), 1);
    assert_eq!(report.cycles[0].duration_secs, 3.0);
    assert!(report.cycles[0].extended);
    assert_eq!(report.cycles[0].date, "2025-10-31".parse().unwrap());
}

#[test]
fn test_stuck_counter_line_is_skipped_not_fatal() {
    let dir = tempfile::tempdir().expect("tempdir");
    // The second line carries an i64-valid but physically impossible
    // counter; it must be absorbed like any other unparseable line.
    let input = write_input(
        dir.path(),
        "LOG.TXT",
        "0 ms; Init\n\
         100000000000000000 ms; stuck counter\n\
         1000 ms; sw1 pushed\n",
    );
    let out = dir.path().join("split");
    let w = window("2025-10-05", "2025-10-31 23:59:59");

    let summary = split_files(&[input], &out, &w).expect("split");
    let lines = read_lines(&summary.files[0]);
    assert_eq!(
        lines,
        vec![
            "2025-10-05 09:00:00 - init",
            "2025-10-05 09:00:01 - sw1 pushed",
        ]
    );
    assert_eq!(summary.stats.get(Outcome::LineUnparseable), 1);
}

#[test]
fn test_no_init_marker_is_a_hard_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = write_input(dir.path(), "LOG.TXT", "200;sw1 pushed\n2900;sw1 released\n");
    let out = dir.path().join("split");
    let w = window("2025-10-05", "2025-10-31 23:59:59");

    let err = split_files(&[input], &out, &w).expect_err("must fail");
    assert!(err.to_string().contains("no Init marker"));
}

#[test]
fn test_vocabulary_mismatch_yields_empty_result() {
    let dir = tempfile::tempdir().expect("tempdir");
    let f = write_input(
        dir.path(),
        "log_2025-10-05_to_2025-10-31.txt",
        "2025-10-06 10:00:00 - motor activated\n2025-10-06 10:00:05 - door opened\n",
    );

    let w = window("2025-10-05", "2025-10-31 23:59:59");
    let report = extract_cycles(&[f], &w, 3.0, Channel::all()).expect("extract");
    assert!(report.cycles.is_empty());
}

#[test]
fn test_multi_file_session_carries_state() {
    let dir = tempfile::tempdir().expect("tempdir");
    // Name-sorted order: a_LOG.TXT then b_LOG.TXT; the counter continues
    // across the boundary within one reconstruction session.
    let a = write_input(dir.path(), "a_LOG.TXT", "100 ms; Init\n200 ms; sw1 pushed\n");
    let b = write_input(dir.path(), "b_LOG.TXT", "900100 ms; Init\n900200 ms; sw1 released\n");
    let out = dir.path().join("split");
    let w = window("2025-10-05", "2025-10-31 23:59:59");

    // Pass them out of order; the driver sorts by file name.
    let summary = split_files(&[b, a], &out, &w).expect("split");
    let lines = read_lines(&summary.files[0]);

    assert_eq!(lines[1], "2025-10-05 09:00:00 - sw1 pushed");
    // 900s after the anchor, 15 minutes into the day.
    assert_eq!(lines[3], "2025-10-05 09:15:00 - sw1 released");
}
