use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use logstitch::config::{Config, Window};
use logstitch::cycle;
use logstitch::report;
use logstitch::segment;

/// Device log timestamp reconstruction and cycle extraction.
#[derive(Parser)]
#[command(name = "logstitch", about)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Logging verbosity level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Window start, overriding the config file (e.g. "2025-10-05").
    #[arg(long)]
    start: Option<String>,

    /// Window end, overriding the config file (e.g. "2025-10-31 23:59:59").
    #[arg(long)]
    end: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Reconstruct timestamps and split raw logs into per-month files.
    Split {
        /// Raw input log files, processed in name-sorted order.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Directory for the per-month output files.
        #[arg(short, long)]
        output_dir: PathBuf,
    },

    /// Extract push/release cycles from reconstructed files.
    Cycles {
        /// Reconstructed files or directories containing them.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Extended-cycle threshold in seconds, overriding the config file.
        #[arg(long)]
        threshold: Option<f64>,

        /// Write the ordered cycle list as JSON to this path ("-" for stdout).
        #[arg(long)]
        json: Option<PathBuf>,

        /// Write a plain-text day summary to this path.
        #[arg(long)]
        summary: Option<PathBuf>,
    },

    /// Print version information and exit.
    Version,
}

/// Build-time version info.
mod version {
    /// Release version string.
    pub const RELEASE: &str = env!("CARGO_PKG_VERSION");

    /// Full version string with platform info.
    pub fn full() -> String {
        format!(
            "{} ({}/{})",
            RELEASE,
            std::env::consts::OS,
            std::env::consts::ARCH,
        )
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle version subcommand before anything else.
    if let Command::Version = &cli.command {
        println!("logstitch {}", version::full());
        return Ok(());
    }

    // Initialize tracing.
    let filter = EnvFilter::try_new(&cli.log_level)
        .with_context(|| format!("invalid log level: {}", cli.log_level))?;

    fmt().with_env_filter(filter).with_target(true).init();

    let cfg = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };

    // CLI flags win over the config file; the window must come from one
    // of them before any file is touched.
    let start = cli.start.as_deref().unwrap_or(&cfg.window.start);
    let end = cli.end.as_deref().unwrap_or(&cfg.window.end);
    let window = Window::parse(start, end)
        .context("a valid window is required (--start/--end or config window)")?;

    tracing::info!(
        version = version::RELEASE,
        start = %window.start,
        end = %window.end,
        "starting logstitch",
    );

    match cli.command {
        Command::Split { inputs, output_dir } => run_split(&cfg, &window, inputs, output_dir),
        Command::Cycles {
            inputs,
            threshold,
            json,
            summary,
        } => run_cycles(&cfg, &window, inputs, threshold, json, summary),
        Command::Version => Ok(()),
    }
}

fn run_split(
    _cfg: &Config,
    window: &Window,
    inputs: Vec<PathBuf>,
    output_dir: PathBuf,
) -> Result<()> {
    let summary = segment::split_files(&inputs, &output_dir, window)?;

    if summary.files.is_empty() {
        tracing::warn!("no data in range: no reconstructed lines fell inside the window");
    }

    for (outcome, count) in summary.stats.snapshot() {
        tracing::debug!(outcome = outcome.as_str(), count, "split counter");
    }

    Ok(())
}

fn run_cycles(
    cfg: &Config,
    window: &Window,
    inputs: Vec<PathBuf>,
    threshold: Option<f64>,
    json: Option<PathBuf>,
    summary: Option<PathBuf>,
) -> Result<()> {
    let threshold_secs = threshold.unwrap_or(cfg.extended_threshold_secs);
    if !threshold_secs.is_finite() || threshold_secs < 0.0 {
        bail!("threshold must be a non-negative number, got {threshold_secs}");
    }

    let channels = cfg.resolved_channels();
    let report = cycle::extract_cycles(&inputs, window, threshold_secs, &channels)?;

    if report.cycles.is_empty() {
        tracing::warn!("no data in range: no complete push/release cycle in the window");
    } else {
        let days = report::day_counts(&report.cycles);
        for day in &days {
            tracing::info!(
                date = %day.date,
                general = day.general,
                extended = day.extended,
                "daily cycle counts",
            );
        }
    }

    if let Some(path) = json {
        write_json(&report.cycles, &path)?;
    }

    if let Some(path) = summary {
        report::write_summary(&report.cycles, window, threshold_secs, &path)?;
        tracing::info!(path = %path.display(), "summary written");
    }

    Ok(())
}

/// Serialize the ordered cycle list as JSON to a file or stdout.
fn write_json(cycles: &[cycle::Cycle], path: &PathBuf) -> Result<()> {
    let data = serde_json::to_vec_pretty(cycles).context("serializing cycles")?;

    if path.as_os_str() == "-" {
        let mut out = std::io::stdout().lock();
        out.write_all(&data)?;
        out.write_all(b"\n")?;
    } else {
        std::fs::write(path, data)
            .with_context(|| format!("writing cycle list to {}", path.display()))?;
        tracing::info!(path = %path.display(), "cycle list written");
    }

    Ok(())
}
