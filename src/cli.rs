use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use clap::{Parser, Subcommand};
use lazy_static::lazy_static;
use regex::Regex;

use crate::collectors::Item;
use crate::config::Preset;
use crate::constants::{DEFAULT_DELTA, DEFAULT_LABEL, STRFTIME_HUMAN};
use crate::models::TimeWindow;

/// Command-line arguments for the logs-collector tool.
///
/// Collects files modified inside a time window, command output and host
/// snapshots into a single tar.gz archive.
#[derive(Parser, Debug)]
#[clap(name = "logs-collector", about = "Collects diagnostic logs into a single archive", version)]
pub struct Args {
    /// Name used in the archive and log file names
    #[clap(long, default_value = DEFAULT_LABEL)]
    pub label: String,

    /// End of the time window (e.g. "3/14/2024 10:30", "2024-03-14", "10:30"; default: now)
    #[clap(long)]
    pub since: Option<String>,

    /// Length of the time window: a number with an optional s/m/h/d/w unit
    #[clap(long, default_value = DEFAULT_DELTA, allow_hyphen_values = true)]
    pub delta: String,

    /// Archive path, or an existing directory to place it in (default: the temp directory)
    #[clap(short, long)]
    pub output: Option<PathBuf>,

    /// Path to an items YAML file
    #[clap(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Built-in item list to use when no config file is given (default: current OS)
    #[clap(long, value_enum)]
    pub preset: Option<Preset>,

    /// Do not ask for confirmation
    #[clap(short = 'y', long)]
    pub yes: bool,

    /// Run directory collection inside this process instead of worker processes
    #[clap(long)]
    pub in_process: bool,

    /// Verbose logging
    #[clap(short, long)]
    pub verbose: bool,

    /// Subcommands
    #[clap(subcommand)]
    pub command: Option<Commands>,
}

impl Args {
    /// The window selected by `--since` and `--delta`.
    pub fn time_window(&self) -> Result<TimeWindow> {
        let timestamp = match &self.since {
            Some(since) => parse_datestring(since)?,
            None => Local::now(),
        };
        let delta = parse_deltastring(&self.delta)?;
        TimeWindow::checked_new(timestamp, delta)
            .ok_or_else(|| anyhow!("Delta {:?} reaches past the earliest supported date", self.delta))
    }
}

/// Available subcommands for the collector.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a built-in item list to a YAML file for editing
    InitConfig {
        /// Path to output configuration file
        #[clap(default_value = "items.yaml")]
        path: PathBuf,

        /// Preset to write (default: current OS)
        #[clap(long, value_enum)]
        preset: Option<Preset>,
    },

    /// Run one isolated task read from stdin
    #[clap(hide = true)]
    Worker {
        /// Debug log file to append to
        #[clap(long)]
        log_sink: Option<PathBuf>,
    },
}

lazy_static! {
    static ref DELTA_PATTERN: Regex = Regex::new(r"^[+-]?(\d+)([smhdw]?)$").unwrap();
}

/// Parse a relative duration such as `10`, `10m` or `-2d`. A bare number
/// is seconds; a leading sign is ignored.
pub fn parse_deltastring(delta: &str) -> Result<Duration> {
    let caps = DELTA_PATTERN
        .captures(delta.trim())
        .ok_or_else(|| anyhow!("Invalid delta {:?}: expected a number with an optional s/m/h/d/w unit", delta))?;

    let value: i64 = caps[1]
        .parse()
        .context(format!("Delta {:?} is out of range", delta))?;
    let unit_seconds: i64 = match &caps[2] {
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        "w" => 7 * 24 * 60 * 60,
        _ => 1,
    };

    // Duration::seconds panics beyond i64::MAX milliseconds
    let seconds = value
        .checked_mul(unit_seconds)
        .filter(|seconds| *seconds <= i64::MAX / 1000)
        .ok_or_else(|| anyhow!("Delta {:?} is out of range", delta))?;
    let duration = Duration::seconds(seconds);

    // The window start must be a representable date
    if Local::now().checked_sub_signed(duration).is_none() {
        return Err(anyhow!("Delta {:?} reaches past the earliest supported date", delta));
    }
    Ok(duration)
}

/// Parse a date string relative to the current time.
pub fn parse_datestring(datestring: &str) -> Result<DateTime<Local>> {
    parse_datestring_at(datestring, Local::now())
}

/// Parse a date string, resolving time-only input against `now`.
///
/// Input without seconds is rounded up to the end of its minute and a
/// date without a time means the end of that day, so the named moment is
/// inside the window.
pub fn parse_datestring_at(datestring: &str, now: DateTime<Local>) -> Result<DateTime<Local>> {
    let datestring = datestring.trim();

    let naive = parse_naive(datestring, now)
        .ok_or_else(|| anyhow!("Unrecognized date {:?}", datestring))?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| anyhow!("Date {:?} does not exist in the local time zone", datestring))
}

fn parse_naive(datestring: &str, now: DateTime<Local>) -> Option<NaiveDateTime> {
    let one_minute = Duration::minutes(1);

    for format in ["%m/%d/%Y %H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(datestring, format) {
            return Some(parsed);
        }
    }
    for format in ["%m/%d/%Y %H:%M", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(datestring, format) {
            return parsed.checked_add_signed(one_minute);
        }
    }
    for format in ["%m/%d/%Y", "%Y-%m-%d"] {
        if let Ok(parsed) = NaiveDate::parse_from_str(datestring, format) {
            return parsed.succ_opt().and_then(|day| day.and_hms_opt(0, 0, 0));
        }
    }

    let today = now.date_naive();
    if let Ok(parsed) = NaiveTime::parse_from_str(datestring, "%H:%M:%S") {
        return Some(today.and_time(parsed));
    }
    if let Ok(parsed) = NaiveTime::parse_from_str(datestring, "%H:%M") {
        return today.and_time(parsed).checked_add_signed(one_minute);
    }
    None
}

/// Show what is about to be collected and ask for a yes/no answer.
pub fn user_wants_to_collect<R: BufRead, W: Write>(
    mut input: R,
    mut output: W,
    items: &[Item],
    window: &TimeWindow,
) -> Result<bool> {
    writeln!(output, "The following items will be collected:")?;
    for item in items {
        writeln!(output, "  - {}", item)?;
    }
    writeln!(
        output,
        "Files modified between {} and {} will be included.",
        window.start().format(STRFTIME_HUMAN),
        window.timestamp().format(STRFTIME_HUMAN)
    )?;
    write!(output, "Continue? [y/N] ")?;
    output.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer).context("Failed to read confirmation")?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
