//! Global constants for the logs-collector application.
//!
//! This module centralizes hardcoded values (timeouts, file names and
//! timestamp formats) so the naming contracts of the output tree live in
//! one place.

// Timeout constants
/// Default wall-clock limit for an isolated directory collection
pub const DEFAULT_DIRECTORY_TIMEOUT_SECS: u64 = 60;

/// Default time to wait for an external command to finish
pub const DEFAULT_COMMAND_WAIT_SECS: u64 = 60;

/// Default time to wait for one event log export
pub const DEFAULT_EVENT_LOG_WAIT_SECS: u64 = 120;

/// How long a terminated or killed process is given to exit before it is
/// considered stuck
pub const TERMINATION_GRACE_MS: u64 = 1000;

// Timestamp formats
/// Long timestamp format used in archive and command output names
pub const STRFTIME_LONG: &str = "%Y-%m-%d.%H-%M-%S";

/// Format used in human readable log lines and summaries
pub const STRFTIME_HUMAN: &str = "%Y-%m-%d %H:%M:%S %z";

// Working tree layout
/// Subtree holding mirrored files from directory and file items
pub const FILES_DIR: &str = "files";

/// Subdirectory of `files/` holding command and script outputs
pub const COMMANDS_DIR: &str = "commands";

/// Subtree holding exported event logs
pub const EVENT_LOGS_DIR: &str = "event_logs";

/// Event logs exported when an item names none
pub const DEFAULT_EVENT_LOGS: &[&str] = &["Application", "System"];

/// Snapshot file written by the environment collector
pub const ENVIRONMENT_FILENAME: &str = "environment.json";

/// Snapshot file written by the hostname collector
pub const HOSTNAME_FILENAME: &str = "hostname.json";

/// Per-run summary written into the working tree root
pub const SUMMARY_FILENAME: &str = "collection_summary.json";

/// Suffix of the archive produced by a run
pub const ARCHIVE_SUFFIX: &str = ".tar.gz";

/// Suffix of the collector's own debug log
pub const DEBUG_LOG_SUFFIX: &str = ".debug.log";

/// Suffix of the debug log written by worker processes
pub const WORKER_LOG_SUFFIX: &str = ".multiprocessing.debug.log";

/// Output kinds written for every command, in this order
pub const COMMAND_OUTPUT_TYPES: &[&str] = &["returncode", "stdout", "stderr"];

// Worker protocol
/// Hidden subcommand that turns the binary into an isolated worker
pub const WORKER_SUBCOMMAND: &str = "worker";

/// Flag carrying the worker's log sink path
pub const WORKER_LOG_SINK_FLAG: &str = "--log-sink";

// CLI defaults
/// Label used when none is given on the command line
pub const DEFAULT_LABEL: &str = "logs-collector";

/// Default look-back window
pub const DEFAULT_DELTA: &str = "1d";

/// Prefix used for script outputs
pub const SCRIPT_PREFIX: &str = "script";

// Executable lookup
/// Directories searched after PATH on POSIX systems
pub const POSIX_FALLBACK_DIRS: &[&str] = &["/sbin", "/usr/bin", "/bin"];

/// System root used when %SystemRoot% is unset on Windows
pub const WINDOWS_DEFAULT_SYSTEM_ROOT: &str = r"C:\Windows";
