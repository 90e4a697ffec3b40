//! # logs-collector
//!
//! Collects diagnostic artifacts from a host into a single timestamped
//! tar.gz archive for support and troubleshooting.
//!
//! ## Overview
//!
//! A run takes a list of collectable [`Item`](collectors::Item)s and a
//! [`TimeWindow`](models::TimeWindow), collects every item into a temporary
//! working tree and archives that tree. Items run one after another; a
//! failing item is recorded and never stops the run.
//!
//! ## Features
//!
//! - **Recent files**: directories filtered by basename pattern and
//!   modification time, mirrored under `files/`
//! - **Command output**: return code, stdout and stderr of external programs
//! - **Snapshots**: environment variables and hostname as JSON
//! - **Fault isolation**: directory walks run in a worker process with a hard
//!   deadline, so a wedged filesystem cannot hang the collector
//! - **YAML item lists** with per-OS presets
//!
//! ## Usage
//!
//! ```no_run
//! use logs_collector::collectors::Item;
//! use logs_collector::isolation::IsolatedExecutor;
//! use logs_collector::models::TimeWindow;
//! use logs_collector::orchestrator::Orchestrator;
//!
//! # fn main() -> anyhow::Result<()> {
//! let items = vec![
//!     Item::directory("/var/log", "syslog"),
//!     Item::command("uname", &["-a"]),
//!     Item::Hostname,
//! ];
//! let window = TimeWindow::ending_now(chrono::Duration::days(1));
//!
//! let orchestrator = Orchestrator::new(IsolatedExecutor::current_exe()?);
//! let (report, archive) = orchestrator.run("support", &items, &window, None)?;
//!
//! println!("{} of {} items collected into {}", report.succeeded(), report.items.len(), archive.display());
//! # Ok(())
//! # }
//! ```
//!
//! The executable passed to [`IsolatedExecutor::subprocess`](isolation::IsolatedExecutor::subprocess)
//! must dispatch the hidden `worker` subcommand to
//! [`run_worker`](isolation::worker::run_worker); the `logs-collector`
//! binary does.
//!
//! ## Module Organization
//!
//! - [`cli`]: Command-line interface, date and delta parsing
//! - [`models`]: Time window, command results and run reports
//! - [`collectors`]: Collectable items
//! - [`isolation`]: Worker processes with deadlines
//! - [`orchestrator`]: One collection run from items to archive
//! - [`config`]: YAML item lists and presets
//! - [`utils`]: Archive creation and run summary
//! - [`logging`]: Logger setup and log sinks
//! - [`error`]: Collection error taxonomy
//! - [`constants`]: Application-wide constants

/// Command-line interface definitions and argument parsing
pub mod cli;

/// Core data models and structures used throughout the application
pub mod models;

/// Collectable items
pub mod collectors;

/// Process isolation for collection work
pub mod isolation;

/// Collection runs
pub mod orchestrator;

/// Utility functions for archiving and reporting
pub mod utils;

/// Item lists and presets
pub mod config;

/// Logger initialization and log sinks
pub mod logging;

/// Collection errors
pub mod error;

/// Application constants and configuration values
pub mod constants;
