//! Logging setup and log sink descriptors.
//!
//! The parent process logs to the terminal and to a debug file. Worker
//! processes never inherit that file handle; they are handed a derived
//! [`LogSink`] and open their own handle on it.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::LevelFilter;
use simplelog::{ColorChoice, CombinedLogger, Config, SharedLogger, TermLogger, TerminalMode, WriteLogger};

use crate::constants::{DEBUG_LOG_SUFFIX, WORKER_LOG_SUFFIX};

/// Location of a debug log file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSink {
    path: PathBuf,
}

impl LogSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        LogSink { path: path.into() }
    }

    /// Debug log for a run named `stem` inside `dir`
    pub fn for_run(dir: &Path, stem: &str) -> Self {
        Self::new(dir.join(format!("{}{}", stem, DEBUG_LOG_SUFFIX)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sink that worker processes spawned on behalf of this sink write to.
    ///
    /// `x.debug.log` becomes `x.multiprocessing.debug.log`; any other name
    /// gets the worker suffix appended.
    pub fn for_worker(&self) -> LogSink {
        let name = self.path.to_string_lossy();
        if name.ends_with(WORKER_LOG_SUFFIX) {
            return self.clone();
        }
        let derived = match name.strip_suffix(DEBUG_LOG_SUFFIX) {
            Some(stem) => format!("{}{}", stem, WORKER_LOG_SUFFIX),
            None => format!("{}{}", name, WORKER_LOG_SUFFIX),
        };
        LogSink::new(derived)
    }

    fn open(&self) -> Result<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .context(format!("Failed to open log file {}", self.path.display()))
    }
}

/// Initialize logging for the interactive binary.
///
/// Terminal output follows `verbose`; the debug file, when given, always
/// receives debug level records.
pub fn initialize_logging(verbose: bool, sink: Option<&LogSink>) -> Result<()> {
    let term_level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        term_level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )];

    if let Some(sink) = sink {
        loggers.push(WriteLogger::new(LevelFilter::Debug, Config::default(), sink.open()?));
    }

    CombinedLogger::init(loggers).context("Failed to initialize logger")?;
    Ok(())
}

/// Initialize logging inside a worker process.
///
/// With a sink, all records go to that file. Without one, only warnings
/// and errors are reported on stderr.
pub fn initialize_worker_logging(sink: Option<&LogSink>) -> Result<()> {
    match sink {
        Some(sink) => WriteLogger::init(LevelFilter::Debug, Config::default(), sink.open()?)
            .context("Failed to initialize worker logger")?,
        None => TermLogger::init(
            LevelFilter::Warn,
            Config::default(),
            TerminalMode::Stderr,
            ColorChoice::Never,
        )
        .context("Failed to initialize worker logger")?,
    }
    Ok(())
}
