//! Error taxonomy of the collection engine.
//!
//! Per-item failures (`Timeout`, `Exit`, `Copy`, `Spawn`) are contained by
//! the orchestrator and recorded in the run report. `WorkingTree` and
//! `Archive` are fatal to a run and are returned to the caller.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias used by collectors and the orchestrator.
pub type CollectResult<T> = std::result::Result<T, CollectError>;

#[derive(Debug, Error)]
pub enum CollectError {
    /// Isolated work exceeded its deadline.
    #[error("{item} did not finish within {seconds} seconds{}", if *.stuck { " and is stuck" } else { "" })]
    Timeout {
        item: String,
        seconds: u64,
        pid: Option<u32>,
        stuck: bool,
    },

    /// Isolated work exited unsuccessfully without timing out.
    #[error("{item} exited with {}", describe_code(.code))]
    Exit { item: String, code: Option<i32> },

    /// A single file could not be copied into the working tree.
    #[error("Failed to copy {}: {source}", .path.display())]
    Copy {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// An executable could not be resolved or launched.
    #[error("Failed to launch {executable}: {source}")]
    Spawn {
        executable: String,
        #[source]
        source: io::Error,
    },

    /// An event log could not be exported.
    #[error("Failed to export event log {log}: {reason}")]
    Export { log: String, reason: String },

    /// The final archive could not be written.
    #[error("Failed to write archive {}: {source}", .path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The temporary working tree could not be created.
    #[error("Failed to create working tree: {0}")]
    WorkingTree(#[source] io::Error),

    /// A basename pattern failed to compile.
    #[error("Invalid basename pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// A worker task could not be encoded or decoded.
    #[error("Invalid worker task: {0}")]
    Task(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CollectError {
    /// True for failures caused by a deadline expiring.
    pub fn is_timeout(&self) -> bool {
        matches!(self, CollectError::Timeout { .. })
    }
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "no exit code".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_mentions_stuck() {
        let err = CollectError::Timeout {
            item: "files '.*' from /var/log".to_string(),
            seconds: 5,
            pid: Some(42),
            stuck: true,
        };
        assert!(err.is_timeout());
        assert_eq!(
            err.to_string(),
            "files '.*' from /var/log did not finish within 5 seconds and is stuck"
        );
    }

    #[test]
    fn test_exit_message() {
        let err = CollectError::Exit { item: "worker".to_string(), code: Some(1) };
        assert_eq!(err.to_string(), "worker exited with exit code 1");
        assert!(!err.is_timeout());

        let err = CollectError::Exit { item: "worker".to_string(), code: None };
        assert_eq!(err.to_string(), "worker exited with no exit code");
    }
}
