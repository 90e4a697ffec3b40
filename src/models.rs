use std::time::SystemTime;

use chrono::{DateTime, Duration, Local};
use serde::{Deserialize, Serialize};

use crate::constants::STRFTIME_HUMAN;

/// The `[timestamp - delta, timestamp]` window bounding "recent" files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    timestamp: DateTime<Local>,
    delta: Duration,
}

impl TimeWindow {
    /// Create a window ending at `timestamp`. The sign of `delta` is ignored.
    pub fn new(timestamp: DateTime<Local>, delta: Duration) -> Self {
        let delta = if delta < Duration::zero() { -delta } else { delta };
        TimeWindow { timestamp, delta }
    }

    /// Like [`TimeWindow::new`], but `None` when the window would start
    /// before the earliest representable date.
    pub fn checked_new(timestamp: DateTime<Local>, delta: Duration) -> Option<Self> {
        let window = Self::new(timestamp, delta);
        timestamp.checked_sub_signed(window.delta).map(|_| window)
    }

    /// Window of `delta` ending now
    pub fn ending_now(delta: Duration) -> Self {
        Self::new(Local::now(), delta)
    }

    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }

    pub fn delta(&self) -> Duration {
        self.delta
    }

    /// Lower bound of the window
    ///
    /// A start before the earliest representable date is clamped to the
    /// Unix epoch.
    pub fn start(&self) -> DateTime<Local> {
        self.timestamp
            .checked_sub_signed(self.delta)
            .unwrap_or_else(|| DateTime::from(SystemTime::UNIX_EPOCH))
    }

    /// Lower bound as a `SystemTime`, suitable for comparing file mtimes
    pub fn start_system_time(&self) -> SystemTime {
        SystemTime::from(self.start())
    }
}

/// Outcome of one external command invocation.
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    pub pid: Option<u32>,
    pub returncode: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ExecutionResult {
    /// Text written to the `returncode` output file. Empty when the command
    /// never finished.
    pub fn returncode_text(&self) -> String {
        self.returncode.map(|code| code.to_string()).unwrap_or_default()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Collected,
    Failed,
}

/// Per-item outcome recorded by the orchestrator.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ItemReport {
    pub item: String,
    pub status: ItemStatus,
    pub error: Option<String>,
    pub timed_out: bool,
    pub elapsed_ms: u64,
}

impl ItemReport {
    pub fn is_success(&self) -> bool {
        self.status == ItemStatus::Collected
    }
}

/// Structured summary of one collection run.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CollectionReport {
    pub collection_id: String,
    pub label: String,
    pub hostname: String,
    pub started: String,
    pub window_start: String,
    pub window_end: String,
    pub items: Vec<ItemReport>,
}

impl CollectionReport {
    pub fn new(label: &str, hostname: &str, started: DateTime<Local>, window: &TimeWindow) -> Self {
        CollectionReport {
            collection_id: uuid::Uuid::new_v4().to_string(),
            label: label.to_string(),
            hostname: hostname.to_string(),
            started: started.format(STRFTIME_HUMAN).to_string(),
            window_start: window.start().format(STRFTIME_HUMAN).to_string(),
            window_end: window.timestamp().format(STRFTIME_HUMAN).to_string(),
            items: Vec::new(),
        }
    }

    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|item| item.is_success()).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &ItemReport> {
        self.items.iter().filter(|item| !item.is_success())
    }
}
