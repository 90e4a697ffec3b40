//! Windows event logs exported as JSON.
//!
//! Each configured log is queried through PowerShell's `Get-WinEvent`,
//! restricted to the collection window, and written to
//! `event_logs/<Log>.json` as an array of event records. On other systems
//! the item is skipped.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Local};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::collectors::collector::{CollectContext, Collectable};
use crate::collectors::command::Command;
use crate::constants::{DEFAULT_EVENT_LOGS, DEFAULT_EVENT_LOG_WAIT_SECS, EVENT_LOGS_DIR};
use crate::error::{CollectError, CollectResult};

fn default_logs() -> Vec<String> {
    DEFAULT_EVENT_LOGS.iter().map(|log| log.to_string()).collect()
}

fn default_wait() -> u64 {
    DEFAULT_EVENT_LOG_WAIT_SECS
}

/// Events of the named Windows logs that fall inside the collection window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLog {
    #[serde(default = "default_logs")]
    pub logs: Vec<String>,
    /// Limit for exporting a single log
    #[serde(default = "default_wait")]
    pub wait_time_in_seconds: u64,
}

impl Default for EventLog {
    fn default() -> Self {
        EventLog {
            logs: default_logs(),
            wait_time_in_seconds: DEFAULT_EVENT_LOG_WAIT_SECS,
        }
    }
}

impl EventLog {
    pub fn new(logs: &[&str]) -> Self {
        EventLog {
            logs: logs.iter().map(|log| log.to_string()).collect(),
            ..Default::default()
        }
    }

    /// PowerShell pipeline printing the events of `log` newer than `start` as JSON.
    pub fn query_script(log: &str, start: DateTime<Local>) -> String {
        format!(
            "Get-WinEvent -FilterHashtable @{{ LogName = '{}'; StartTime = [datetime]'{}' }} -ErrorAction SilentlyContinue | \
             Select-Object @{{n='TimeCreated';e={{$_.TimeCreated.ToString('o')}}}}, Id, LevelDisplayName, ProviderName, RecordId, MachineName, Message | \
             ConvertTo-Json -Depth 3",
            log.replace('\'', "''"),
            start.format("%Y-%m-%dT%H:%M:%S")
        )
    }

    /// Command exporting one log.
    pub fn export_command(&self, log: &str, start: DateTime<Local>) -> Command {
        let script = Self::query_script(log, start);
        Command::new("powershell", &["-NoProfile", "-NonInteractive", "-Command", script.as_str()])
            .wait_time_in_seconds(self.wait_time_in_seconds)
    }

    /// Run `command` and store its JSON output as the export of `log`.
    pub async fn export(&self, log: &str, command: &Command, output_dir: &Path) -> CollectResult<PathBuf> {
        let result = command.execute().await?;
        if result.returncode.is_none() {
            return Err(CollectError::Export {
                log: log.to_string(),
                reason: format!("query did not finish within {} seconds", command.wait_time_in_seconds),
            });
        }
        if !result.stderr.is_empty() {
            warn!("Export of {} reported: {}", log, String::from_utf8_lossy(&result.stderr).trim());
        }

        let events = parse_events(&result.stdout).map_err(|e| CollectError::Export {
            log: log.to_string(),
            reason: format!("unexpected output: {}", e),
        })?;
        let path = event_log_path(output_dir, log);
        tokio::fs::write(&path, serde_json::to_string_pretty(&events)?).await?;
        debug!("Wrote {}", path.display());
        Ok(path)
    }
}

/// `<output_dir>/<Log>.json`, with path separators in channel names replaced.
pub fn event_log_path(output_dir: &Path, log: &str) -> PathBuf {
    let name: String = log
        .chars()
        .map(|c| if c == '/' || c == '\\' { '-' } else { c })
        .collect();
    output_dir.join(format!("{}.json", name))
}

/// Normalize `ConvertTo-Json` output to an array. No events print nothing
/// and a single event prints a bare object.
pub fn parse_events(stdout: &[u8]) -> serde_json::Result<Value> {
    let text = String::from_utf8_lossy(stdout);
    let text = text.trim_start_matches('\u{feff}').trim();
    if text.is_empty() {
        return Ok(Value::Array(Vec::new()));
    }
    match serde_json::from_str(text)? {
        Value::Array(events) => Ok(Value::Array(events)),
        event => Ok(Value::Array(vec![event])),
    }
}

impl fmt::Display for EventLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event logs {}", self.logs.join(", "))
    }
}

#[async_trait]
impl Collectable for EventLog {
    async fn collect(&self, ctx: &CollectContext<'_>) -> CollectResult<()> {
        if !cfg!(windows) {
            info!("Skipping {}: event logs exist only on Windows", self);
            return Ok(());
        }

        let output_dir = ctx.target_dir.join(EVENT_LOGS_DIR);
        tokio::fs::create_dir_all(&output_dir).await?;

        let mut first_error = None;
        for log in &self.logs {
            let command = self.export_command(log, ctx.window.start());
            if let Err(e) = self.export(log, &command, &output_dir).await {
                error!("Failed to export event log {}: {}", log, e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_logs() {
        let event_log = EventLog::default();
        assert_eq!(event_log.logs, vec!["Application", "System"]);
        assert_eq!(event_log.to_string(), "event logs Application, System");
    }

    #[test]
    fn test_event_log_path() {
        let dir = Path::new("/tmp/run/event_logs");
        assert_eq!(event_log_path(dir, "Application"), dir.join("Application.json"));
        assert_eq!(event_log_path(dir, "System"), dir.join("System.json"));
        assert_eq!(
            event_log_path(dir, "Microsoft-Windows-PowerShell/Operational"),
            dir.join("Microsoft-Windows-PowerShell-Operational.json")
        );
    }

    #[test]
    fn test_parse_events_shapes() {
        assert_eq!(parse_events(b"").unwrap(), serde_json::json!([]));
        assert_eq!(parse_events(b"  \r\n").unwrap(), serde_json::json!([]));
        assert_eq!(parse_events(br#"{"Id": 7}"#).unwrap(), serde_json::json!([{"Id": 7}]));
        assert_eq!(
            parse_events(br#"[{"Id": 7}, {"Id": 8}]"#).unwrap(),
            serde_json::json!([{"Id": 7}, {"Id": 8}])
        );
        assert!(parse_events(b"Get-WinEvent : access denied").is_err());
    }

    #[test]
    fn test_query_script() {
        let start = Local.with_ymd_and_hms(2024, 3, 14, 9, 30, 0).unwrap();
        let script = EventLog::query_script("O'Brien", start);
        assert!(script.contains("LogName = 'O''Brien'"));
        assert!(script.contains("[datetime]'2024-03-14T09:30:00'"));
        assert!(script.ends_with("ConvertTo-Json -Depth 3"));

        let command = EventLog::default().export_command("System", start);
        assert_eq!(command.executable, "powershell");
        assert_eq!(command.wait_time_in_seconds, DEFAULT_EVENT_LOG_WAIT_SECS);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_export_writes_named_json() {
        let output = TempDir::new().unwrap();
        let event_log = EventLog::default();

        for log in ["Application", "System"] {
            let command = Command::new("sh", &["-c", r#"printf '{"Id": 1000}'"#]);
            event_log.export(log, &command, output.path()).await.unwrap();
        }

        for name in ["Application.json", "System.json"] {
            let content = fs::read_to_string(output.path().join(name)).unwrap();
            let events: Value = serde_json::from_str(&content).unwrap();
            assert_eq!(events, serde_json::json!([{"Id": 1000}]));
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_export_rejects_garbage() {
        let output = TempDir::new().unwrap();
        let command = Command::new("echo", &["not json"]);
        let result = EventLog::default().export("System", &command, output.path()).await;

        assert!(matches!(result, Err(CollectError::Export { .. })));
        assert!(!output.path().join("System.json").exists());
    }

    #[cfg(not(windows))]
    #[tokio::test]
    async fn test_skipped_off_windows() {
        use crate::isolation::IsolatedExecutor;
        use crate::models::TimeWindow;

        let target = TempDir::new().unwrap();
        let window = TimeWindow::ending_now(chrono::Duration::hours(1));
        let executor = IsolatedExecutor::in_process();
        let ctx = CollectContext { target_dir: target.path(), window: &window, executor: &executor };

        EventLog::default().collect(&ctx).await.unwrap();
        assert!(!target.path().join(EVENT_LOGS_DIR).exists());
    }
}
