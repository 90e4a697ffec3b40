//! Fault isolation for collection work.
//!
//! Work that may hang on a wedged filesystem or device runs in a separate
//! worker process with a hard deadline. The worker is this crate's binary
//! re-executed with the hidden `worker` subcommand; the task travels as
//! JSON on its stdin. On timeout the worker is terminated, then killed,
//! and the caller gets [`CollectError::Timeout`] instead of hanging.
//!
//! ```no_run
//! use std::time::Duration;
//! use logs_collector::isolation::{IsolatedExecutor, WorkerTask};
//! # async fn example(task: WorkerTask) -> anyhow::Result<()> {
//! let executor = IsolatedExecutor::current_exe()?;
//! executor.run(&task, "files from /var/log", Duration::from_secs(60)).await?;
//! # Ok(())
//! # }
//! ```

/// Terminate / kill escalation and exit status helpers
pub mod process;

/// Child side of the worker protocol
pub mod worker;

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

use crate::collectors::directory::{self, DirectoryJob};
use crate::constants::{TERMINATION_GRACE_MS, WORKER_LOG_SINK_FLAG, WORKER_SUBCOMMAND};
use crate::error::{CollectError, CollectResult};
use crate::logging::LogSink;

/// Unit of work shipped to a worker process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum WorkerTask {
    CollectDirectory(DirectoryJob),
}

impl WorkerTask {
    /// Run the task in the current process.
    pub fn execute(&self) -> CollectResult<()> {
        match self {
            WorkerTask::CollectDirectory(job) => {
                let stats = directory::collect_files(job)?;
                debug!("Directory job finished: {:?}", stats);
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum WorkerMode {
    Subprocess { program: PathBuf },
    InProcess,
}

/// Runs [`WorkerTask`]s behind a process boundary with a deadline.
#[derive(Debug, Clone)]
pub struct IsolatedExecutor {
    mode: WorkerMode,
    log_sink: Option<LogSink>,
    grace: Duration,
}

impl IsolatedExecutor {
    /// Use `program` as the worker binary. It must dispatch the `worker`
    /// subcommand to [`worker::run_worker`].
    pub fn subprocess(program: impl Into<PathBuf>) -> Self {
        IsolatedExecutor {
            mode: WorkerMode::Subprocess { program: program.into() },
            log_sink: None,
            grace: Duration::from_millis(TERMINATION_GRACE_MS),
        }
    }

    /// Use the running executable as the worker binary.
    pub fn current_exe() -> io::Result<Self> {
        Ok(Self::subprocess(std::env::current_exe()?))
    }

    /// Run tasks on a blocking thread of this process. There is no fault
    /// isolation: a task that overruns its deadline is reported stuck and
    /// keeps running in the background.
    pub fn in_process() -> Self {
        IsolatedExecutor {
            mode: WorkerMode::InProcess,
            log_sink: None,
            grace: Duration::from_millis(TERMINATION_GRACE_MS),
        }
    }

    /// Workers log into the sink derived from `sink`.
    pub fn with_log_sink(mut self, sink: &LogSink) -> Self {
        self.log_sink = Some(sink.for_worker());
        self
    }

    /// How long a terminated worker is given to exit before escalating.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Sink handed to workers, if any
    pub fn worker_log_sink(&self) -> Option<&LogSink> {
        self.log_sink.as_ref()
    }

    pub fn is_isolated(&self) -> bool {
        matches!(self.mode, WorkerMode::Subprocess { .. })
    }

    /// Run `task`, waiting at most `limit` for it to finish.
    ///
    /// `item` names the work in logs and errors.
    pub async fn run(&self, task: &WorkerTask, item: &str, limit: Duration) -> CollectResult<()> {
        match &self.mode {
            WorkerMode::Subprocess { program } => self.run_subprocess(program, task, item, limit).await,
            WorkerMode::InProcess => run_in_process(task, item, limit).await,
        }
    }

    async fn run_subprocess(
        &self,
        program: &Path,
        task: &WorkerTask,
        item: &str,
        limit: Duration,
    ) -> CollectResult<()> {
        let payload = serde_json::to_vec(task)?;

        let mut command = Command::new(program);
        command.arg(WORKER_SUBCOMMAND);
        if let Some(sink) = &self.log_sink {
            command.arg(WORKER_LOG_SINK_FLAG).arg(sink.path());
        }
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());

        let mut child = command.spawn().map_err(|source| CollectError::Spawn {
            executable: program.display().to_string(),
            source,
        })?;
        let pid = child.id();
        debug!("Started worker {:?} for {}", pid, item);

        let stdin = child.stdin.take();
        let running = &mut child;
        let exchange = async move {
            if let Some(mut stdin) = stdin {
                // A worker that died early shows up in its exit status
                if let Err(e) = stdin.write_all(&payload).await {
                    warn!("Failed to send task to worker {:?}: {}", pid, e);
                }
            }
            running.wait().await
        };

        match timeout(limit, exchange).await {
            Ok(Ok(status)) if status.success() => {
                debug!("Worker {:?} for {} finished", pid, item);
                Ok(())
            }
            Ok(Ok(status)) => {
                let code = process::exit_code(&status);
                error!("Worker {:?} for {} returned non-zero exit code {:?}", pid, item, code);
                Err(CollectError::Exit { item: item.to_string(), code })
            }
            Ok(Err(e)) => Err(CollectError::Io(e)),
            Err(_) => {
                error!(
                    "Did not finish collecting {} within the {} seconds timeout",
                    item,
                    limit.as_secs()
                );
                let termination = process::terminate_then_kill(&mut child, self.grace).await;
                if termination.is_stuck() {
                    error!("Worker {:?} is stuck", pid);
                } else {
                    info!("Worker {:?} terminated", pid);
                }
                Err(CollectError::Timeout {
                    item: item.to_string(),
                    seconds: limit.as_secs(),
                    pid,
                    stuck: termination.is_stuck(),
                })
            }
        }
    }
}

async fn run_in_process(task: &WorkerTask, item: &str, limit: Duration) -> CollectResult<()> {
    let owned = task.clone();
    let mut handle = tokio::task::spawn_blocking(move || owned.execute());

    match timeout(limit, &mut handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            error!("In-process collection of {} panicked: {}", item, e);
            Err(CollectError::Exit { item: item.to_string(), code: None })
        }
        Err(_) => {
            error!(
                "Did not finish collecting {} within the {} seconds timeout",
                item,
                limit.as_secs()
            );
            // Blocking tasks cannot be cancelled; dropping the handle detaches it
            error!("In-process collection of {} is stuck", item);
            Err(CollectError::Timeout {
                item: item.to_string(),
                seconds: limit.as_secs(),
                pid: None,
                stuck: true,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::SystemTime;
    use tempfile::TempDir;

    fn job(source: &Path, target: &Path, pattern: &str) -> WorkerTask {
        WorkerTask::CollectDirectory(DirectoryJob {
            dirname: source.to_path_buf(),
            regex_basename: pattern.to_string(),
            recursive: false,
            timeframe_only: false,
            not_before: SystemTime::UNIX_EPOCH,
            target_dir: target.to_path_buf(),
        })
    }

    #[test]
    fn test_task_json_shape() {
        let task = job(Path::new("/var/log"), Path::new("/tmp/out"), "messages");
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["task"], "collect_directory");
        assert_eq!(json["regex_basename"], "messages");

        let decoded: WorkerTask = serde_json::from_value(json).unwrap();
        assert!(matches!(decoded, WorkerTask::CollectDirectory(_)));
    }

    #[test]
    fn test_with_log_sink_derives_worker_sink() {
        let executor = IsolatedExecutor::in_process().with_log_sink(&LogSink::new("/tmp/run.debug.log"));
        assert_eq!(
            executor.worker_log_sink().unwrap().path(),
            Path::new("/tmp/run.multiprocessing.debug.log")
        );
        assert!(!executor.is_isolated());
        assert!(IsolatedExecutor::subprocess("/bin/true").is_isolated());
    }

    #[tokio::test]
    async fn test_in_process_run_collects() {
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        fs::write(source.path().join("a.log"), "a").unwrap();

        let executor = IsolatedExecutor::in_process();
        executor
            .run(&job(source.path(), target.path(), "a"), "test", Duration::from_secs(10))
            .await
            .unwrap();

        let mirrored = target.path().join(directory::strip_os_prefix(source.path()));
        assert!(mirrored.join("a.log").exists());
    }

    #[tokio::test]
    async fn test_in_process_run_reports_task_errors() {
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();

        let result = IsolatedExecutor::in_process()
            .run(&job(source.path(), target.path(), "(unclosed"), "test", Duration::from_secs(10))
            .await;
        assert!(matches!(result, Err(CollectError::Pattern(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_worker_program_is_spawn_error() {
        let source = TempDir::new().unwrap();
        let result = IsolatedExecutor::subprocess("/nonexistent/logs-collector")
            .run(&job(source.path(), source.path(), ".*"), "test", Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(CollectError::Spawn { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_worker_ignoring_stdin_still_times_out() {
        // `yes` never reads its stdin, so a task larger than the pipe buffer
        // can only be delivered partially
        let source = TempDir::new().unwrap();
        let pattern = "a".repeat(1024 * 1024);
        let started = std::time::Instant::now();
        let result = IsolatedExecutor::subprocess("yes")
            .run(&job(source.path(), source.path(), &pattern), "test", Duration::from_secs(1))
            .await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(matches!(result, Err(CollectError::Timeout { stuck: false, .. })));
    }

    #[tokio::test]
    async fn test_in_process_overrun_is_stuck_timeout() {
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        for i in 0..2000 {
            fs::write(source.path().join(format!("{}.log", i)), "x").unwrap();
        }

        let result = IsolatedExecutor::in_process()
            .run(&job(source.path(), target.path(), ".*"), "test", Duration::ZERO)
            .await;
        assert!(matches!(result, Err(CollectError::Timeout { pid: None, stuck: true, .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_worker_exit_code_is_reported() {
        // `false` ignores its arguments and exits 1
        let source = TempDir::new().unwrap();
        let result = IsolatedExecutor::subprocess("false")
            .run(&job(source.path(), source.path(), ".*"), "test", Duration::from_secs(5))
            .await;
        match result {
            Err(CollectError::Exit { code, .. }) => assert_eq!(code, Some(1)),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
