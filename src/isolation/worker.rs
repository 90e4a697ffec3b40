use std::io::{self, Read};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;

use log::{debug, error};

use crate::isolation::WorkerTask;
use crate::logging::{self, LogSink};

/// Entry point of a worker process. Returns the process exit code.
///
/// Reads one JSON [`WorkerTask`] from stdin and runs it. Every failure,
/// panics included, is logged and turned into exit code 1 so the parent
/// only ever observes a clean exit.
pub fn run_worker(log_sink: Option<PathBuf>) -> i32 {
    let sink = log_sink.map(LogSink::new);
    if let Err(e) = logging::initialize_worker_logging(sink.as_ref()) {
        eprintln!("Failed to initialize worker logging: {:#}", e);
    }

    match panic::catch_unwind(AssertUnwindSafe(|| run_task_from(io::stdin().lock()))) {
        Ok(Ok(())) => 0,
        Ok(Err(e)) => {
            error!("Worker task failed: {}", e);
            1
        }
        Err(_) => {
            error!("Caught an unhandled panic in worker process");
            1
        }
    }
}

/// Decode a task from `input` and execute it.
pub fn run_task_from<R: Read>(mut input: R) -> anyhow::Result<()> {
    let mut payload = String::new();
    input.read_to_string(&mut payload)?;
    let task: WorkerTask = serde_json::from_str(&payload)?;

    debug!("Worker {} running {:?}", std::process::id(), task);
    task.execute()?;
    debug!("Worker {} finished successfully", std::process::id());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::SystemTime;
    use tempfile::TempDir;

    use crate::collectors::directory::{strip_os_prefix, DirectoryJob};

    #[test]
    fn test_run_task_from_json() {
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        fs::write(source.path().join("syslog"), "line").unwrap();

        let task = WorkerTask::CollectDirectory(DirectoryJob {
            dirname: source.path().to_path_buf(),
            regex_basename: "sys".to_string(),
            recursive: false,
            timeframe_only: true,
            not_before: SystemTime::UNIX_EPOCH,
            target_dir: target.path().to_path_buf(),
        });
        let payload = serde_json::to_vec(&task).unwrap();

        run_task_from(payload.as_slice()).unwrap();
        assert!(target
            .path()
            .join(strip_os_prefix(source.path()))
            .join("syslog")
            .exists());
    }

    #[test]
    fn test_run_task_from_rejects_garbage() {
        assert!(run_task_from("not json".as_bytes()).is_err());
    }
}
