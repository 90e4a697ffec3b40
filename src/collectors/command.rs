use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::collectors::collector::{CollectContext, Collectable};
use crate::constants::{
    COMMANDS_DIR, COMMAND_OUTPUT_TYPES, DEFAULT_COMMAND_WAIT_SECS, FILES_DIR, POSIX_FALLBACK_DIRS,
    SCRIPT_PREFIX, STRFTIME_LONG, TERMINATION_GRACE_MS, WINDOWS_DEFAULT_SYSTEM_ROOT,
};
use crate::error::{CollectError, CollectResult};
use crate::isolation::process::{self, Termination};
use crate::models::ExecutionResult;

/// Where command and script outputs go inside a working tree.
pub fn command_output_dir(target_root: &Path) -> PathBuf {
    target_root.join(FILES_DIR).join(COMMANDS_DIR)
}

fn default_wait() -> u64 {
    DEFAULT_COMMAND_WAIT_SECS
}

/// Runs an external program and stores its return code, stdout and stderr
/// under `files/commands/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub executable: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_wait")]
    pub wait_time_in_seconds: u64,
    /// Output file prefix; defaults to the executable's base name
    #[serde(default)]
    pub prefix: Option<String>,
    /// Merged over the inherited environment
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl Command {
    pub fn new(executable: &str, args: &[&str]) -> Self {
        Command {
            executable: executable.to_string(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
            wait_time_in_seconds: DEFAULT_COMMAND_WAIT_SECS,
            prefix: None,
            env: BTreeMap::new(),
        }
    }

    pub fn wait_time_in_seconds(mut self, seconds: u64) -> Self {
        self.wait_time_in_seconds = seconds;
        self
    }

    pub fn prefix(mut self, prefix: &str) -> Self {
        self.prefix = Some(prefix.to_string());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }

    /// The given path when it exists, otherwise a search result.
    pub fn resolve_executable(&self) -> PathBuf {
        let given = Path::new(&self.executable);
        if given.exists() {
            given.to_path_buf()
        } else {
            find_executable(&self.executable)
        }
    }

    /// Base name of the output files.
    pub fn output_prefix(&self) -> String {
        if let Some(prefix) = &self.prefix {
            return prefix.clone();
        }
        let basename = Path::new(&self.executable)
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| self.executable.clone());
        basename.split('.').next().unwrap_or_default().to_string()
    }

    /// Run the command to completion or until its wait time runs out.
    pub async fn execute(&self) -> CollectResult<ExecutionResult> {
        let executable = self.resolve_executable();
        info!("Going to run {} {:?}", executable.display(), self.args);

        let mut child = tokio::process::Command::new(&executable)
            .args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| CollectError::Spawn {
                executable: executable.display().to_string(),
                source,
            })?;
        let pid = child.id();
        let stdout = OutputCapture::start(child.stdout.take());
        let stderr = OutputCapture::start(child.stderr.take());
        let grace = Duration::from_millis(TERMINATION_GRACE_MS);

        let status = match timeout(Duration::from_secs(self.wait_time_in_seconds), child.wait()).await {
            Ok(Ok(status)) => Some(status),
            Ok(Err(e)) => {
                error!("Failed to wait for {}: {}", self, e);
                None
            }
            Err(_) => {
                error!(
                    "Command did not finish in {} seconds, killing it",
                    self.wait_time_in_seconds
                );
                let termination = process::terminate_then_kill(&mut child, grace).await;
                match termination {
                    Termination::Stuck => info!("{} (pid {:?}) is stuck", self, pid),
                    _ => info!("{} (pid {:?}) was killed", self, pid),
                }
                termination.status()
            }
        };

        Ok(ExecutionResult {
            pid,
            returncode: status.as_ref().and_then(process::exit_code),
            stdout: stdout.finish(grace).await,
            stderr: stderr.finish(grace).await,
        })
    }

    /// Write `{prefix}.{timestamp}.{pid}.{returncode|stdout|stderr}.txt`.
    pub async fn write_output(&self, result: &ExecutionResult, output_dir: &Path) -> CollectResult<()> {
        let prefix = self.output_prefix();
        let timestamp = Local::now().format(STRFTIME_LONG).to_string();
        let pid = result.pid.unwrap_or_default();

        for output_type in COMMAND_OUTPUT_TYPES {
            let content = match *output_type {
                "returncode" => result.returncode_text().into_bytes(),
                "stdout" => result.stdout.clone(),
                _ => result.stderr.clone(),
            };
            let filename = format!("{}.{}.{}.{}.txt", prefix, timestamp, pid, output_type);
            tokio::fs::write(output_dir.join(&filename), content).await?;
            debug!("Wrote {}", filename);
        }
        Ok(())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "command {}", self.executable)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

#[async_trait]
impl Collectable for Command {
    async fn collect(&self, ctx: &CollectContext<'_>) -> CollectResult<()> {
        let output_dir = command_output_dir(ctx.target_dir);
        tokio::fs::create_dir_all(&output_dir).await?;

        let result = match self.execute().await {
            Ok(result) => result,
            Err(e) => {
                error!("Command did not run: {}", e);
                return Ok(());
            }
        };
        self.write_output(&result, &output_dir).await
    }
}

fn default_interpreter() -> Vec<String> {
    if cfg!(windows) {
        vec!["cmd".to_string(), "/C".to_string()]
    } else {
        vec!["sh".to_string(), "-c".to_string()]
    }
}

/// An inline script run through an interpreter, stored like a command
/// with the `script` prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    pub source: String,
    /// Interpreter program and leading arguments; the source goes last
    #[serde(default = "default_interpreter")]
    pub interpreter: Vec<String>,
    #[serde(default = "default_wait")]
    pub wait_time_in_seconds: u64,
}

impl Script {
    pub fn new(source: &str) -> Self {
        Script {
            source: source.to_string(),
            interpreter: default_interpreter(),
            wait_time_in_seconds: DEFAULT_COMMAND_WAIT_SECS,
        }
    }

    pub fn to_command(&self) -> Command {
        let (program, leading) = match self.interpreter.split_first() {
            Some((program, leading)) => (program.clone(), leading.to_vec()),
            None => {
                let mut fallback = default_interpreter();
                let program = fallback.remove(0);
                (program, fallback)
            }
        };
        let mut args = leading;
        args.push(self.source.clone());

        Command {
            executable: program,
            args,
            wait_time_in_seconds: self.wait_time_in_seconds,
            prefix: Some(SCRIPT_PREFIX.to_string()),
            env: BTreeMap::new(),
        }
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let first_line = self.source.lines().next().unwrap_or_default();
        write!(f, "script {:?}", first_line)
    }
}

#[async_trait]
impl Collectable for Script {
    async fn collect(&self, ctx: &CollectContext<'_>) -> CollectResult<()> {
        self.to_command().collect(ctx).await
    }
}

/// Directories searched after PATH
fn fallback_dirs() -> Vec<PathBuf> {
    if cfg!(windows) {
        let root = env::var("SystemRoot").unwrap_or_else(|_| WINDOWS_DEFAULT_SYSTEM_ROOT.to_string());
        vec![Path::new(&root).join("System32")]
    } else {
        POSIX_FALLBACK_DIRS.iter().map(PathBuf::from).collect()
    }
}

/// Find an executable by base name.
///
/// Searches the running program's directory, then PATH, then the platform
/// fallback directories. When nothing matches the bare name is returned so
/// the spawn reports the failure.
pub fn find_executable(executable_name: &str) -> PathBuf {
    let mut name = Path::new(executable_name)
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| executable_name.to_string());
    if cfg!(windows) && Path::new(&name).extension().is_none() {
        name.push_str(".exe");
    }
    debug!("Looking for executable {}", name);

    let mut locations = Vec::new();
    if let Some(dir) = env::current_exe().ok().and_then(|exe| exe.parent().map(Path::to_path_buf)) {
        locations.push(dir);
    }
    if let Some(path) = env::var_os("PATH") {
        locations.extend(env::split_paths(&path));
    }
    locations.extend(fallback_dirs());

    match locations.iter().map(|dir| dir.join(&name)).find(|candidate| candidate.is_file()) {
        Some(found) => {
            debug!("Found executable {}", found.display());
            found
        }
        None => {
            debug!("No executables found");
            PathBuf::from(name)
        }
    }
}

/// Drains a child's output pipe in the background, keeping whatever
/// arrived even if the pipe never closes.
struct OutputCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
    task: Option<JoinHandle<()>>,
}

impl OutputCapture {
    fn start<R>(reader: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let task = reader.map(|mut reader| {
            let buffer = Arc::clone(&buffer);
            tokio::spawn(async move {
                let mut chunk = [0u8; 8192];
                loop {
                    let n = match reader.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => n,
                    };
                    let mut collected = buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                    collected.extend_from_slice(&chunk[..n]);
                }
            })
        });
        OutputCapture { buffer, task }
    }

    async fn finish(self, grace: Duration) -> Vec<u8> {
        if let Some(mut task) = self.task {
            // Grandchildren may keep the pipe open after the child exits
            if timeout(grace, &mut task).await.is_err() {
                debug!("Output pipe still open, keeping partial output");
                task.abort();
            }
        }
        let mut buffer = self.buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::take(&mut *buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    use crate::isolation::IsolatedExecutor;
    use crate::models::TimeWindow;

    fn outputs(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    fn read_output(dir: &Path, output_type: &str) -> String {
        let name = outputs(dir)
            .into_iter()
            .find(|name| name.ends_with(&format!(".{}.txt", output_type)))
            .unwrap();
        fs::read_to_string(dir.join(name)).unwrap()
    }

    #[test]
    fn test_output_prefix() {
        assert_eq!(Command::new("/usr/bin/uname", &["-a"]).output_prefix(), "uname");
        assert_eq!(Command::new("wevtutil.exe", &[]).output_prefix(), "wevtutil");
        assert_eq!(Command::new("uname", &[]).prefix("kernel").output_prefix(), "kernel");
    }

    #[test]
    fn test_find_executable_falls_back_to_bare_name() {
        let found = find_executable("definitely-not-an-installed-program");
        assert_eq!(
            found.file_stem().unwrap().to_str().unwrap(),
            "definitely-not-an-installed-program"
        );
        assert!(!found.is_absolute());
    }

    #[cfg(unix)]
    #[test]
    fn test_find_executable_searches_path() {
        let found = find_executable("sh");
        assert!(found.is_absolute());
        assert!(found.ends_with("sh"));
    }

    #[test]
    fn test_script_to_command() {
        let script = Script {
            source: "print('hello world')".to_string(),
            interpreter: vec!["python3".to_string(), "-c".to_string()],
            wait_time_in_seconds: 5,
        };
        let command = script.to_command();
        assert_eq!(command.executable, "python3");
        assert_eq!(command.args, vec!["-c".to_string(), "print('hello world')".to_string()]);
        assert_eq!(command.output_prefix(), SCRIPT_PREFIX);
        assert_eq!(command.wait_time_in_seconds, 5);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_captures_output() {
        let command = Command::new("sh", &["-c", "echo out; echo err >&2; exit 3"]);
        let result = command.execute().await.unwrap();
        assert_eq!(result.stdout, b"out\n");
        assert_eq!(result.stderr, b"err\n");
        assert_eq!(result.returncode, Some(3));
        assert!(result.pid.is_some());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_env_override() {
        let plain = Command::new("env", &[]).execute().await.unwrap();
        let with_env = Command::new("env", &[]).env("foo", "bar").execute().await.unwrap();
        assert!(!String::from_utf8_lossy(&plain.stdout).lines().any(|line| line == "foo=bar"));
        assert!(String::from_utf8_lossy(&with_env.stdout).lines().any(|line| line == "foo=bar"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_command() {
        let command = Command::new("sleep", &["5"]).wait_time_in_seconds(1);
        let started = std::time::Instant::now();
        let result = command.execute().await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(4));
        assert_eq!(result.returncode, Some(-(nix::sys::signal::Signal::SIGTERM as i32)));
        assert!(!process::process_exists(result.pid.unwrap()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_collect_writes_three_files() {
        let target = TempDir::new().unwrap();
        let window = TimeWindow::ending_now(chrono::Duration::hours(1));
        let executor = IsolatedExecutor::in_process();
        let ctx = CollectContext { target_dir: target.path(), window: &window, executor: &executor };

        Command::new("echo", &["hello"]).collect(&ctx).await.unwrap();

        let dir = command_output_dir(target.path());
        let names = outputs(&dir);
        assert_eq!(names.len(), 3);
        for name in &names {
            let parts: Vec<&str> = name.split('.').collect();
            // echo.YYYY-MM-DD.HH-MM-SS.pid.kind.txt
            assert_eq!(parts.len(), 6, "unexpected name {}", name);
            assert_eq!(parts[0], "echo");
            assert_eq!(parts[1].len(), 10);
            assert_eq!(parts[2].len(), 8);
            assert!(parts[3].parse::<u32>().is_ok());
            assert_eq!(parts[5], "txt");
        }
        assert_eq!(read_output(&dir, "stdout"), "hello\n");
        assert_eq!(read_output(&dir, "returncode"), "0");
        assert_eq!(read_output(&dir, "stderr"), "");
    }

    #[test]
    fn test_outputs_live_under_files() {
        assert_eq!(
            command_output_dir(Path::new("/tmp/run")),
            Path::new("/tmp/run").join("files").join("commands")
        );
    }

    #[tokio::test]
    async fn test_spawn_failure_is_not_raised() {
        let target = TempDir::new().unwrap();
        let window = TimeWindow::ending_now(chrono::Duration::hours(1));
        let executor = IsolatedExecutor::in_process();
        let ctx = CollectContext { target_dir: target.path(), window: &window, executor: &executor };

        Command::new("definitely-not-an-installed-program", &[]).collect(&ctx).await.unwrap();
        assert!(outputs(&command_output_dir(target.path())).is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_script_collects_output() {
        let target = TempDir::new().unwrap();
        let window = TimeWindow::ending_now(chrono::Duration::hours(1));
        let executor = IsolatedExecutor::in_process();
        let ctx = CollectContext { target_dir: target.path(), window: &window, executor: &executor };

        Script::new("echo hello world").collect(&ctx).await.unwrap();

        let dir = command_output_dir(target.path());
        assert!(outputs(&dir).iter().all(|name| name.starts_with("script.")));
        assert_eq!(read_output(&dir, "stdout"), "hello world\n");
    }
}
