//! Process termination primitives.
//!
//! Escalation is terminate (SIGTERM on Unix), then force kill (SIGKILL),
//! each followed by a bounded wait. A process that survives both is
//! reported as stuck and left running.

use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use log::debug;
use tokio::process::Child;
use tokio::time::timeout;

/// How a timed-out process ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Exited after the graceful terminate request
    Terminated(ExitStatus),
    /// Exited after the forceful kill
    Killed(ExitStatus),
    /// Still running after both attempts
    Stuck,
}

impl Termination {
    pub fn is_stuck(&self) -> bool {
        matches!(self, Termination::Stuck)
    }

    pub fn status(&self) -> Option<ExitStatus> {
        match self {
            Termination::Terminated(status) | Termination::Killed(status) => Some(*status),
            Termination::Stuck => None,
        }
    }
}

/// Ask a process to exit (SIGTERM on Unix, TerminateProcess on Windows).
pub fn terminate_gracefully(child: &mut Child) -> io::Result<()> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let pid = match child.id() {
            Some(pid) => pid,
            // Already reaped
            None => return Ok(()),
        };
        kill(Pid::from_raw(pid as i32), Signal::SIGTERM).map_err(io::Error::from)
    }

    #[cfg(not(unix))]
    {
        child.start_kill()
    }
}

/// Wait up to `grace` for the process to exit.
pub async fn reap_within(child: &mut Child, grace: Duration) -> Option<ExitStatus> {
    match timeout(grace, child.wait()).await {
        Ok(Ok(status)) => Some(status),
        Ok(Err(e)) => {
            debug!("Failed to wait for process: {}", e);
            None
        }
        Err(_) => None,
    }
}

/// Terminate, then force kill, waiting `grace` after each step.
pub async fn terminate_then_kill(child: &mut Child, grace: Duration) -> Termination {
    if let Err(e) = terminate_gracefully(child) {
        debug!("Terminate request failed: {}", e);
    }
    if let Some(status) = reap_within(child, grace).await {
        return Termination::Terminated(status);
    }

    if let Err(e) = child.start_kill() {
        debug!("Kill request failed: {}", e);
    }
    match reap_within(child, grace).await {
        Some(status) => Termination::Killed(status),
        None => Termination::Stuck,
    }
}

/// Exit code of a finished process; on Unix a signal death is reported as
/// the negated signal number.
pub fn exit_code(status: &ExitStatus) -> Option<i32> {
    if let Some(code) = status.code() {
        return Some(code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        status.signal().map(|signal| -signal)
    }
    #[cfg(not(unix))]
    {
        None
    }
}

/// Check whether a process with the given PID still exists.
pub fn process_exists(pid: u32) -> bool {
    #[cfg(unix)]
    {
        use nix::errno::Errno;
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        match kill(Pid::from_raw(pid as i32), None) {
            Ok(()) => true,
            Err(Errno::ESRCH) => false,
            // Exists but belongs to someone else
            Err(Errno::EPERM) => true,
            Err(e) => {
                debug!("Failed to check process {}: {}", pid, e);
                false
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        false
    }
}
