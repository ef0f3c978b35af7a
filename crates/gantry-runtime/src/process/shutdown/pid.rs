//! Terminate a process by pid without reaping (no Child handle available).

use std::io;

#[cfg(unix)]
use std::time::Duration;
#[cfg(unix)]
use tokio::time::sleep;

#[cfg(unix)]
use nix::errno::Errno;
#[cfg(unix)]
use nix::sys::signal::{self, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

/// Terminate a process by pid.
///
/// Used for backends recorded by a previous host run, where no `Child`
/// handle exists and the process cannot be reaped by us.
///
/// # Strategy
/// - Unix: SIGTERM, poll up to 2 seconds for exit, escalate to SIGKILL,
///   poll again
/// - Windows: forceful tree-kill (`taskkill /T /F`)
///
/// # Returns
/// - `Ok(())` if the process was killed or already gone
/// - `Err` if kill operations fail (excluding "no such process")
pub async fn terminate_pid(pid: u32) -> io::Result<()> {
    #[cfg(unix)]
    {
        terminate_pid_unix(pid).await
    }

    #[cfg(not(unix))]
    {
        terminate_pid_windows(pid).await
    }
}

#[cfg(unix)]
async fn terminate_pid_unix(pid: u32) -> io::Result<()> {
    let nix_pid = Pid::from_raw(pid as i32);

    // Phase 1: SIGTERM
    if let Err(e) = signal::kill(nix_pid, Signal::SIGTERM) {
        if e == Errno::ESRCH {
            // Already gone
            return Ok(());
        }
        return Err(io::Error::other(e));
    }

    if wait_for_exit(nix_pid).await {
        return Ok(());
    }

    // Phase 2: SIGKILL
    if let Err(e) = signal::kill(nix_pid, Signal::SIGKILL) {
        if e == Errno::ESRCH {
            return Ok(());
        }
        return Err(io::Error::other(e));
    }

    if wait_for_exit(nix_pid).await {
        return Ok(());
    }

    // Process didn't exit even after SIGKILL (rare)
    Err(io::Error::new(
        io::ErrorKind::TimedOut,
        format!("process {pid} did not exit after SIGKILL"),
    ))
}

/// Poll for up to 2 seconds using the null signal to observe exit.
#[cfg(unix)]
async fn wait_for_exit(pid: Pid) -> bool {
    for _ in 0..20 {
        sleep(Duration::from_millis(100)).await;

        match signal::kill(pid, None) {
            Ok(()) => {
                // Still alive, continue polling
            }
            Err(Errno::ESRCH) => return true,
            Err(_) => {
                // Other error (permission) - assume still alive
            }
        }
    }
    false
}

#[cfg(not(unix))]
async fn terminate_pid_windows(pid: u32) -> io::Result<()> {
    let output = tokio::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .output()
        .await?;

    // taskkill reports an error for a pid that is already gone; treat that
    // the same as success
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    if stderr.contains("not found") {
        return Ok(());
    }
    Err(io::Error::other(format!(
        "taskkill failed for pid {pid}: {}",
        stderr.trim()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::process::Command;

    #[tokio::test]
    #[cfg(unix)]
    async fn terminate_pid_handles_already_gone() {
        // Use a PID that's very unlikely to exist
        let result = terminate_pid(999_999).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn terminate_pid_kills_a_live_process() {
        // Spawn a long-running process
        let mut child = Command::new("sleep")
            .arg("60")
            .spawn()
            .expect("failed to spawn sleep");

        let pid = child.id().expect("no PID");

        let result = terminate_pid(pid).await;
        assert!(result.is_ok(), "terminate_pid failed: {result:?}");

        // Reap the child to clean up the zombie, then verify it is gone
        let _ = child.wait().await;
        assert!(!crate::lockfile::pid_exists(pid));
    }
}
