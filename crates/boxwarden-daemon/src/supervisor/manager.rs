//! sing-box process lifecycle.
//!
//! Owns the single child process handle. Every start/stop goes through one
//! async mutex, so the main task and the restart scheduler never race on the
//! handle.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Default time to wait for a graceful exit before SIGKILL.
pub const DEFAULT_TERMINATE_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors from process supervision.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("Failed to spawn sing-box: {reason}")]
    SpawnFailed { reason: String },
}

/// What `stop` found and did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// No live process was tracked.
    NotRunning,
    /// The process exited after the termination request (or had already exited).
    Exited(ExitStatus),
    /// The process ignored the termination request and was killed.
    Killed,
}

/// Supervisor for the tunnel process.
#[derive(Debug)]
pub struct TunnelSupervisor {
    binary: PathBuf,
    config_path: PathBuf,
    terminate_timeout: Duration,
    child: Mutex<Option<Child>>,
}

impl TunnelSupervisor {
    pub fn new(binary: PathBuf, config_path: PathBuf) -> Self {
        Self::with_terminate_timeout(binary, config_path, DEFAULT_TERMINATE_TIMEOUT)
    }

    pub fn with_terminate_timeout(
        binary: PathBuf,
        config_path: PathBuf,
        terminate_timeout: Duration,
    ) -> Self {
        Self {
            binary,
            config_path,
            terminate_timeout,
            child: Mutex::new(None),
        }
    }

    /// Launch `sing-box run -c <config>` with inherited stdio and return its pid.
    ///
    /// A still-running previous instance is stopped first, so at most one
    /// tunnel process is alive.
    pub async fn start(&self) -> Result<u32, SupervisorError> {
        let mut slot = self.child.lock().await;
        if let Some(mut previous) = slot.take() {
            match previous.try_wait() {
                Ok(Some(status)) => debug!(?status, "Previous sing-box process already exited"),
                _ => {
                    warn!("start called with a live sing-box process; stopping it first");
                    self.shutdown_child(previous).await;
                }
            }
        }

        // kill_on_drop: a supervisor dropped without `stop` must not leave
        // the tunnel running.
        let mut cmd = Command::new(&self.binary);
        cmd.arg("run")
            .arg("-c")
            .arg(&self.config_path)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| SupervisorError::SpawnFailed {
            reason: format!("{}: {e}", self.binary.display()),
        })?;
        let pid = child.id().unwrap_or_default();
        *slot = Some(child);

        info!(pid, config = %self.config_path.display(), "sing-box started");
        Ok(pid)
    }

    /// Ask the tracked process to terminate and wait for it to exit.
    ///
    /// Without a tracked process this is a no-op. Safe to call repeatedly.
    /// The lock is held until the process is gone, so a concurrent `start`
    /// cannot launch a new instance while the old one still holds its ports.
    #[allow(clippy::significant_drop_tightening)]
    pub async fn stop(&self) -> StopOutcome {
        let mut slot = self.child.lock().await;
        let Some(child) = slot.take() else {
            return StopOutcome::NotRunning;
        };
        self.shutdown_child(child).await
    }

    /// Pid of the tracked process, if it is still alive.
    pub async fn running_pid(&self) -> Option<u32> {
        let mut slot = self.child.lock().await;
        let child = slot.as_mut()?;
        match child.try_wait() {
            Ok(None) => child.id(),
            _ => None,
        }
    }

    async fn shutdown_child(&self, child: Child) -> StopOutcome {
        terminate_child(child, self.terminate_timeout, "sing-box").await
    }
}

/// Send a termination request to `child` and wait up to `timeout` for it to
/// exit, killing it afterwards. `name` is only used for logging.
pub async fn terminate_child(mut child: Child, timeout: Duration, name: &str) -> StopOutcome {
    match child.try_wait() {
        Ok(Some(status)) => {
            debug!(process = name, ?status, "Process had already exited");
            return StopOutcome::Exited(status);
        }
        Ok(None) => {}
        Err(e) => warn!(process = name, error = %e, "Failed to poll process status"),
    }

    send_terminate(&mut child);
    info!(process = name, "Stopping process");

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => {
            info!(process = name, ?status, "Process stopped");
            StopOutcome::Exited(status)
        }
        Ok(Err(e)) => {
            warn!(process = name, error = %e, "Error waiting for process, killing");
            child.kill().await.ok();
            StopOutcome::Killed
        }
        Err(_) => {
            warn!(
                process = name,
                timeout_secs = timeout.as_secs(),
                "Process ignored SIGTERM, killing"
            );
            child.kill().await.ok();
            StopOutcome::Killed
        }
    }
}

#[cfg(unix)]
fn send_terminate(child: &mut Child) {
    if let Some(pid) = child.id() {
        // SAFETY: pid comes from our own live Child handle; kill(2) with
        // SIGTERM has no memory-safety preconditions.
        #[allow(unsafe_code)]
        #[allow(clippy::cast_possible_wrap)]
        let ret = unsafe { libc::kill(pid as i32, libc::SIGTERM) };
        if ret != 0 {
            let err = std::io::Error::last_os_error();
            warn!(pid, error = %err, "Failed to send SIGTERM");
        }
    }
}

#[cfg(not(unix))]
fn send_terminate(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        warn!(error = %e, "Failed to terminate sing-box");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stop_without_start_is_noop() {
        let sup = TunnelSupervisor::new("sing-box".into(), "config.json".into());
        assert_eq!(sup.stop().await, StopOutcome::NotRunning);
        assert_eq!(sup.stop().await, StopOutcome::NotRunning);
        assert!(sup.running_pid().await.is_none());
    }

    #[tokio::test]
    async fn missing_binary_is_spawn_failure() {
        let dir = tempfile::tempdir().unwrap();
        let sup = TunnelSupervisor::new(dir.path().join("absent"), "config.json".into());
        let err = sup.start().await.unwrap_err();
        assert!(matches!(err, SupervisorError::SpawnFailed { .. }));
        assert_eq!(sup.stop().await, StopOutcome::NotRunning);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn start_after_exit_does_not_stop_again() {
        // `true` ignores its arguments and exits immediately.
        let sup = TunnelSupervisor::new("true".into(), "config.json".into());
        let first = sup.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(sup.running_pid().await.is_none());

        let second = sup.start().await.unwrap();
        assert_ne!(first, second);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(matches!(sup.stop().await, StopOutcome::Exited(status) if status.success()));
    }
}
