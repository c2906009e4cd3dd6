//! Runtime context tying the components together.
//!
//! [`TunnelRuntime`] owns the operator settings, the config generator and the
//! process supervisor. The orchestrator creates it once and shares it with
//! the restart scheduler.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use boxwarden_core::{Layout, OperatorConfig};

use crate::artifact::{AcquireError, Acquirer, DEFAULT_DOWNLOAD_TIMEOUT};
use crate::generator::{ConfigGenerator, GenerateError};
use crate::schedule::{RestartScheduler, RestartTarget};
use crate::supervisor::{DEFAULT_TERMINATE_TIMEOUT, StopOutcome, SupervisorError, TunnelSupervisor};

/// Pause between stopping the old process and starting the new one.
pub const DEFAULT_RESTART_GRACE: Duration = Duration::from_secs(3);

/// Errors surfaced by startup or a restart cycle.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Acquire(#[from] AcquireError),

    #[error(transparent)]
    Generate(#[from] GenerateError),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
}

/// Tunables for [`TunnelRuntime::boot`].
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Architecture string to install for.
    pub arch: String,
    pub download_timeout: Duration,
    pub terminate_timeout: Duration,
    pub restart_grace: Duration,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            arch: std::env::consts::ARCH.to_string(),
            download_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
            terminate_timeout: DEFAULT_TERMINATE_TIMEOUT,
            restart_grace: DEFAULT_RESTART_GRACE,
        }
    }
}

/// Shared state of one supervised tunnel.
#[derive(Debug)]
pub struct TunnelRuntime {
    operator: OperatorConfig,
    generator: ConfigGenerator,
    supervisor: TunnelSupervisor,
    restart_grace: Duration,
}

impl TunnelRuntime {
    /// Build a runtime around an already installed binary.
    pub fn new(
        layout: Layout,
        binary: PathBuf,
        operator: OperatorConfig,
        options: &RuntimeOptions,
    ) -> Self {
        let supervisor = TunnelSupervisor::with_terminate_timeout(
            binary.clone(),
            layout.config(),
            options.terminate_timeout,
        );
        Self {
            operator,
            generator: ConfigGenerator::new(layout, binary),
            supervisor,
            restart_grace: options.restart_grace,
        }
    }

    /// Startup sequence: install the binary, generate the config, start the
    /// tunnel. Any error is fatal for the caller.
    pub async fn boot(
        layout: Layout,
        operator: OperatorConfig,
        options: &RuntimeOptions,
    ) -> Result<Self, RuntimeError> {
        let binary = Acquirer::new(layout.clone(), options.download_timeout)
            .ensure_installed(&options.arch)
            .await?;
        let runtime = Self::new(layout, binary, operator, options);
        runtime.start().await?;
        Ok(runtime)
    }

    /// Regenerate the config and start the tunnel.
    pub async fn start(&self) -> Result<u32, RuntimeError> {
        self.generator.generate(&self.operator).await?;
        Ok(self.supervisor.start().await?)
    }

    /// Stop, wait out the grace period, regenerate and start again.
    pub async fn restart_cycle(&self) -> Result<u32, RuntimeError> {
        let outcome = self.supervisor.stop().await;
        info!(?outcome, grace_secs = self.restart_grace.as_secs(), "Restart: old process stopped");
        tokio::time::sleep(self.restart_grace).await;
        self.start().await
    }

    /// Stop the tunnel. Used by the host's shutdown path.
    pub async fn shutdown(&self) -> StopOutcome {
        self.supervisor.stop().await
    }

    /// Arm `scheduler`, drive `body` to completion, then tear down whatever
    /// `body` returned: the scheduler is cancelled first so no restart cycle
    /// races the final stop, then the tunnel is stopped.
    pub async fn supervise<T, E, F>(
        self: Arc<Self>,
        scheduler: RestartScheduler,
        body: F,
    ) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = scheduler.spawn(Arc::clone(&self), shutdown_rx);

        let result = body.await;

        let _ = shutdown_tx.send(true);
        if let Err(e) = handle.await {
            warn!(error = %e, "Restart scheduler task failed");
        }
        let outcome = self.shutdown().await;
        info!(?outcome, "Tunnel stopped");
        result
    }

    pub const fn supervisor(&self) -> &TunnelSupervisor {
        &self.supervisor
    }
}

impl RestartTarget for TunnelRuntime {
    async fn restart(&self) -> Result<(), RuntimeError> {
        self.restart_cycle().await.map(|_| ())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn boot_on_unsupported_arch_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let options = RuntimeOptions {
            arch: "mips".into(),
            ..RuntimeOptions::default()
        };
        let err = TunnelRuntime::boot(Layout::new(dir.path()), OperatorConfig::default(), &options)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Acquire(AcquireError::UnsupportedPlatform(_))
        ));
    }

    #[tokio::test]
    async fn shutdown_before_start_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path());
        let runtime = TunnelRuntime::new(
            layout.clone(),
            layout.binary(),
            OperatorConfig::default(),
            &RuntimeOptions::default(),
        );
        assert_eq!(runtime.shutdown().await, StopOutcome::NotRunning);
    }
}
