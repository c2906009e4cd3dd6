//! `boxwarden` daemon
//!
//! Installs sing-box, writes its config, keeps it running and restarts it
//! every day at 00:00 Asia/Shanghai. An optional host command given after
//! `--` runs alongside the tunnel; its exit ends the daemon.

use std::path::PathBuf;
use std::process::{ExitCode, ExitStatus};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::process::Command;
use tracing::{error, info};

use boxwarden_core::config::load_operator_config;
use boxwarden_core::layout::DEFAULT_DATA_DIR;
use boxwarden_core::Layout;
use boxwarden_daemon::runtime::{RuntimeOptions, TunnelRuntime};
use boxwarden_daemon::schedule::RestartScheduler;
use boxwarden_daemon::supervisor::terminate_child;

#[derive(Parser, Debug)]
#[command(name = "boxwarden")]
#[command(version, about = "boxwarden - sing-box tunnel supervisor")]
struct Args {
    /// Operator settings file (YAML)
    #[arg(long, default_value = "config.yml", env = "BOXWARDEN_CONFIG")]
    config: PathBuf,

    /// Directory holding the binary, keys, certificate and generated config
    #[arg(long, default_value = DEFAULT_DATA_DIR, env = "BOXWARDEN_DATA_DIR")]
    data_dir: PathBuf,

    /// Architecture to install for (defaults to the host architecture)
    #[arg(long, default_value = std::env::consts::ARCH, env = "BOXWARDEN_ARCH")]
    arch: String,

    /// Seconds allowed for the sing-box archive download.
    #[arg(long, default_value_t = 300, env = "BOXWARDEN_DOWNLOAD_TIMEOUT")]
    download_timeout: u64,

    /// Seconds to wait for graceful process shutdown before SIGKILL.
    #[arg(long, default_value_t = 5, env = "BOXWARDEN_TERMINATE_TIMEOUT")]
    terminate_timeout: u64,

    /// Seconds between stopping and restarting sing-box on a scheduled restart.
    #[arg(long, default_value_t = 3, env = "BOXWARDEN_RESTART_GRACE")]
    restart_grace: u64,

    /// Log level for boxwarden's own crates (overridden by `RUST_LOG`)
    #[arg(long, default_value = "info", env = "BOXWARDEN_LOG_LEVEL")]
    log_level: String,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "BOXWARDEN_LOG_JSON")]
    log_json: bool,

    /// Host application to run once the tunnel is up, e.g. `-- java -jar server.jar`
    #[arg(last = true)]
    host_command: Vec<String>,
}

impl Args {
    fn runtime_options(&self) -> RuntimeOptions {
        RuntimeOptions {
            arch: self.arch.clone(),
            download_timeout: Duration::from_secs(self.download_timeout),
            terminate_timeout: Duration::from_secs(self.terminate_timeout),
            restart_grace: Duration::from_secs(self.restart_grace),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Only fails when a subscriber is already installed.
    let _ = boxwarden_core::tracing_init::init_tracing(&args.log_level, args.log_json);

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %format!("{e:#}"), "boxwarden failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<ExitCode> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        data_dir = %args.data_dir.display(),
        arch = %args.arch,
        host = !args.host_command.is_empty(),
        "Starting boxwarden"
    );

    let operator = load_operator_config(&args.config)?;
    let layout = Layout::new(&args.data_dir);
    let options = args.runtime_options();

    // boot leaves no process behind when it fails
    let runtime = TunnelRuntime::boot(layout, operator, &options)
        .await
        .context("tunnel startup failed")?;
    info!("TUIC + Hysteria2 + Reality tunnel is up");

    // Every exit from here on, including errors, goes through supervise's
    // teardown so sing-box never outlives boxwarden.
    Arc::new(runtime)
        .supervise(
            RestartScheduler::daily(),
            serve(&args.host_command, options.terminate_timeout),
        )
        .await
}

/// Announce readiness, run the host command if any, and wait for a shutdown
/// trigger. Returns the process exit code.
async fn serve(host_command: &[String], terminate_timeout: Duration) -> anyhow::Result<ExitCode> {
    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .context("failed to install SIGTERM handler")?;

    // `true` unsets $NOTIFY_SOCKET so sing-box and the host command
    // cannot notify systemd on our behalf.
    #[cfg(unix)]
    if let Err(e) = sd_notify::notify(true, &[sd_notify::NotifyState::Ready]) {
        tracing::warn!(error = %e, "sd_notify READY failed");
    }

    let mut host = match host_command.split_first() {
        Some((program, rest)) => {
            info!(program, args = ?rest, "Starting host application");
            let child = Command::new(program)
                .args(rest)
                .spawn()
                .with_context(|| format!("failed to start host application `{program}`"))?;
            Some(child)
        }
        None => None,
    };

    #[cfg(unix)]
    let sigterm_future = sigterm.recv();
    #[cfg(not(unix))]
    let sigterm_future = std::future::pending::<Option<()>>();

    let host_exit = async {
        match host.as_mut() {
            Some(child) => child.wait().await,
            None => std::future::pending().await,
        }
    };

    let (exit_code, host_reaped) = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C shutdown signal");
            (ExitCode::SUCCESS, false)
        }
        _ = sigterm_future => {
            info!("Received SIGTERM shutdown signal");
            (ExitCode::SUCCESS, false)
        }
        status = host_exit => match status {
            Ok(status) => {
                info!(?status, "Host application exited");
                (host_exit_code(status), true)
            }
            Err(e) => {
                error!(error = %e, "Failed waiting for host application");
                (ExitCode::FAILURE, false)
            }
        }
    };

    if let Some(child) = host.filter(|_| !host_reaped) {
        let outcome = terminate_child(child, terminate_timeout, "host").await;
        info!(?outcome, "Host application stopped");
    }
    Ok(exit_code)
}

/// Map the host's exit status onto ours; signals and out-of-range codes
/// become a generic failure.
fn host_exit_code(status: ExitStatus) -> ExitCode {
    status
        .code()
        .and_then(|code| u8::try_from(code).ok())
        .map_or(ExitCode::FAILURE, ExitCode::from)
}
