//! Daily restart at a fixed wall-clock time.
//!
//! The tunnel is restarted every day at 00:00 Asia/Shanghai. The first fire
//! is computed from the current wall clock, later fires follow a fixed 24h
//! period. A failed cycle is logged and the schedule keeps going.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Offset, TimeZone, Timelike, Utc};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info};

use crate::runtime::RuntimeError;

/// Restart period.
pub const RESTART_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

/// UTC offset of Asia/Shanghai (no DST).
const SHANGHAI_OFFSET_SECS: i32 = 8 * 60 * 60;

/// Something that can be put through a restart cycle.
pub trait RestartTarget: Send + Sync + 'static {
    fn restart(&self) -> impl Future<Output = Result<(), RuntimeError>> + Send;
}

/// Scheduler lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Created, timer not registered yet.
    Idle,
    /// Waiting for the next fire.
    Armed,
    /// A restart cycle is executing.
    Firing,
    /// Shut down; no further fires.
    Cancelled,
}

/// Asia/Shanghai as a fixed offset.
pub fn shanghai() -> FixedOffset {
    FixedOffset::east_opt(SHANGHAI_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// Time from `now` until the next local midnight of `now`'s timezone.
///
/// Exactly at midnight the raw delay is zero; zero and negative delays are
/// pushed out by a full period so the restart never fires immediately.
pub fn delay_until_midnight<Tz: TimeZone>(now: &DateTime<Tz>) -> Duration {
    let day_ms = i64::try_from(RESTART_PERIOD.as_millis()).unwrap_or(i64::MAX);
    let time = now.time();
    let since_midnight_ms = i64::from(time.num_seconds_from_midnight()) * 1000
        + i64::from(time.nanosecond().min(999_999_999) / 1_000_000);

    let mut delay_ms = (day_ms - since_midnight_ms) % day_ms;
    if delay_ms <= 0 {
        delay_ms += day_ms;
    }
    Duration::from_millis(u64::try_from(delay_ms).unwrap_or_default())
}

/// Periodic restart driver.
#[derive(Debug)]
pub struct RestartScheduler {
    initial_delay: Duration,
    period: Duration,
    state: watch::Sender<SchedulerState>,
}

impl RestartScheduler {
    /// Fire at the next 00:00 Asia/Shanghai, then every 24 hours.
    pub fn daily() -> Self {
        let now = Utc::now().with_timezone(&shanghai());
        let delay = delay_until_midnight(&now);
        let next = now + chrono::Duration::from_std(delay).unwrap_or_default();
        let secs = delay.as_secs();
        info!(
            hours = secs / 3600,
            minutes = (secs % 3600) / 60,
            next = %next.format("%Y-%m-%d %H:%M:%S"),
            "Next scheduled restart"
        );
        Self::with_timing(delay, RESTART_PERIOD)
    }

    /// Custom timing. `period` must be non-zero.
    pub fn with_timing(initial_delay: Duration, period: Duration) -> Self {
        let (state, _) = watch::channel(SchedulerState::Idle);
        Self {
            initial_delay,
            period,
            state,
        }
    }

    pub const fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    /// Arm the timer and run restart cycles on `target` until `shutdown`
    /// changes (or its sender is dropped).
    pub fn spawn<T: RestartTarget>(
        self,
        target: Arc<T>,
        mut shutdown: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut timer = tokio::time::interval_at(Instant::now() + self.initial_delay, self.period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            self.state.send_replace(SchedulerState::Armed);

            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        self.state.send_replace(SchedulerState::Firing);
                        info!("Scheduled restart firing");
                        match target.restart().await {
                            Ok(()) => info!("Scheduled restart complete"),
                            Err(e) => error!(error = %e, "Scheduled restart failed; will retry next period"),
                        }
                        self.state.send_replace(SchedulerState::Armed);
                    }
                    _ = shutdown.changed() => {
                        break;
                    }
                }
            }

            self.state.send_replace(SchedulerState::Cancelled);
            info!("Restart scheduler cancelled");
        })
    }
}
