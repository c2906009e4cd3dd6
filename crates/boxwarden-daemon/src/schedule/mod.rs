//! Restart scheduling.

pub mod restart;

pub use restart::{
    RESTART_PERIOD, RestartScheduler, RestartTarget, SchedulerState, delay_until_midnight,
    shanghai,
};
