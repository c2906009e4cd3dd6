//! Tunnel process supervision.

pub mod manager;

pub use manager::{
    DEFAULT_TERMINATE_TIMEOUT, StopOutcome, SupervisorError, TunnelSupervisor, terminate_child,
};
