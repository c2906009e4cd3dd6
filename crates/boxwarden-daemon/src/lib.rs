//! boxwarden Daemon Library
//!
//! Keeps a sing-box tunnel running next to a host application:
//! - Artifact acquisition (download + unpack the platform binary once)
//! - Config generation (inbounds, Reality keys, self-signed certificate)
//! - Process supervision (single tracked child, graceful stop)
//! - Daily restart scheduling (00:00 Asia/Shanghai)

pub mod artifact;
pub mod generator;
pub mod runtime;
pub mod schedule;
pub mod supervisor;
