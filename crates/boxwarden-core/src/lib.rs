//! `boxwarden` Core Library
//!
//! Shared functionality for `boxwarden` components:
//! - Operator configuration loading (`config.yml` + env overrides)
//! - On-disk layout of the tunnel data directory
//! - Tracing initialisation
//! - Common error types

pub mod config;
pub mod error;
pub mod layout;
pub mod tracing_init;

pub use config::OperatorConfig;
pub use error::{Error, Result};
pub use layout::Layout;
