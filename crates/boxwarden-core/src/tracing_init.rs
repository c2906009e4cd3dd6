//! Tracing/logging initialization shared by the boxwarden binary and tests.

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Crates whose events are shown at the requested level.
const CRATES: [&str; 4] = [
    "boxwarden",
    "boxwarden_core",
    "boxwarden_crypto",
    "boxwarden_daemon",
];

/// Build the filter directive used when `RUST_LOG` is unset.
///
/// Third-party crates stay at `warn` so reqwest/hyper chatter does not bury
/// the supervisor's own output.
pub fn default_filter(level: &str) -> String {
    let mut directives = vec!["warn".to_string()];
    directives.extend(CRATES.iter().map(|c| format!("{c}={level}")));
    directives.join(",")
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `level`. With `log_json` the output is
/// one JSON object per line for log aggregation.
pub fn init_tracing(level: &str, log_json: bool) -> Result<(), TryInitError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(level)));
    let registry = tracing_subscriber::registry().with(env_filter);
    if log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    }
}
