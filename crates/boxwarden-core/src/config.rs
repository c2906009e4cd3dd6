//! Operator configuration for boxwarden.
//!
//! The operator supplies a flat YAML mapping (`config.yml`) with the tunnel
//! settings. Resolution order:
//! 1. Values from the YAML file
//! 2. Environment variables (`BOXWARDEN_<KEY>`, highest priority)
//!
//! Once loaded the configuration is immutable. A key that is absent, empty
//! or equal to `"0"` disables the feature it controls.

use std::collections::BTreeMap;
use std::path::Path;

use serde_yaml::Value;

use crate::error::{Error, Result};

/// User identifier shared by every inbound.
pub const KEY_UUID: &str = "uuid";
/// TUIC listening port.
pub const KEY_TUIC_PORT: &str = "tuic_port";
/// Hysteria2 listening port.
pub const KEY_HY2_PORT: &str = "hy2_port";
/// VLESS-Reality listening port.
pub const KEY_REALITY_PORT: &str = "reality_port";
/// Server name used for the Reality handshake.
pub const KEY_SNI: &str = "sni";

/// SNI used when the operator does not provide one.
pub const DEFAULT_SNI: &str = "www.bing.com";

/// Keys that may be overridden from the environment.
const ENV_OVERRIDABLE: [&str; 5] = [
    KEY_UUID,
    KEY_TUIC_PORT,
    KEY_HY2_PORT,
    KEY_REALITY_PORT,
    KEY_SNI,
];

/// Flat key/value operator settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperatorConfig {
    values: BTreeMap<String, String>,
}

impl OperatorConfig {
    /// Raw value for `key`, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Value for `key` if it enables a feature: present, non-blank and not `"0"`.
    pub fn enabled(&self, key: &str) -> Option<&str> {
        self.get(key)
            .map(str::trim)
            .filter(|v| !v.is_empty() && *v != "0")
    }

    /// Configured SNI, or [`DEFAULT_SNI`].
    pub fn sni(&self) -> &str {
        self.get(KEY_SNI)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_SNI)
    }

    /// Number of settings.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no settings are present.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Replace values with `BOXWARDEN_<KEY>` overrides supplied by `lookup`.
    ///
    /// `lookup` is usually `|name| std::env::var(name).ok()`.
    #[must_use]
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        for key in ENV_OVERRIDABLE {
            let var = format!("BOXWARDEN_{}", key.to_ascii_uppercase());
            if let Some(value) = lookup(&var) {
                tracing::debug!(key, var = %var, "Operator setting overridden from environment");
                self.values.insert(key.to_string(), value);
            }
        }
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for OperatorConfig {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Load the operator configuration file and apply environment overrides.
pub fn load_operator_config(path: &Path) -> Result<OperatorConfig> {
    if !path.exists() {
        return Err(Error::Config(format!(
            "{} does not exist; place the operator config next to the server",
            path.display()
        )));
    }
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    let config = parse_operator_yaml(&content)?.with_overrides(|name| std::env::var(name).ok());
    tracing::info!(path = %path.display(), settings = config.len(), "Operator config loaded");
    Ok(config)
}

/// Parse a flat YAML mapping into an [`OperatorConfig`].
///
/// Scalars become strings, nulls are dropped, nested values are skipped.
/// An empty document yields an empty config.
pub fn parse_operator_yaml(content: &str) -> Result<OperatorConfig> {
    let doc: Value = serde_yaml::from_str(content)?;
    let mapping = match doc {
        Value::Mapping(m) => m,
        Value::Null => return Ok(OperatorConfig::default()),
        _ => {
            return Err(Error::Config(
                "operator config must be a mapping of key: value".into(),
            ));
        }
    };

    let mut values = BTreeMap::new();
    for (key, value) in mapping {
        let Some(key) = scalar_to_string(&key) else {
            tracing::warn!(?key, "Ignoring operator setting with non-scalar key");
            continue;
        };
        match value {
            Value::Null => {}
            ref v => match scalar_to_string(v) {
                Some(s) => {
                    values.insert(key, s);
                }
                None => tracing::warn!(key = %key, "Ignoring nested operator setting"),
            },
        }
    }
    Ok(OperatorConfig { values })
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
