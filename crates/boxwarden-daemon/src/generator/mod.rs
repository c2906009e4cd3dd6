//! sing-box configuration generation.
//!
//! Turns the operator settings into `config.json`, creating the Reality
//! keypair and the self-signed certificate on first use. Runs at startup and
//! again on every scheduled restart; secrets are never regenerated once they
//! exist on disk.

pub mod document;

use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info};

use boxwarden_core::config::{KEY_HY2_PORT, KEY_REALITY_PORT, KEY_TUIC_PORT, KEY_UUID};
use boxwarden_core::{Layout, OperatorConfig};
use boxwarden_crypto::certs::{DEFAULT_COMMON_NAME, DEFAULT_VALIDITY_DAYS};
use boxwarden_crypto::{CertError, KeyMaterialError, RealityKeyMaterial, ensure_self_signed_pair};

use document::{Document, Inbound, TlsPaths};

/// Errors from config generation.
#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error("Missing required setting `{0}`")]
    MissingSetting(&'static str),

    #[error("Invalid value for `{key}`: {value:?} is not a port number")]
    InvalidSetting { key: &'static str, value: String },

    #[error("Reality key generation failed: {0}")]
    KeygenFailed(String),

    #[error(transparent)]
    KeyMaterial(#[from] KeyMaterialError),

    #[error(transparent)]
    Cert(#[from] CertError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Writes the tunnel configuration for one installed binary.
#[derive(Debug, Clone)]
pub struct ConfigGenerator {
    layout: Layout,
    binary: PathBuf,
}

impl ConfigGenerator {
    pub const fn new(layout: Layout, binary: PathBuf) -> Self {
        Self { layout, binary }
    }

    /// Generate and write `config.json`, creating missing key material and
    /// certificate first. Returns the document that was written.
    pub async fn generate(&self, operator: &OperatorConfig) -> Result<Document, GenerateError> {
        std::fs::create_dir_all(self.layout.root())?;

        let keys = self.reality_keys().await?;
        let document = build_document(operator, &keys, &self.tls_paths())?;

        ensure_self_signed_pair(
            &self.layout.cert(),
            &self.layout.private_key(),
            DEFAULT_COMMON_NAME,
            DEFAULT_VALIDITY_DAYS,
        )?;

        let mut json = serde_json::to_string_pretty(&document)?;
        json.push('\n');
        let path = self.layout.config();
        std::fs::write(&path, json)?;

        info!(
            path = %path.display(),
            inbounds = ?document.inbounds.iter().map(Inbound::kind).collect::<Vec<_>>(),
            "sing-box config generated"
        );
        Ok(document)
    }

    /// Load the persisted Reality keypair, or create and persist one.
    pub async fn reality_keys(&self) -> Result<RealityKeyMaterial, GenerateError> {
        let key_file = self.layout.reality_key();
        if key_file.exists() {
            let content = std::fs::read_to_string(&key_file)?;
            debug!(path = %key_file.display(), "Reusing persisted Reality keypair");
            return Ok(RealityKeyMaterial::from_persisted(&content)?);
        }

        debug!(binary = %self.binary.display(), "exec: generate reality-keypair");
        let output = Command::new(&self.binary)
            .arg("generate")
            .arg("reality-keypair")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                GenerateError::KeygenFailed(format!("failed to run {}: {e}", self.binary.display()))
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GenerateError::KeygenFailed(format!(
                "exit {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let keys = RealityKeyMaterial::from_keygen_output(&stdout)?;
        std::fs::write(&key_file, &stdout)?;

        info!(
            path = %key_file.display(),
            public_key = keys.public_key.as_deref().unwrap_or("<unknown>"),
            short_id = %keys.short_id,
            "Reality keypair created"
        );
        Ok(keys)
    }

    fn tls_paths(&self) -> TlsPaths {
        TlsPaths {
            certificate_path: self.layout.cert().display().to_string(),
            key_path: self.layout.private_key().display().to_string(),
        }
    }
}

/// Build the config document from operator settings and key material.
///
/// Each inbound is included only when its port setting is enabled. With no
/// inbound enabled the result has an empty inbound list.
pub fn build_document(
    operator: &OperatorConfig,
    keys: &RealityKeyMaterial,
    tls: &TlsPaths,
) -> Result<Document, GenerateError> {
    let tuic_port = port(operator, KEY_TUIC_PORT)?;
    let hy2_port = port(operator, KEY_HY2_PORT)?;
    let reality_port = port(operator, KEY_REALITY_PORT)?;

    let any_enabled = tuic_port.is_some() || hy2_port.is_some() || reality_port.is_some();
    let uuid = operator
        .get(KEY_UUID)
        .map(str::trim)
        .filter(|u| !u.is_empty());
    let uuid = match (uuid, any_enabled) {
        (Some(u), _) => u,
        (None, true) => return Err(GenerateError::MissingSetting(KEY_UUID)),
        (None, false) => "",
    };

    let mut inbounds = Vec::new();
    if let Some(p) = tuic_port {
        inbounds.push(document::tuic(p, uuid, tls));
    }
    if let Some(p) = hy2_port {
        inbounds.push(document::hysteria2(p, uuid, tls));
    }
    if let Some(p) = reality_port {
        inbounds.push(document::vless_reality(
            p,
            uuid,
            operator.sni(),
            &keys.private_key,
            &keys.short_id,
        ));
    }
    Ok(Document::new(inbounds))
}

fn port(operator: &OperatorConfig, key: &'static str) -> Result<Option<u16>, GenerateError> {
    operator
        .enabled(key)
        .map(|v| {
            v.parse::<u16>().map_err(|_| GenerateError::InvalidSetting {
                key,
                value: v.to_string(),
            })
        })
        .transpose()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use boxwarden_core::config::KEY_SNI;

    fn keys() -> RealityKeyMaterial {
        RealityKeyMaterial::from_persisted("PrivateKey: PRIV\nPublicKey: PUB\n").unwrap()
    }

    fn tls() -> TlsPaths {
        TlsPaths {
            certificate_path: "c.pem".into(),
            key_path: "k.pem".into(),
        }
    }

    fn operator(pairs: &[(&str, &str)]) -> OperatorConfig {
        pairs.iter().copied().collect()
    }

    #[test]
    fn only_tuic_enabled() {
        let op = operator(&[
            (KEY_UUID, "u1"),
            (KEY_TUIC_PORT, "443"),
            (KEY_HY2_PORT, "0"),
            (KEY_REALITY_PORT, ""),
            (KEY_SNI, "example.com"),
        ]);
        let doc = build_document(&op, &keys(), &tls()).unwrap();
        assert_eq!(doc.inbounds.len(), 1);
        assert_eq!(doc.inbounds[0].kind(), "tuic");
        assert_eq!(doc.inbounds[0].listen_port(), 443);
        assert_eq!(doc.outbounds, vec![document::Outbound::direct()]);
    }

    #[test]
    fn all_disabled_yields_empty_inbounds() {
        let doc = build_document(&operator(&[]), &keys(), &tls()).unwrap();
        assert!(doc.inbounds.is_empty());
        assert_eq!(doc.outbounds.len(), 1);
    }

    #[test]
    fn all_enabled_in_fixed_order() {
        let op = operator(&[
            (KEY_UUID, "u1"),
            (KEY_TUIC_PORT, "1001"),
            (KEY_HY2_PORT, "1002"),
            (KEY_REALITY_PORT, "1003"),
        ]);
        let doc = build_document(&op, &keys(), &tls()).unwrap();
        let kinds: Vec<_> = doc.inbounds.iter().map(Inbound::kind).collect();
        assert_eq!(kinds, ["tuic", "hysteria2", "vless"]);
    }

    #[test]
    fn reality_uses_default_sni_and_key() {
        let op = operator(&[(KEY_UUID, "u1"), (KEY_REALITY_PORT, "2053")]);
        let doc = build_document(&op, &keys(), &tls()).unwrap();
        let value = serde_json::to_value(&doc.inbounds[0]).unwrap();
        assert_eq!(value["tls"]["server_name"], "www.bing.com");
        assert_eq!(value["tls"]["reality"]["private_key"], "PRIV");
    }

    #[test]
    fn enabled_inbound_requires_uuid() {
        let op = operator(&[(KEY_TUIC_PORT, "443")]);
        let err = build_document(&op, &keys(), &tls()).unwrap_err();
        assert!(matches!(err, GenerateError::MissingSetting("uuid")));
    }

    #[test]
    fn non_numeric_port_is_rejected() {
        let op = operator(&[(KEY_UUID, "u1"), (KEY_HY2_PORT, "http")]);
        let err = build_document(&op, &keys(), &tls()).unwrap_err();
        assert!(matches!(
            err,
            GenerateError::InvalidSetting { key: "hy2_port", .. }
        ));
    }
}
