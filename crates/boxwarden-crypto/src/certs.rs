//! Self-signed certificate generation for the QUIC-based inbounds.
//!
//! TUIC and Hysteria2 need a TLS certificate but clients are configured to
//! skip verification, so a long-lived self-signed ECDSA P-256 certificate is
//! enough. The pair is generated once and then reused; it is never rotated.

use std::fs;
use std::path::Path;

use chrono::{Datelike, Days, NaiveDate, Utc};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair, PKCS_ECDSA_P256_SHA256};

/// Common name the certificate is issued for.
pub const DEFAULT_COMMON_NAME: &str = "bing.com";

/// Validity of a generated certificate (ten years).
pub const DEFAULT_VALIDITY_DAYS: u32 = 3650;

/// PEM-encoded self-signed certificate and its private key.
pub struct SelfSignedBundle {
    /// PEM-encoded certificate.
    pub cert_pem: String,
    /// PEM-encoded PKCS#8 private key.
    pub key_pem: String,
}

/// Certificate generation errors.
#[derive(Debug, thiserror::Error)]
pub enum CertError {
    /// An error occurred during certificate generation or signing.
    #[error("Certificate generation error: {0}")]
    Generation(String),

    /// Writing the certificate or key failed.
    #[error("Failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Generate a self-signed certificate valid from today for `validity_days`.
pub fn generate_self_signed(
    common_name: &str,
    validity_days: u32,
) -> Result<SelfSignedBundle, CertError> {
    let mut params = CertificateParams::default();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, common_name);
    params.distinguished_name = dn;

    let today = Utc::now().date_naive();
    let expiry = today
        .checked_add_days(Days::new(u64::from(validity_days)))
        .ok_or_else(|| CertError::Generation(format!("validity of {validity_days} days overflows")))?;
    let (y, m, d) = ymd(today)?;
    params.not_before = rcgen::date_time_ymd(y, m, d);
    let (y, m, d) = ymd(expiry)?;
    params.not_after = rcgen::date_time_ymd(y, m, d);

    let key_pair = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256)
        .map_err(|e| CertError::Generation(e.to_string()))?;
    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| CertError::Generation(e.to_string()))?;

    Ok(SelfSignedBundle {
        cert_pem: cert.pem(),
        key_pem: key_pair.serialize_pem(),
    })
}

fn ymd(date: NaiveDate) -> Result<(i32, u8, u8), CertError> {
    let month = u8::try_from(date.month()).map_err(|e| CertError::Generation(e.to_string()))?;
    let day = u8::try_from(date.day()).map_err(|e| CertError::Generation(e.to_string()))?;
    Ok((date.year(), month, day))
}

/// Make sure a certificate/key pair exists at the given paths.
///
/// The two files are a unit: if both exist nothing happens, otherwise a new
/// pair is generated and both are overwritten. Returns `true` when a new pair
/// was written.
pub fn ensure_self_signed_pair(
    cert_path: &Path,
    key_path: &Path,
    common_name: &str,
    validity_days: u32,
) -> Result<bool, CertError> {
    if cert_path.exists() && key_path.exists() {
        tracing::debug!(cert = %cert_path.display(), "Reusing existing TLS certificate");
        return Ok(false);
    }

    tracing::info!(
        common_name,
        validity_days,
        cert = %cert_path.display(),
        "Generating self-signed TLS certificate"
    );
    let bundle = generate_self_signed(common_name, validity_days)?;
    write_pem(cert_path, &bundle.cert_pem)?;
    write_pem(key_path, &bundle.key_pem)?;

    #[cfg(unix)]
    restrict_key_permissions(key_path)?;

    Ok(true)
}

fn write_pem(path: &Path, content: &str) -> Result<(), CertError> {
    fs::write(path, content).map_err(|source| CertError::Write {
        path: path.display().to_string(),
        source,
    })
}

/// Restrict file permissions to owner-only read/write (0600) on unix.
#[cfg(unix)]
fn restrict_key_permissions(path: &Path) -> Result<(), CertError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|source| {
        CertError::Write {
            path: path.display().to_string(),
            source,
        }
    })
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::needless_pass_by_value
)]
mod tests {
    use super::*;

    #[test]
    fn generate_produces_pem_pair() {
        let bundle = generate_self_signed(DEFAULT_COMMON_NAME, DEFAULT_VALIDITY_DAYS).unwrap();
        assert!(bundle.cert_pem.contains("BEGIN CERTIFICATE"));
        assert!(bundle.key_pem.contains("BEGIN PRIVATE KEY"));
    }

    #[test]
    fn generated_key_is_p256() {
        let bundle = generate_self_signed(DEFAULT_COMMON_NAME, DEFAULT_VALIDITY_DAYS).unwrap();
        let key = KeyPair::from_pem(&bundle.key_pem).unwrap();
        assert_eq!(key.algorithm(), &PKCS_ECDSA_P256_SHA256);
    }

    #[test]
    fn ensure_writes_missing_pair() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("cert.pem");
        let key = dir.path().join("private.key");

        assert!(ensure_self_signed_pair(&cert, &key, DEFAULT_COMMON_NAME, 30).unwrap());
        assert!(cert.exists());
        assert!(key.exists());
    }

    #[test]
    fn ensure_keeps_existing_pair() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("cert.pem");
        let key = dir.path().join("private.key");
        ensure_self_signed_pair(&cert, &key, DEFAULT_COMMON_NAME, 30).unwrap();
        let before = fs::read_to_string(&cert).unwrap();

        assert!(!ensure_self_signed_pair(&cert, &key, DEFAULT_COMMON_NAME, 30).unwrap());
        assert_eq!(fs::read_to_string(&cert).unwrap(), before);
    }

    #[test]
    fn ensure_regenerates_both_when_key_missing() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("cert.pem");
        let key = dir.path().join("private.key");
        fs::write(&cert, "stale").unwrap();

        assert!(ensure_self_signed_pair(&cert, &key, DEFAULT_COMMON_NAME, 30).unwrap());
        assert_ne!(fs::read_to_string(&cert).unwrap(), "stale");
        assert!(key.exists());
    }

    #[cfg(unix)]
    #[test]
    fn written_key_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("cert.pem");
        let key = dir.path().join("private.key");
        ensure_self_signed_pair(&cert, &key, DEFAULT_COMMON_NAME, 30).unwrap();

        let mode = fs::metadata(&key).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}
