//! On-disk layout of the tunnel data directory.
//!
//! Everything boxwarden writes lives under one directory (`.singbox` by
//! default, relative to the working directory of the host application).

use std::path::{Path, PathBuf};

/// Default data directory, relative to the working directory.
pub const DEFAULT_DATA_DIR: &str = ".singbox";

/// File name of the tunnel executable, both inside the release archive and
/// once installed.
pub const BINARY_NAME: &str = "sing-box";

const STAGING_DIR: &str = ".staging";
const ARCHIVE_FILENAME: &str = "sing-box.tar.gz";
const REALITY_KEY_FILENAME: &str = "reality_key.txt";
const CERT_FILENAME: &str = "cert.pem";
const PRIVATE_KEY_FILENAME: &str = "private.key";
const CONFIG_FILENAME: &str = "config.json";

/// Paths of every file boxwarden manages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Data directory root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Installed tunnel executable.
    pub fn binary(&self) -> PathBuf {
        self.root.join(BINARY_NAME)
    }

    /// Scratch directory for download and extraction. Removed after install.
    pub fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    /// Downloaded release archive (inside the staging directory).
    pub fn archive(&self) -> PathBuf {
        self.staging_dir().join(ARCHIVE_FILENAME)
    }

    /// Persisted Reality key-generation output.
    pub fn reality_key(&self) -> PathBuf {
        self.root.join(REALITY_KEY_FILENAME)
    }

    /// Self-signed TLS certificate (PEM).
    pub fn cert(&self) -> PathBuf {
        self.root.join(CERT_FILENAME)
    }

    /// Private key for [`Layout::cert`] (PEM).
    pub fn private_key(&self) -> PathBuf {
        self.root.join(PRIVATE_KEY_FILENAME)
    }

    /// Generated tunnel configuration document.
    pub fn config(&self) -> PathBuf {
        self.root.join(CONFIG_FILENAME)
    }
}

impl Default for Layout {
    fn default() -> Self {
        Self::new(DEFAULT_DATA_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_matches_fixed_paths() {
        let layout = Layout::default();
        assert_eq!(layout.binary(), PathBuf::from(".singbox/sing-box"));
        assert_eq!(layout.config(), PathBuf::from(".singbox/config.json"));
        assert_eq!(layout.reality_key(), PathBuf::from(".singbox/reality_key.txt"));
        assert_eq!(layout.cert(), PathBuf::from(".singbox/cert.pem"));
        assert_eq!(layout.private_key(), PathBuf::from(".singbox/private.key"));
    }

    #[test]
    fn archive_lives_in_staging() {
        let layout = Layout::new("/srv/data");
        assert!(layout.archive().starts_with(layout.staging_dir()));
        assert!(!layout.binary().starts_with(layout.staging_dir()));
    }
}
