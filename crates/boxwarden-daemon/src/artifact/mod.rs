//! Tunnel binary acquisition.
//!
//! Makes sure a platform-appropriate `sing-box` executable is installed in
//! the data directory, downloading and unpacking the release archive the
//! first time only.

mod download;
mod extract;
pub mod platform;

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use boxwarden_core::Layout;
use boxwarden_core::layout::BINARY_NAME;

pub use platform::{Arch, SING_BOX_VERSION};

/// Default bound on the whole download (connect + body).
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Errors from artifact acquisition. All of them are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum AcquireError {
    #[error("Unsupported platform architecture: {0}")]
    UnsupportedPlatform(String),

    #[error("Download of {url} failed: {reason}")]
    DownloadFailed { url: String, reason: String },

    #[error("Download of {url} timed out after {timeout:?}")]
    DownloadTimeout { url: String, timeout: Duration },

    #[error("Archive extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("No {name} executable found under {dir}")]
    ExtractionLayoutUnexpected { name: &'static str, dir: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Installs the tunnel binary into a [`Layout`].
#[derive(Debug, Clone)]
pub struct Acquirer {
    layout: Layout,
    download_timeout: Duration,
}

impl Acquirer {
    pub const fn new(layout: Layout, download_timeout: Duration) -> Self {
        Self {
            layout,
            download_timeout,
        }
    }

    /// Ensure the executable for `arch` is installed and return its path.
    ///
    /// Unsupported architectures fail before anything touches the disk.
    /// An already installed binary is returned as is.
    pub async fn ensure_installed(&self, arch: &str) -> Result<PathBuf, AcquireError> {
        let target =
            Arch::detect(arch).ok_or_else(|| AcquireError::UnsupportedPlatform(arch.to_string()))?;

        let binary = self.layout.binary();
        if binary.is_file() {
            debug!(path = %binary.display(), "sing-box already installed");
            return Ok(binary);
        }

        let url = target.download_url();
        let archive = self.layout.archive();
        info!(arch = %target, version = SING_BOX_VERSION, url = %url, "Downloading sing-box");

        std::fs::create_dir_all(self.layout.staging_dir())?;
        let bytes = download::download_to(&url, &archive, self.download_timeout).await?;
        debug!(bytes, archive = %archive.display(), "Archive downloaded");

        self.install_from_archive(&archive).await
    }

    /// Unpack `archive` into the staging directory, move the executable into
    /// place, clear the staging area and mark the binary executable.
    pub async fn install_from_archive(&self, archive: &Path) -> Result<PathBuf, AcquireError> {
        let staging = self.layout.staging_dir();
        let binary = self.layout.binary();
        std::fs::create_dir_all(&staging)?;

        let extracted = extract::untar(archive, &staging).await.and_then(|()| {
            extract::locate_binary(&staging, BINARY_NAME).ok_or_else(|| {
                AcquireError::ExtractionLayoutUnexpected {
                    name: BINARY_NAME,
                    dir: staging.display().to_string(),
                }
            })
        });
        let source = match extracted {
            Ok(source) => source,
            Err(e) => {
                // Leftovers from a bad archive must not be picked up next time.
                extract::clear_staging(&staging, &binary);
                return Err(e);
            }
        };

        info!(
            from = %source.display(),
            to = %binary.display(),
            "Installing sing-box executable"
        );
        std::fs::create_dir_all(self.layout.root())?;
        move_file(&source, &binary)?;

        extract::clear_staging(&staging, &binary);
        set_executable(&binary);

        info!(path = %binary.display(), "sing-box installed");
        Ok(binary)
    }
}

/// Rename, falling back to copy + remove across filesystems.
fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }
    std::fs::copy(from, to)?;
    std::fs::remove_file(from)
}

#[cfg(unix)]
fn set_executable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)) {
        warn!(path = %path.display(), error = %e, "Failed to mark sing-box executable");
    }
}

#[cfg(not(unix))]
fn set_executable(path: &Path) {
    debug!(path = %path.display(), "No execute bit on this platform");
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    fn acquirer(root: &Path) -> Acquirer {
        Acquirer::new(Layout::new(root), Duration::from_secs(1))
    }

    fn snapshot(root: &Path) -> Vec<PathBuf> {
        let mut out = Vec::new();
        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            for entry in std::fs::read_dir(&dir).unwrap().flatten() {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path.clone());
                }
                out.push(path);
            }
        }
        out.sort();
        out
    }

    #[tokio::test]
    async fn unsupported_arch_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join(".singbox");

        let err = acquirer(&root).ensure_installed("riscv64").await.unwrap_err();
        assert!(matches!(err, AcquireError::UnsupportedPlatform(ref a) if a == "riscv64"));
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn installed_binary_is_reused_without_download() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path());
        std::fs::write(layout.binary(), "#!/bin/sh\n").unwrap();
        let before = snapshot(dir.path());

        let acq = acquirer(dir.path());
        let first = acq.ensure_installed("x86_64").await.unwrap();
        let second = acq.ensure_installed("arm64").await.unwrap();

        assert_eq!(first, layout.binary());
        assert_eq!(second, layout.binary());
        assert_eq!(snapshot(dir.path()), before);
    }

    #[tokio::test]
    async fn missing_archive_is_extraction_failure() {
        let dir = tempfile::tempdir().unwrap();
        let err = acquirer(dir.path())
            .install_from_archive(&dir.path().join("nope.tar.gz"))
            .await
            .unwrap_err();
        assert!(
            matches!(err, AcquireError::ExtractionFailed(_)),
            "expected ExtractionFailed, got {err:?}"
        );
        assert!(!Layout::new(dir.path()).staging_dir().exists());
    }
}
