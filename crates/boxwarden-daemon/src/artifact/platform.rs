//! Target architecture of the tunnel binary.

/// sing-box release the acquirer installs.
pub const SING_BOX_VERSION: &str = "1.13.0-alpha.27";

const RELEASE_BASE_URL: &str = "https://github.com/SagerNet/sing-box/releases/download";

/// Architectures with a published linux release archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    Amd64,
    Arm64,
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Amd64 => write!(f, "amd64"),
            Self::Arm64 => write!(f, "arm64"),
        }
    }
}

impl Arch {
    /// Map a runtime architecture string (`uname -m`, Rust's
    /// `std::env::consts::ARCH`, or Go-style names) to a supported arch.
    /// Returns `None` for anything else.
    pub fn detect(arch: &str) -> Option<Self> {
        let arch = arch.trim().to_ascii_lowercase();
        if arch.contains("amd64") || arch.contains("x86_64") {
            Some(Self::Amd64)
        } else if arch.contains("aarch64") || arch.contains("arm64") {
            Some(Self::Arm64)
        } else {
            None
        }
    }

    /// Release archive URL for this architecture.
    pub fn download_url(self) -> String {
        format!(
            "{RELEASE_BASE_URL}/v{SING_BOX_VERSION}/sing-box-{SING_BOX_VERSION}-linux-{self}.tar.gz"
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn rust_and_go_names_map_to_same_arch() {
        assert_eq!(Arch::detect("x86_64"), Some(Arch::Amd64));
        assert_eq!(Arch::detect("amd64"), Some(Arch::Amd64));
        assert_eq!(Arch::detect("aarch64"), Some(Arch::Arm64));
        assert_eq!(Arch::detect("ARM64"), Some(Arch::Arm64));
    }

    #[test]
    fn other_arches_are_unsupported() {
        assert_eq!(Arch::detect("riscv64"), None);
        assert_eq!(Arch::detect("x86"), None);
        assert_eq!(Arch::detect("arm"), None);
        assert_eq!(Arch::detect(""), None);
    }

    #[test]
    fn amd64_url() {
        assert_eq!(
            Arch::Amd64.download_url(),
            "https://github.com/SagerNet/sing-box/releases/download/v1.13.0-alpha.27/sing-box-1.13.0-alpha.27-linux-amd64.tar.gz"
        );
    }

    #[test]
    fn arm64_url() {
        assert!(Arch::Arm64.download_url().ends_with("-linux-arm64.tar.gz"));
    }
}
