// ── System settings: DNS domains, registries, kernel ──

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::common::Keyed;

/// A local DNS domain served by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsDomain {
    pub domain: String,
    pub is_default: bool,
}

impl Keyed for DnsDomain {
    fn key(&self) -> &str {
        &self.domain
    }
}

/// A registry the runtime holds credentials for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    pub server: String,
    #[serde(default)]
    pub username: Option<String>,
    /// Not part of `registry list` output; filled in from the default lookup.
    #[serde(default)]
    pub is_default: bool,
}

impl Keyed for Registry {
    fn key(&self) -> &str {
        &self.server
    }
}

/// Guest kernel architecture.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum KernelArch {
    Arm64,
    Amd64,
}

impl KernelArch {
    /// Architecture matching the host this process was built for.
    pub fn host() -> Self {
        if cfg!(target_arch = "x86_64") {
            Self::Amd64
        } else {
            Self::Arm64
        }
    }
}

/// Guest kernel the runtime boots containers with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelConfig {
    pub is_recommended: bool,
    /// Path to a kernel binary (custom kernels only).
    pub binary_path: Option<PathBuf>,
    /// Local path or URL of a tar archive holding the binary.
    pub tar_path: Option<String>,
    pub arch: KernelArch,
}

impl KernelConfig {
    /// The runtime's recommended kernel for `arch`.
    pub fn recommended(arch: KernelArch) -> Self {
        Self {
            is_recommended: true,
            binary_path: None,
            tar_path: None,
            arch,
        }
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::recommended(KernelArch::host())
    }
}
