// ── Request payloads for commands that carry more than an id ──

use std::path::PathBuf;

use secrecy::{ExposeSecret, SecretString};

use super::check_arg;
use crate::error::CoreError;
use crate::model::{KernelArch, KernelConfig};

/// Credentials for `registry login`.
///
/// The password is piped to the CLI on stdin and never placed in argv.
#[derive(Debug, Clone)]
pub struct RegistryLoginRequest {
    pub server: String,
    pub username: String,
    pub password: SecretString,
}

impl RegistryLoginRequest {
    pub(crate) fn validate(&self) -> Result<(), CoreError> {
        check_arg("registry server", &self.server)?;
        check_arg("registry username", &self.username)?;
        if self.password.expose_secret().is_empty() {
            return Err(CoreError::Validation {
                message: "registry password must not be empty".into(),
            });
        }
        Ok(())
    }
}

/// A custom guest kernel to install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomKernelRequest {
    pub binary_path: PathBuf,
    /// Local path or URL of a tar archive containing `binary_path`.
    pub tar_path: Option<String>,
    pub arch: KernelArch,
}

impl CustomKernelRequest {
    pub(crate) fn validate(&self) -> Result<(), CoreError> {
        check_arg("kernel binary path", &self.binary_path.to_string_lossy())?;
        match &self.tar_path {
            Some(tar) => check_arg("kernel tar path", tar),
            None => Ok(()),
        }
    }

    /// The configuration this request installs once accepted.
    pub fn to_config(&self) -> KernelConfig {
        KernelConfig {
            is_recommended: false,
            binary_path: Some(self.binary_path.clone()),
            tar_path: self.tar_path.clone(),
            arch: self.arch,
        }
    }
}
