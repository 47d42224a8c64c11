// ── Builder domain types ──
//
// The image builder is a utility container managed by the runtime. Its
// status payload has the same outer shape as a container, but the
// configuration carries build-specific fields.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::common::{
    DnsConfiguration, ImageReference, Keyed, NetworkAttachment, Platform, Resources,
};
use super::container::{InitProcess, Mount};

/// A builder instance as reported by `builder status --json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Builder {
    pub status: String,
    pub configuration: BuilderConfiguration,
    #[serde(default)]
    pub networks: Vec<NetworkAttachment>,
}

impl Builder {
    pub fn id(&self) -> &str {
        &self.configuration.id
    }

    pub fn is_running(&self) -> bool {
        self.status.eq_ignore_ascii_case("running")
    }
}

impl Keyed for Builder {
    fn key(&self) -> &str {
        self.id()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuilderConfiguration {
    pub id: String,
    #[serde(default)]
    pub image: ImageReference,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub sysctls: BTreeMap<String, String>,
    /// Names of the networks the builder joins.
    #[serde(default)]
    pub networks: Vec<String>,
    #[serde(default)]
    pub platform: Platform,
    #[serde(default)]
    pub resources: Resources,
    #[serde(default)]
    pub mounts: Vec<Mount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns: Option<DnsConfiguration>,
    #[serde(default)]
    pub rosetta: bool,
    #[serde(default)]
    pub runtime_handler: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_process: Option<InitProcess>,
}
