// ── Common types shared across the domain model ──

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Identity key of a decoded record.
///
/// Every collection in the store assumes its keys are unique within one
/// snapshot; the decoder uses this to drop duplicates.
pub trait Keyed {
    fn key(&self) -> &str;
}

/// Target platform of a container or builder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Platform {
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub architecture: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.variant {
            Some(variant) => write!(f, "{}/{}/{variant}", self.os, self.architecture),
            None => write!(f, "{}/{}", self.os, self.architecture),
        }
    }
}

/// OCI content descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageDescriptor {
    pub digest: String,
    #[serde(default)]
    pub media_type: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

/// An image reference together with its resolved descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageReference {
    pub reference: String,
    #[serde(default)]
    pub descriptor: ImageDescriptor,
}

/// Resolver configuration handed to the guest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsConfiguration {
    #[serde(default)]
    pub nameservers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default)]
    pub search_domains: Vec<String>,
    #[serde(default)]
    pub options: Vec<String>,
}

/// CPU and memory limits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resources {
    #[serde(default)]
    pub cpus: u32,
    #[serde(default)]
    pub memory_in_bytes: u64,
}

/// One network interface attached to a running container or builder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkAttachment {
    #[serde(default)]
    pub gateway: String,
    #[serde(default)]
    pub hostname: String,
    /// Network identifier the interface is attached to.
    #[serde(default)]
    pub network: String,
    /// Interface address in CIDR notation.
    #[serde(default)]
    pub address: String,
}

impl NetworkAttachment {
    /// Address without the prefix length, e.g. `192.168.64.3`.
    pub fn ip(&self) -> &str {
        self.address
            .split_once('/')
            .map_or(self.address.as_str(), |(ip, _)| ip)
    }
}
