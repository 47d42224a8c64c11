// ── Image domain type ──

use serde::{Deserialize, Serialize};

use super::common::{ImageDescriptor, Keyed};

/// A locally stored image as reported by `images list --format json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerImage {
    /// Full reference (e.g. `docker.io/library/alpine:latest`). Identity key.
    pub reference: String,
    pub descriptor: ImageDescriptor,
}

impl ContainerImage {
    /// Repository part of the reference, without tag or digest.
    pub fn repository(&self) -> &str {
        let without_digest = self
            .reference
            .split_once('@')
            .map_or(self.reference.as_str(), |(name, _)| name);
        // A ':' after the last '/' separates the tag; earlier ones are a registry port.
        match without_digest.rfind(':') {
            Some(idx) if !without_digest[idx..].contains('/') => &without_digest[..idx],
            _ => without_digest,
        }
    }

    /// Tag part of the reference, if any.
    pub fn tag(&self) -> Option<&str> {
        let without_digest = self
            .reference
            .split_once('@')
            .map_or(self.reference.as_str(), |(name, _)| name);
        let idx = without_digest.rfind(':')?;
        let tag = &without_digest[idx + 1..];
        (!tag.contains('/')).then_some(tag)
    }
}

impl Keyed for ContainerImage {
    fn key(&self) -> &str {
        &self.reference
    }
}
