// ── Container domain types ──

use serde::{Deserialize, Serialize};

use super::common::{
    DnsConfiguration, ImageReference, Keyed, NetworkAttachment, Platform, Resources,
};

/// A container as reported by `ls --all --format json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    /// Free-text status. Only `"running"` has a defined meaning.
    pub status: String,
    pub configuration: ContainerConfiguration,
    #[serde(default)]
    pub networks: Vec<NetworkAttachment>,
}

impl Container {
    pub fn id(&self) -> &str {
        &self.configuration.id
    }

    /// Case-insensitive check against the canonical `"running"` status.
    pub fn is_running(&self) -> bool {
        self.status.eq_ignore_ascii_case("running")
    }
}

impl Keyed for Container {
    fn key(&self) -> &str {
        self.id()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerConfiguration {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default)]
    pub runtime_handler: String,
    #[serde(default)]
    pub init_process: InitProcess,
    #[serde(default)]
    pub mounts: Vec<Mount>,
    #[serde(default)]
    pub platform: Platform,
    #[serde(default)]
    pub image: ImageReference,
    #[serde(default)]
    pub rosetta: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns: Option<DnsConfiguration>,
    #[serde(default)]
    pub resources: Resources,
}

/// The process the runtime launches as PID 1.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitProcess {
    #[serde(default)]
    pub terminal: bool,
    /// Raw `KEY=VALUE` entries, in the order the runtime reports them.
    #[serde(default)]
    pub environment: Vec<String>,
    #[serde(default)]
    pub working_directory: String,
    #[serde(default)]
    pub arguments: Vec<String>,
    #[serde(default)]
    pub executable: String,
    #[serde(default)]
    pub user: ProcessUser,
}

impl InitProcess {
    /// Split each environment entry on its first `=`.
    ///
    /// An entry without `=` yields an empty value.
    pub fn environment_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.environment
            .iter()
            .map(|entry| entry.split_once('=').unwrap_or((entry.as_str(), "")))
    }
}

// ── ProcessUser ─────────────────────────────────────────────────────

/// Identity the init process runs as.
///
/// The CLI encodes this as two independently nullable objects (`id` and
/// `raw`). When both are present the numeric pair wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WireUser", into = "WireUser")]
pub enum ProcessUser {
    Id { uid: u32, gid: u32 },
    Raw(String),
    #[default]
    Unspecified,
}

impl std::fmt::Display for ProcessUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id { uid, gid } => write!(f, "{uid}:{gid}"),
            Self::Raw(user) => f.write_str(user),
            Self::Unspecified => f.write_str("default"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct WireUser {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<WireUserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    raw: Option<WireRawUser>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireUserId {
    uid: u32,
    gid: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRawUser {
    user_string: String,
}

impl From<WireUser> for ProcessUser {
    fn from(wire: WireUser) -> Self {
        match (wire.id, wire.raw) {
            (Some(WireUserId { uid, gid }), _) => Self::Id { uid, gid },
            (None, Some(raw)) => Self::Raw(raw.user_string),
            (None, None) => Self::Unspecified,
        }
    }
}

impl From<ProcessUser> for WireUser {
    fn from(user: ProcessUser) -> Self {
        match user {
            ProcessUser::Id { uid, gid } => Self {
                id: Some(WireUserId { uid, gid }),
                raw: None,
            },
            ProcessUser::Raw(user_string) => Self {
                id: None,
                raw: Some(WireRawUser { user_string }),
            },
            ProcessUser::Unspecified => Self::default(),
        }
    }
}

// ── Mount ───────────────────────────────────────────────────────────

/// A filesystem shared into the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mount {
    #[serde(rename = "type", default)]
    pub kind: MountKind,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub destination: String,
    #[serde(default)]
    pub options: Vec<String>,
}

/// Mount backend.
///
/// On the wire this is an object with exactly one of `tmpfs` / `virtiofs`
/// set to an empty marker. Neither (or both) decodes as `Unknown`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "WireMountType", into = "WireMountType")]
pub enum MountKind {
    Tmpfs,
    Virtiofs,
    #[default]
    Unknown,
}

impl std::fmt::Display for MountKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Tmpfs => "tmpfs",
            Self::Virtiofs => "virtiofs",
            Self::Unknown => "unknown",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
struct WireMountType {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tmpfs: Option<Marker>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    virtiofs: Option<Marker>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
struct Marker {}

impl From<WireMountType> for MountKind {
    fn from(wire: WireMountType) -> Self {
        match (wire.tmpfs, wire.virtiofs) {
            (Some(_), None) => Self::Tmpfs,
            (None, Some(_)) => Self::Virtiofs,
            _ => Self::Unknown,
        }
    }
}

impl From<MountKind> for WireMountType {
    fn from(kind: MountKind) -> Self {
        match kind {
            MountKind::Tmpfs => Self {
                tmpfs: Some(Marker {}),
                virtiofs: None,
            },
            MountKind::Virtiofs => Self {
                tmpfs: None,
                virtiofs: Some(Marker {}),
            },
            MountKind::Unknown => Self::default(),
        }
    }
}
