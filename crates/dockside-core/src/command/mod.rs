// ── Command API ──
//
// Every CLI verb the engine knows, as data. Reads are `Query` values,
// writes are `Command` values; both render their own argument vector so
// the facade never assembles argv by hand.

pub mod requests;

use secrecy::ExposeSecret;

use crate::error::CoreError;
use crate::model::ResourceClass;
use crate::reconcile::Convergence;

pub use requests::{CustomKernelRequest, RegistryLoginRequest};

fn argv<const N: usize>(parts: [&str; N]) -> Vec<String> {
    parts.iter().map(|p| (*p).to_owned()).collect()
}

// ── Queries ─────────────────────────────────────────────────────────

/// Which log stream `logs` should print.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogSource {
    /// The container's stdout/stderr.
    #[default]
    Stdio,
    /// The guest's boot log.
    Boot,
}

/// Read-only CLI invocations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    ListContainers,
    /// Cheap call whose success is taken to mean the system is running.
    SystemProbe,
    ListImages,
    BuilderStatus,
    Logs { id: String, source: LogSource },
    ListDnsDomains,
    DefaultDnsDomain,
    ListRegistries,
    DefaultRegistry,
}

impl Query {
    pub fn args(&self) -> Vec<String> {
        match self {
            Self::ListContainers => argv(["ls", "--all", "--format", "json"]),
            Self::SystemProbe => argv(["ls"]),
            Self::ListImages => argv(["images", "list", "--format", "json"]),
            Self::BuilderStatus => argv(["builder", "status", "--json"]),
            Self::Logs { id, source } => {
                let mut args = argv(["logs"]);
                if *source == LogSource::Boot {
                    args.push("--boot".into());
                }
                args.push(id.clone());
                args
            }
            Self::ListDnsDomains => argv(["system", "dns", "list"]),
            Self::DefaultDnsDomain => argv(["system", "dns", "default", "inspect"]),
            Self::ListRegistries => argv(["registry", "list", "--format", "json"]),
            Self::DefaultRegistry => argv(["registry", "default", "inspect"]),
        }
    }

    /// Human-readable name used to prefix error messages.
    pub fn operation(&self) -> String {
        match self {
            Self::ListContainers => "list containers".into(),
            Self::SystemProbe => "check system status".into(),
            Self::ListImages => "list images".into(),
            Self::BuilderStatus => "check builder status".into(),
            Self::Logs { id, .. } => format!("fetch logs for {id}"),
            Self::ListDnsDomains => "list DNS domains".into(),
            Self::DefaultDnsDomain => "read default DNS domain".into(),
            Self::ListRegistries => "list registries".into(),
            Self::DefaultRegistry => "read default registry".into(),
        }
    }
}

// ── Commands ────────────────────────────────────────────────────────

/// All write operations against the container runtime.
#[derive(Debug, Clone)]
pub enum Command {
    // ── System ───────────────────────────────────────────────────────
    StartSystem,
    StopSystem,
    RestartSystem,

    // ── Containers ───────────────────────────────────────────────────
    StartContainer { id: String },
    StopContainer { id: String },
    RestartContainer { id: String },
    RemoveContainer { id: String },

    // ── Builder ──────────────────────────────────────────────────────
    StartBuilder,
    StopBuilder,
    DeleteBuilder,

    // ── Images ───────────────────────────────────────────────────────
    RemoveImage { reference: String },
    PullImage { reference: String },

    // ── DNS ──────────────────────────────────────────────────────────
    CreateDnsDomain { domain: String },
    DeleteDnsDomain { domain: String },
    SetDefaultDnsDomain { domain: String },

    // ── Registries ───────────────────────────────────────────────────
    RegistryLogin(RegistryLoginRequest),
    RegistryLogout { server: String },
    SetDefaultRegistry { server: String },
    UnsetDefaultRegistry,

    // ── Kernel ───────────────────────────────────────────────────────
    SetRecommendedKernel,
    SetCustomKernel(CustomKernelRequest),
}

impl Command {
    /// Argument vector for the CLI. `RestartContainer` is composed from a
    /// stop and a start and has no argv of its own.
    pub fn args(&self) -> Vec<String> {
        match self {
            Self::StartSystem => argv(["system", "start"]),
            Self::StopSystem => argv(["system", "stop"]),
            Self::RestartSystem => argv(["system", "restart"]),

            Self::StartContainer { id } => argv(["start", id]),
            Self::StopContainer { id } => argv(["stop", id]),
            Self::RemoveContainer { id } => argv(["rm", id]),
            Self::RestartContainer { .. } => Vec::new(),

            Self::StartBuilder => argv(["builder", "start"]),
            Self::StopBuilder => argv(["builder", "stop"]),
            Self::DeleteBuilder => argv(["builder", "delete"]),

            Self::RemoveImage { reference } => argv(["images", "rm", reference]),
            Self::PullImage { reference } => argv(["images", "pull", reference]),

            Self::CreateDnsDomain { domain } => argv(["system", "dns", "create", domain]),
            Self::DeleteDnsDomain { domain } => argv(["system", "dns", "delete", domain]),
            Self::SetDefaultDnsDomain { domain } => {
                argv(["system", "dns", "default", "set", domain])
            }

            Self::RegistryLogin(req) => argv([
                "registry",
                "login",
                "--username",
                &req.username,
                "--password-stdin",
                &req.server,
            ]),
            Self::RegistryLogout { server } => argv(["registry", "logout", server]),
            Self::SetDefaultRegistry { server } => argv(["registry", "default", "set", server]),
            Self::UnsetDefaultRegistry => argv(["registry", "default", "unset"]),

            Self::SetRecommendedKernel => argv(["system", "kernel", "set", "--recommended"]),
            Self::SetCustomKernel(req) => {
                let mut args = argv(["system", "kernel", "set", "--binary"]);
                args.push(req.binary_path.to_string_lossy().into_owned());
                if let Some(tar) = &req.tar_path {
                    args.push("--tar".into());
                    args.push(tar.clone());
                }
                args.push("--arch".into());
                args.push(req.arch.to_string());
                args
            }
        }
    }

    /// Data written to the CLI's stdin, if any.
    pub(crate) fn stdin(&self) -> Option<&str> {
        match self {
            Self::RegistryLogin(req) => Some(req.password.expose_secret()),
            _ => None,
        }
    }

    /// Human-readable name used to prefix error messages.
    pub fn operation(&self) -> String {
        match self {
            Self::StartSystem => "start the container system".into(),
            Self::StopSystem => "stop the container system".into(),
            Self::RestartSystem => "restart the container system".into(),
            Self::StartContainer { id } => format!("start container {id}"),
            Self::StopContainer { id } => format!("stop container {id}"),
            Self::RestartContainer { id } => format!("restart container {id}"),
            Self::RemoveContainer { id } => format!("remove container {id}"),
            Self::StartBuilder => "start the builder".into(),
            Self::StopBuilder => "stop the builder".into(),
            Self::DeleteBuilder => "delete the builder".into(),
            Self::RemoveImage { reference } => format!("remove image {reference}"),
            Self::PullImage { reference } => format!("pull image {reference}"),
            Self::CreateDnsDomain { domain } => format!("create DNS domain {domain}"),
            Self::DeleteDnsDomain { domain } => format!("delete DNS domain {domain}"),
            Self::SetDefaultDnsDomain { domain } => format!("set default DNS domain {domain}"),
            Self::RegistryLogin(req) => format!("log in to {}", req.server),
            Self::RegistryLogout { server } => format!("log out of {server}"),
            Self::SetDefaultRegistry { server } => format!("set default registry {server}"),
            Self::UnsetDefaultRegistry => "unset the default registry".into(),
            Self::SetRecommendedKernel => "install the recommended kernel".into(),
            Self::SetCustomKernel(_) => "install a custom kernel".into(),
        }
    }

    /// Message published on success, for verbs that announce themselves.
    ///
    /// Container lifecycle verbs stay silent: their outcome is visible in
    /// the container list.
    pub fn success_message(&self) -> Option<String> {
        match self {
            Self::StartSystem => Some("Container system started".into()),
            Self::StopSystem => Some("Container system stopped".into()),
            Self::RestartSystem => Some("Container system restarted".into()),
            Self::StartContainer { .. }
            | Self::StopContainer { .. }
            | Self::RestartContainer { .. }
            | Self::RemoveContainer { .. }
            | Self::StartBuilder
            | Self::StopBuilder => None,
            Self::DeleteBuilder => Some("Builder deleted".into()),
            Self::RemoveImage { reference } => Some(format!("Removed image {reference}")),
            Self::PullImage { reference } => Some(format!("Pulled image {reference}")),
            Self::CreateDnsDomain { domain } => Some(format!("Created DNS domain {domain}")),
            Self::DeleteDnsDomain { domain } => Some(format!("Deleted DNS domain {domain}")),
            Self::SetDefaultDnsDomain { domain } => {
                Some(format!("{domain} is now the default DNS domain"))
            }
            Self::RegistryLogin(req) => Some(format!("Logged in to {}", req.server)),
            Self::RegistryLogout { server } => Some(format!("Logged out of {server}")),
            Self::SetDefaultRegistry { server } => {
                Some(format!("{server} is now the default registry"))
            }
            Self::UnsetDefaultRegistry => Some("Default registry cleared".into()),
            Self::SetRecommendedKernel => Some("Recommended kernel installed".into()),
            Self::SetCustomKernel(_) => Some("Custom kernel installed".into()),
        }
    }

    /// Resource class whose loading flag covers this command.
    pub fn resource(&self) -> ResourceClass {
        match self {
            Self::StartSystem | Self::StopSystem | Self::RestartSystem => ResourceClass::System,
            Self::StartContainer { .. }
            | Self::StopContainer { .. }
            | Self::RestartContainer { .. }
            | Self::RemoveContainer { .. } => ResourceClass::Containers,
            Self::StartBuilder | Self::StopBuilder | Self::DeleteBuilder => {
                ResourceClass::Builders
            }
            Self::RemoveImage { .. } | Self::PullImage { .. } => ResourceClass::Images,
            Self::CreateDnsDomain { .. }
            | Self::DeleteDnsDomain { .. }
            | Self::SetDefaultDnsDomain { .. } => ResourceClass::Dns,
            Self::RegistryLogin(_)
            | Self::RegistryLogout { .. }
            | Self::SetDefaultRegistry { .. }
            | Self::UnsetDefaultRegistry => ResourceClass::Registries,
            Self::SetRecommendedKernel | Self::SetCustomKernel(_) => ResourceClass::Kernel,
        }
    }

    /// Reject commands whose arguments the CLI would misparse.
    pub(crate) fn validate(&self) -> Result<(), CoreError> {
        let (what, value) = match self {
            Self::StartContainer { id }
            | Self::StopContainer { id }
            | Self::RestartContainer { id }
            | Self::RemoveContainer { id } => ("container id", id),
            Self::RemoveImage { reference } | Self::PullImage { reference } => {
                ("image reference", reference)
            }
            Self::CreateDnsDomain { domain }
            | Self::DeleteDnsDomain { domain }
            | Self::SetDefaultDnsDomain { domain } => ("DNS domain", domain),
            Self::RegistryLogout { server } | Self::SetDefaultRegistry { server } => {
                ("registry server", server)
            }
            Self::RegistryLogin(req) => return req.validate(),
            Self::SetCustomKernel(req) => return req.validate(),
            _ => return Ok(()),
        };
        check_arg(what, value)
    }

    /// Container id this command holds in the busy set while in flight.
    pub fn container_id(&self) -> Option<&str> {
        match self {
            Self::StartContainer { id }
            | Self::StopContainer { id }
            | Self::RestartContainer { id }
            | Self::RemoveContainer { id } => Some(id),
            _ => None,
        }
    }
}

/// Result of a command execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandResult {
    /// The CLI accepted the command and any follow-up refresh ran.
    Ok,
    /// A container verb was accepted and convergence polling finished.
    Container(Convergence),
}

/// Reject argv values that are blank or that the CLI would read as a flag.
pub(crate) fn check_arg(what: &str, value: &str) -> Result<(), CoreError> {
    if value.trim().is_empty() {
        return Err(CoreError::Validation {
            message: format!("{what} must not be empty"),
        });
    }
    if value.starts_with('-') {
        return Err(CoreError::Validation {
            message: format!("{what} must not start with '-': {value}"),
        });
    }
    Ok(())
}
