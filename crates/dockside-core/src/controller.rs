// ── Controller facade ──
//
// The verb-level API over the container CLI. Every operation runs the CLI
// through the injected `CommandRunner`, decodes what it printed, and
// publishes the result (or a human-readable failure) to the `DataStore`.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command::{
    Command, CommandResult, CustomKernelRequest, LogSource, Query, RegistryLoginRequest,
};
use crate::config::CoreConfig;
use crate::decode::{decode_lines, decode_list, decode_one_or_many, decode_single_line};
use crate::error::CoreError;
use crate::exec::{CommandRunner, ProcessRunner};
use crate::model::{
    Builder, Container, ContainerImage, DnsDomain, KernelArch, KernelConfig, Keyed, Registry,
    ResourceClass, SystemStatus,
};
use crate::reconcile::{Convergence, Expectation, PollingHandle, Probe, converge};
use crate::store::{BusyGuard, DataStore, LoadingGuard};

/// Handle to one reconciliation engine instance.
///
/// Cheaply cloneable; all clones share the same runner, store, and
/// cancellation root. Unrelated operations run concurrently: nothing here
/// holds a lock while the CLI runs.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    config: CoreConfig,
    runner: Arc<dyn CommandRunner>,
    store: Arc<DataStore>,
    /// Parent of every polling loop's token.
    cancel: CancellationToken,
}

impl Controller {
    /// Create a controller that runs the real CLI at `config.program`.
    pub fn new(config: CoreConfig) -> Self {
        Self::with_runner(config, Arc::new(ProcessRunner))
    }

    /// Create a controller around a custom runner and a fresh store.
    pub fn with_runner(config: CoreConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self::with_store(config, runner, Arc::new(DataStore::new()))
    }

    /// Create a controller that publishes into an existing store.
    pub fn with_store(
        config: CoreConfig,
        runner: Arc<dyn CommandRunner>,
        store: Arc<DataStore>,
    ) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                config,
                runner,
                store,
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.inner.config
    }

    /// Access the underlying DataStore.
    pub fn store(&self) -> &Arc<DataStore> {
        &self.inner.store
    }

    // ── Plumbing ─────────────────────────────────────────────────────

    /// Run the CLI once and return its stdout, or the failure as a
    /// `CoreError` naming `operation`.
    async fn invoke(
        &self,
        operation: &str,
        args: &[String],
        stdin: Option<&str>,
    ) -> Result<String, CoreError> {
        let output = self
            .inner
            .runner
            .run(&self.inner.config.program, args, stdin)
            .await
            .map_err(|source| CoreError::Spawn {
                operation: operation.to_owned(),
                source,
            })?;

        if output.succeeded() {
            Ok(output.stdout)
        } else {
            debug!(operation, code = ?output.exit_code, "command failed");
            Err(CoreError::command_failed(
                operation,
                &output.stderr,
                output.exit_code,
            ))
        }
    }

    async fn query(&self, query: &Query) -> Result<String, CoreError> {
        self.invoke(&query.operation(), &query.args(), None).await
    }

    /// Publish a failure to the store's error slot and pass the result on.
    fn report<T>(&self, result: Result<T, CoreError>) -> Result<T, CoreError> {
        if let Err(ref e) = result {
            warn!(error = %e, "operation failed");
            self.inner.store.set_error(e.to_string());
        }
        result
    }

    // ── Reads ────────────────────────────────────────────────────────

    async fn load_list<T>(&self, query: &Query) -> Result<Vec<T>, CoreError>
    where
        T: serde::de::DeserializeOwned + Keyed,
    {
        let raw = self.query(query).await?;
        decode_list(&raw).map_err(|source| CoreError::Decode {
            operation: query.operation(),
            source,
        })
    }

    async fn load_containers(&self) -> Result<(), CoreError> {
        let store = &self.inner.store;
        let _loading = LoadingGuard::new(store, ResourceClass::Containers);
        let ticket = store.issue_ticket(ResourceClass::Containers);
        let containers: Vec<Container> = self.load_list(&Query::ListContainers).await?;
        store.apply_containers(ticket, containers);
        Ok(())
    }

    async fn load_images(&self) -> Result<(), CoreError> {
        let store = &self.inner.store;
        let _loading = LoadingGuard::new(store, ResourceClass::Images);
        let ticket = store.issue_ticket(ResourceClass::Images);
        let images: Vec<ContainerImage> = self.load_list(&Query::ListImages).await?;
        store.apply_images(ticket, images);
        Ok(())
    }

    async fn load_dns_domains(&self) -> Result<(), CoreError> {
        let store = &self.inner.store;
        let _loading = LoadingGuard::new(store, ResourceClass::Dns);
        let ticket = store.issue_ticket(ResourceClass::Dns);
        let raw = self.query(&Query::ListDnsDomains).await?;
        let default = self.lookup_default(&Query::DefaultDnsDomain).await;
        let domains = decode_lines(&raw)
            .into_iter()
            .map(|domain| DnsDomain {
                is_default: default.as_deref() == Some(domain.as_str()),
                domain,
            })
            .collect();
        store.apply_dns_domains(ticket, domains);
        Ok(())
    }

    async fn load_registries(&self) -> Result<(), CoreError> {
        let store = &self.inner.store;
        let _loading = LoadingGuard::new(store, ResourceClass::Registries);
        let ticket = store.issue_ticket(ResourceClass::Registries);
        let mut registries: Vec<Registry> = self.load_list(&Query::ListRegistries).await?;
        let default = self.lookup_default(&Query::DefaultRegistry).await;
        for registry in &mut registries {
            registry.is_default = default.as_deref() == Some(registry.server.as_str());
        }
        store.apply_registries(ticket, registries);
        Ok(())
    }

    /// Re-list containers. On failure the previous snapshot stays.
    pub async fn refresh_containers(&self) -> Result<(), CoreError> {
        self.report(self.load_containers().await)
    }

    pub async fn refresh_images(&self) -> Result<(), CoreError> {
        self.report(self.load_images().await)
    }

    /// Re-read the builder.
    ///
    /// A non-zero exit means no builder exists. Unreadable output also
    /// clears the builder list, and is reported. Only a launch failure
    /// leaves the previous state in place.
    pub async fn refresh_builders(&self) -> Result<(), CoreError> {
        let store = &self.inner.store;
        let _loading = LoadingGuard::new(store, ResourceClass::Builders);
        let ticket = store.issue_ticket(ResourceClass::Builders);
        let query = Query::BuilderStatus;

        let raw = match self.query(&query).await {
            Ok(raw) => raw,
            Err(CoreError::CommandFailed { code, .. }) => {
                debug!(?code, "no builder");
                store.apply_builders(ticket, Vec::new());
                return Ok(());
            }
            Err(e) => return self.report(Err(e)),
        };

        match decode_one_or_many::<Builder>(&raw) {
            Ok(builders) => {
                store.apply_builders(ticket, builders);
                Ok(())
            }
            Err(source) => {
                store.apply_builders(ticket, Vec::new());
                self.report(Err(CoreError::Decode {
                    operation: query.operation(),
                    source,
                }))
            }
        }
    }

    /// Infer whether the container system is up.
    ///
    /// Any failure, including a missing binary, reads as `Stopped`; this
    /// never publishes an error.
    pub async fn check_system_status(&self) -> SystemStatus {
        let store = &self.inner.store;
        let _loading = LoadingGuard::new(store, ResourceClass::System);
        let ticket = store.issue_ticket(ResourceClass::System);
        let status = match self.query(&Query::SystemProbe).await {
            Ok(_) => SystemStatus::Running,
            Err(e) => {
                debug!(error = %e, "system probe failed");
                SystemStatus::Stopped
            }
        };
        if store.apply_system_status(ticket, status) {
            info!(%status, "system status changed");
        }
        status
    }

    /// Re-list DNS domains and mark the default one.
    pub async fn refresh_dns_domains(&self) -> Result<(), CoreError> {
        self.report(self.load_dns_domains().await)
    }

    /// Re-list registries and mark the default one.
    pub async fn refresh_registries(&self) -> Result<(), CoreError> {
        self.report(self.load_registries().await)
    }

    /// `inspect`-style lookups exit non-zero when nothing is set.
    async fn lookup_default(&self, query: &Query) -> Option<String> {
        match self.query(query).await {
            Ok(raw) => decode_single_line(&raw),
            Err(e) => {
                debug!(error = %e, "no default");
                None
            }
        }
    }

    /// The kernel configuration last applied through this engine.
    pub fn kernel_config(&self) -> KernelConfig {
        self.inner.store.kernel_config()
    }

    /// Fetch a container's logs as plain text. Nothing is stored.
    pub async fn fetch_logs(&self, id: &str, source: LogSource) -> Result<String, CoreError> {
        let query = Query::Logs {
            id: id.to_owned(),
            source,
        };
        self.report(self.query(&query).await)
    }

    /// One full cycle: containers, images, builders, then system status.
    ///
    /// Each step reports its own failure and the cycle carries on.
    pub async fn refresh_all(&self) {
        let _ = self.refresh_containers().await;
        let _ = self.refresh_images().await;
        let _ = self.refresh_builders().await;
        self.check_system_status().await;
    }

    /// Refresh the settings collections: DNS domains and registries.
    pub async fn refresh_settings(&self) {
        let _ = self.refresh_dns_domains().await;
        let _ = self.refresh_registries().await;
    }

    // ── Polling ──────────────────────────────────────────────────────

    /// Start the periodic refresh loop at the configured interval.
    ///
    /// Returns `None` when the interval is zero. Each caller gets an
    /// independent loop; dropping the handle stops it.
    pub fn start_polling(&self) -> Option<PollingHandle> {
        self.start_polling_every(self.inner.config.refresh_interval)
    }

    /// Start a refresh loop with an explicit period, or `None` if it is zero.
    pub fn start_polling_every(&self, period: Duration) -> Option<PollingHandle> {
        if period.is_zero() {
            debug!("zero refresh period, polling disabled");
            return None;
        }
        Some(PollingHandle::spawn(
            self.clone(),
            period,
            self.inner.cancel.child_token(),
        ))
    }

    /// Cancel every polling loop started from this controller.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }

    // ── Command execution ────────────────────────────────────────────

    /// Execute a mutating command.
    ///
    /// Failures are published to the store's error slot and also returned.
    pub async fn execute(&self, cmd: Command) -> Result<CommandResult, CoreError> {
        let result = if cmd.container_id().is_some() {
            self.container_command(&cmd)
                .await
                .map(CommandResult::Container)
        } else {
            self.runtime_command(&cmd).await.map(|()| CommandResult::Ok)
        };
        self.report(result)
    }

    /// Container verbs: hold the id busy, issue the verb, then wait for
    /// the list to reflect it.
    async fn container_command(&self, cmd: &Command) -> Result<Convergence, CoreError> {
        cmd.validate()?;
        let id = cmd.container_id().unwrap_or_default();
        let Some(_busy) = BusyGuard::acquire(&self.inner.store, id) else {
            return Err(CoreError::Busy { id: id.to_owned() });
        };

        match cmd {
            Command::StartContainer { .. } => {
                self.mutate_container(cmd, id, Expectation::Running).await
            }
            Command::StopContainer { .. } => {
                self.mutate_container(cmd, id, Expectation::NotRunning).await
            }
            Command::RemoveContainer { .. } => {
                self.mutate_container(cmd, id, Expectation::Absent).await
            }
            Command::RestartContainer { .. } => {
                let stop = Command::StopContainer { id: id.to_owned() };
                let stopped = self.mutate_container(&stop, id, Expectation::NotRunning).await?;
                if matches!(stopped, Convergence::Vanished { .. }) {
                    return Ok(stopped);
                }
                let start = Command::StartContainer { id: id.to_owned() };
                self.mutate_container(&start, id, Expectation::Running).await
            }
            _ => Err(CoreError::Validation {
                message: format!("{} is not a container operation", cmd.operation()),
            }),
        }
    }

    async fn mutate_container(
        &self,
        cmd: &Command,
        id: &str,
        expectation: Expectation,
    ) -> Result<Convergence, CoreError> {
        {
            let _loading = LoadingGuard::new(&self.inner.store, ResourceClass::Containers);
            self.invoke(&cmd.operation(), &cmd.args(), None).await?;
        }
        debug!(id, %expectation, "command accepted, converging");

        let policy = &self.inner.config.convergence;
        let outcome = converge(policy, expectation, || self.probe_container(id)).await;

        match outcome {
            Convergence::Exhausted { attempts } => {
                warn!(id, attempts, %expectation, "container did not converge");
                if policy.warn_on_timeout {
                    self.inner.store.set_error(format!(
                        "Timed out waiting for {id} to be {expectation}"
                    ));
                }
            }
            Convergence::Converged { attempts } | Convergence::Vanished { attempts } => {
                debug!(id, attempts, ?outcome, "container converged");
            }
        }
        Ok(outcome)
    }

    /// Refresh the container list and look up `id` in it.
    ///
    /// A failed refresh is logged but not published: the loop retries.
    async fn probe_container(&self, id: &str) -> Probe {
        if let Err(e) = self.load_containers().await {
            warn!(id, error = %e, "convergence refresh failed");
            return Probe::Unavailable;
        }
        match self.inner.store.container_by_id(id) {
            Some(container) => Probe::Found {
                running: container.is_running(),
            },
            None => Probe::Missing,
        }
    }

    /// Everything that is not a container verb: issue it, then refresh
    /// whatever it affected and announce success.
    async fn runtime_command(&self, cmd: &Command) -> Result<(), CoreError> {
        cmd.validate()?;
        {
            let _loading = LoadingGuard::new(&self.inner.store, cmd.resource());
            self.invoke(&cmd.operation(), &cmd.args(), cmd.stdin())
                .await?;
        }
        info!(operation = %cmd.operation(), "command succeeded");

        match cmd {
            Command::StartSystem | Command::RestartSystem => self.refresh_all().await,
            Command::StopSystem => {
                self.check_system_status().await;
            }
            Command::StartBuilder | Command::StopBuilder | Command::DeleteBuilder => {
                let _ = self.refresh_builders().await;
            }
            Command::RemoveImage { .. } | Command::PullImage { .. } => {
                let _ = self.refresh_images().await;
            }
            Command::CreateDnsDomain { .. }
            | Command::DeleteDnsDomain { .. }
            | Command::SetDefaultDnsDomain { .. } => {
                let _ = self.refresh_dns_domains().await;
            }
            Command::RegistryLogin(_)
            | Command::RegistryLogout { .. }
            | Command::SetDefaultRegistry { .. }
            | Command::UnsetDefaultRegistry => {
                let _ = self.refresh_registries().await;
            }
            Command::SetRecommendedKernel => {
                self.inner
                    .store
                    .set_kernel_config(KernelConfig::recommended(KernelArch::host()));
            }
            Command::SetCustomKernel(req) => {
                self.inner.store.set_kernel_config(req.to_config());
            }
            Command::StartContainer { .. }
            | Command::StopContainer { .. }
            | Command::RestartContainer { .. }
            | Command::RemoveContainer { .. } => {}
        }

        if let Some(message) = cmd.success_message() {
            self.inner.store.set_success(message);
        }
        Ok(())
    }

    // ── Verb shorthands ──────────────────────────────────────────────

    async fn run(&self, cmd: Command) -> Result<(), CoreError> {
        self.execute(cmd).await.map(drop)
    }

    async fn run_container(&self, cmd: Command) -> Result<Convergence, CoreError> {
        self.report(self.container_command(&cmd).await)
    }

    pub async fn start_system(&self) -> Result<(), CoreError> {
        self.run(Command::StartSystem).await
    }

    pub async fn stop_system(&self) -> Result<(), CoreError> {
        self.run(Command::StopSystem).await
    }

    pub async fn restart_system(&self) -> Result<(), CoreError> {
        self.run(Command::RestartSystem).await
    }

    pub async fn start_container(&self, id: impl Into<String>) -> Result<Convergence, CoreError> {
        self.run_container(Command::StartContainer { id: id.into() })
            .await
    }

    pub async fn stop_container(&self, id: impl Into<String>) -> Result<Convergence, CoreError> {
        self.run_container(Command::StopContainer { id: id.into() })
            .await
    }

    /// Stop, wait, start, wait; the id stays busy throughout.
    pub async fn restart_container(
        &self,
        id: impl Into<String>,
    ) -> Result<Convergence, CoreError> {
        self.run_container(Command::RestartContainer { id: id.into() })
            .await
    }

    pub async fn remove_container(&self, id: impl Into<String>) -> Result<Convergence, CoreError> {
        self.run_container(Command::RemoveContainer { id: id.into() })
            .await
    }

    pub async fn start_builder(&self) -> Result<(), CoreError> {
        self.run(Command::StartBuilder).await
    }

    pub async fn stop_builder(&self) -> Result<(), CoreError> {
        self.run(Command::StopBuilder).await
    }

    pub async fn delete_builder(&self) -> Result<(), CoreError> {
        self.run(Command::DeleteBuilder).await
    }

    pub async fn remove_image(&self, reference: impl Into<String>) -> Result<(), CoreError> {
        self.run(Command::RemoveImage {
            reference: reference.into(),
        })
        .await
    }

    pub async fn pull_image(&self, reference: impl Into<String>) -> Result<(), CoreError> {
        self.run(Command::PullImage {
            reference: reference.into(),
        })
        .await
    }

    pub async fn create_dns_domain(&self, domain: impl Into<String>) -> Result<(), CoreError> {
        self.run(Command::CreateDnsDomain {
            domain: domain.into(),
        })
        .await
    }

    pub async fn delete_dns_domain(&self, domain: impl Into<String>) -> Result<(), CoreError> {
        self.run(Command::DeleteDnsDomain {
            domain: domain.into(),
        })
        .await
    }

    pub async fn set_default_dns_domain(
        &self,
        domain: impl Into<String>,
    ) -> Result<(), CoreError> {
        self.run(Command::SetDefaultDnsDomain {
            domain: domain.into(),
        })
        .await
    }

    /// Log in; the password is written to the CLI's stdin.
    pub async fn registry_login(&self, request: RegistryLoginRequest) -> Result<(), CoreError> {
        self.run(Command::RegistryLogin(request)).await
    }

    pub async fn registry_logout(&self, server: impl Into<String>) -> Result<(), CoreError> {
        self.run(Command::RegistryLogout {
            server: server.into(),
        })
        .await
    }

    pub async fn set_default_registry(&self, server: impl Into<String>) -> Result<(), CoreError> {
        self.run(Command::SetDefaultRegistry {
            server: server.into(),
        })
        .await
    }

    pub async fn unset_default_registry(&self) -> Result<(), CoreError> {
        self.run(Command::UnsetDefaultRegistry).await
    }

    pub async fn set_recommended_kernel(&self) -> Result<(), CoreError> {
        self.run(Command::SetRecommendedKernel).await
    }

    pub async fn set_custom_kernel(&self, request: CustomKernelRequest) -> Result<(), CoreError> {
        self.run(Command::SetCustomKernel(request)).await
    }
}

impl Drop for ControllerInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
