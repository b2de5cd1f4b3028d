//! DeploymentMachine — sequences stop → prepare → mark → start for one service.
//!
//! ```text
//!               ┌──────────── set-deployment ────────────┐
//!               ▼                                        │
//!  Offline ──start──► Starting ──Ready──► Online ──Exited/stop──► Offline
//!               ▲                                        │
//!               └──────────── Exited (crash) ────────────┘
//! ```
//!
//! The machine is a single task. Process events, control-plane commands
//! and the shutdown signal are multiplexed in one loop and handled one at
//! a time, so two deployment switches never interleave: a command that
//! arrives during a switch waits in the channel until the switch is done.

use std::sync::Arc;

use mapstack_control::{CommandEnvelope, CommandStream, ControlPlane, StatusReporter};
use mapstack_core::ServiceStatus;
use mapstack_prepare::PrepareError;
use mapstack_state::{MarkerStore, disk_usage};
use mapstack_supervisor::{
    LaunchOptions, ProcessEvent, ProcessEvents, ProcessSupervisor, SupervisorError,
};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::driver::{DeploymentRequest, ServiceDriver};
use crate::error::MachineResult;

/// Default command channel.
pub const DEFAULT_CHANNEL: &str = "mapstack";

/// One step of the main loop.
enum Step {
    Shutdown,
    Process(Option<ProcessEvent>),
    Command(Option<CommandEnvelope>),
}

pub struct DeploymentMachine {
    driver: Box<dyn ServiceDriver>,
    supervisor: ProcessSupervisor,
    marker: MarkerStore,
    reporter: StatusReporter,
    channel: String,
    status: ServiceStatus,
    status_tx: watch::Sender<ServiceStatus>,
    events: Option<ProcessEvents>,
}

impl DeploymentMachine {
    /// The marker defaults to a dot-file inside the driver's data directory.
    pub fn new(
        driver: Box<dyn ServiceDriver>,
        supervisor: ProcessSupervisor,
        reporter: StatusReporter,
    ) -> Self {
        let marker = MarkerStore::in_data_dir(driver.data_path());
        let (status_tx, _) = watch::channel(ServiceStatus::Offline);
        Self {
            driver,
            supervisor,
            marker,
            reporter,
            channel: DEFAULT_CHANNEL.to_string(),
            status: ServiceStatus::Offline,
            status_tx,
            events: None,
        }
    }

    pub fn with_marker(mut self, marker: MarkerStore) -> Self {
        self.marker = marker;
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    pub fn name(&self) -> &str {
        self.driver.name()
    }

    pub fn status(&self) -> ServiceStatus {
        self.status
    }

    /// Follow status transitions, including in standalone mode.
    pub fn subscribe_status(&self) -> watch::Receiver<ServiceStatus> {
        self.status_tx.subscribe()
    }

    pub fn marker(&self) -> &MarkerStore {
        &self.marker
    }

    /// Run until `shutdown` flips to true (or its sender is dropped).
    ///
    /// Managed mode is used when the reporter has a control plane. Errors
    /// returned from here are fatal for the process.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> MachineResult<()> {
        let mut commands = match self.reporter.control().cloned() {
            Some(control) => {
                info!(service = %self.name(), channel = %self.channel, "running in managed mode");
                Some(self.init_managed(control).await?)
            }
            None => {
                info!(service = %self.name(), "running in standalone mode");
                self.init_standalone().await?;
                None
            }
        };

        loop {
            if *shutdown.borrow() {
                break;
            }

            let step = tokio::select! {
                _ = shutdown.changed() => Step::Shutdown,
                event = next_event(&mut self.events) => Step::Process(event),
                cmd = next_command(&mut commands) => Step::Command(cmd),
            };

            match step {
                Step::Shutdown => break,
                Step::Process(Some(event)) => self.handle_event(event).await,
                Step::Process(None) => self.events = None,
                Step::Command(Some(cmd)) => self.handle_command(cmd).await?,
                Step::Command(None) => {
                    warn!(service = %self.name(), "command stream closed");
                    commands = None;
                }
            }
        }

        info!(service = %self.name(), "shutting down");
        if let Err(e) = self.stop().await {
            warn!(service = %self.name(), error = %e, "failed to stop service");
        }
        Ok(())
    }

    // ── Initialization ──────────────────────────────────────────

    async fn init_standalone(&mut self) -> MachineResult<()> {
        let valid = self.driver.is_data_dir_valid();
        let expected = self.driver.expected_deployment().map(str::to_string);

        match (valid, expected) {
            (true, None) => {
                info!(service = %self.name(), "data directory valid, no deployment configured");
            }
            (true, Some(deployment)) => {
                if self.marker.matches(&deployment)? {
                    info!(service = %self.name(), %deployment, "deployment up to date");
                } else {
                    info!(
                        service = %self.name(),
                        %deployment,
                        current = ?self.marker.get()?,
                        "deployment changed, preparing"
                    );
                    self.prepare_deployment(&deployment).await?;
                }
            }
            (false, Some(deployment)) => {
                info!(service = %self.name(), %deployment, "no data yet, preparing");
                self.prepare_deployment(&deployment).await?;
            }
            (false, None) => {
                error!(
                    service = %self.name(),
                    path = %self.driver.data_path().display(),
                    "no data and no deployment configured"
                );
                return Err(PrepareError::DataDirEmpty(self.driver.data_path().to_path_buf()).into());
            }
        }

        self.start().await
    }

    async fn init_managed(&mut self, control: Arc<dyn ControlPlane>) -> MachineResult<CommandStream> {
        self.set_status(ServiceStatus::Offline).await;
        self.publish_disk_usage().await;

        let commands = control.subscribe(&self.channel).await?;

        if self.driver.is_data_dir_valid() {
            info!(
                service = %self.name(),
                deployment = ?self.marker.get()?,
                "data directory valid, starting before any command"
            );
            if let Err(e) = self.start().await {
                error!(service = %self.name(), error = %e, "failed to start service");
            }
        } else {
            info!(service = %self.name(), "no data yet, waiting for a deployment command");
        }

        Ok(commands)
    }

    // ── Commands ────────────────────────────────────────────────

    async fn handle_command(&mut self, cmd: CommandEnvelope) -> MachineResult<()> {
        match self.driver.deployment_request(&cmd) {
            DeploymentRequest::Ignored => {
                debug!(service = %self.name(), cmd = %cmd.cmd, "command for another service");
                Ok(())
            }
            DeploymentRequest::Invalid(reason) => {
                warn!(service = %self.name(), %reason, "ignoring command");
                Ok(())
            }
            DeploymentRequest::Switch(deployment) => {
                match self.switch_deployment(&deployment).await {
                    Ok(()) => Ok(()),
                    Err(e) if e.is_fatal() => Err(e),
                    Err(e) => {
                        error!(service = %self.name(), %deployment, error = %e, "deployment switch failed");
                        self.set_status(ServiceStatus::Offline).await;
                        Ok(())
                    }
                }
            }
        }
    }

    /// Stop, prepare `deployment`, start.
    pub async fn switch_deployment(&mut self, deployment: &str) -> MachineResult<()> {
        info!(service = %self.name(), %deployment, "switching deployment");

        self.stop().await?;
        self.set_status(ServiceStatus::Starting).await;
        self.prepare_deployment(deployment).await?;
        self.start().await
    }

    /// Replace the data directory contents with `deployment`.
    ///
    /// The marker is cleared first and written only once the directory is
    /// known to hold data, so an interrupted preparation leaves no marker.
    pub async fn prepare_deployment(&mut self, deployment: &str) -> MachineResult<()> {
        self.marker.clear()?;

        info!(service = %self.name(), %deployment, "preparing deployment");
        self.driver.preparer().prepare(deployment).await?;

        if !self.driver.is_data_dir_valid() {
            let path = self.driver.data_path().to_path_buf();
            error!(
                service = %self.name(),
                %deployment,
                path = %path.display(),
                "preparation finished but data directory is still empty"
            );
            return Err(PrepareError::DataDirEmpty(path).into());
        }

        self.marker.set(deployment)?;
        info!(service = %self.name(), %deployment, "deployment prepared");
        self.publish_disk_usage().await;
        Ok(())
    }

    // ── Process lifecycle ───────────────────────────────────────

    /// Launch the service process.
    pub async fn start(&mut self) -> MachineResult<()> {
        if self.status != ServiceStatus::Starting {
            self.set_status(ServiceStatus::Starting).await;
        }

        let spec = self.driver.launch_spec();
        let options = LaunchOptions {
            readiness_pattern: self.driver.readiness_pattern().map(str::to_string),
        };

        match self.supervisor.launch(self.driver.name(), &spec, options).await {
            Ok(events) => {
                self.events = Some(events);
                Ok(())
            }
            Err(SupervisorError::AlreadyRunning(id)) => {
                warn!(service = %self.name(), process = %id, "service already running");
                Ok(())
            }
            Err(e) => {
                self.set_status(ServiceStatus::Offline).await;
                Err(e.into())
            }
        }
    }

    /// Stop the service process and wait for its exit.
    pub async fn stop(&mut self) -> MachineResult<()> {
        if let Some(mut events) = self.events.take() {
            self.supervisor.stop(self.driver.name()).await?;
            while let Ok(event) = events.try_recv() {
                if let ProcessEvent::Exited(exit) = event {
                    info!(service = %self.name(), %exit, "service stopped");
                }
            }
        }

        if self.status != ServiceStatus::Offline {
            self.set_status(ServiceStatus::Offline).await;
        }
        Ok(())
    }

    async fn handle_event(&mut self, event: ProcessEvent) {
        match event {
            ProcessEvent::Ready => {
                info!(service = %self.name(), "service ready");
                self.set_status(ServiceStatus::Online).await;
            }
            ProcessEvent::Exited(exit) => {
                self.events = None;
                if exit.success() {
                    info!(service = %self.name(), %exit, "service exited");
                } else {
                    warn!(service = %self.name(), %exit, "service exited unexpectedly");
                }
                self.set_status(ServiceStatus::Offline).await;
            }
        }
    }

    // ── Status ──────────────────────────────────────────────────

    async fn set_status(&mut self, status: ServiceStatus) {
        self.status = status;
        self.status_tx.send_replace(status);
        self.reporter.publish_status(status).await;
    }

    async fn publish_disk_usage(&self) {
        if !self.reporter.is_attached() {
            return;
        }
        match disk_usage(self.driver.data_path()) {
            Ok(usage) => self.reporter.publish_disk_usage(usage.as_deref()).await,
            Err(e) => warn!(service = %self.name(), error = %e, "failed to compute disk usage"),
        }
    }
}

async fn next_event(events: &mut Option<ProcessEvents>) -> Option<ProcessEvent> {
    match events {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_command(commands: &mut Option<CommandStream>) -> Option<CommandEnvelope> {
    match commands {
        Some(commands) => commands.recv().await,
        None => std::future::pending().await,
    }
}
