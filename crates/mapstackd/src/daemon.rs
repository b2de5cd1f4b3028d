//! Wires one service driver to the state machine and runs it until a
//! termination signal arrives or the machine fails.

use std::sync::Arc;

use mapstack_control::{ControlPlane, RedisControlPlane, StatusReporter};
use mapstack_core::ServiceStatus;
use mapstack_service::{
    DeploymentMachine, GeocodingService, RoutingService, ServiceDriver, TilingService,
};
use mapstack_state::MarkerStore;
use mapstack_supervisor::ProcessSupervisor;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::cli::{GlobalArgs, ServiceCommand};

pub async fn run(global: GlobalArgs, service: ServiceCommand) -> anyhow::Result<()> {
    let supervisor = ProcessSupervisor::new().with_stop_timeout(global.stop_timeout());
    let readiness = global.readiness_pattern();

    let driver: Box<dyn ServiceDriver> = match service {
        ServiceCommand::Routing(args) => Box::new(RoutingService::new(
            args.into_settings(readiness),
            supervisor.clone(),
        )?),
        ServiceCommand::Geocoding(args) => {
            Box::new(GeocodingService::new(args.into_settings(readiness))?)
        }
        ServiceCommand::Tiling(args) => Box::new(TilingService::new(
            args.into_settings(readiness),
            supervisor.clone(),
        )),
    };
    let name = driver.name().to_string();

    let control: Option<Arc<dyn ControlPlane>> = match global.control_plane_url()? {
        Some(url) => {
            info!(service = %name, "using control plane");
            Some(Arc::new(RedisControlPlane::new(&url)?))
        }
        None => None,
    };
    let reporter = StatusReporter::new(&name, control);

    let mut machine = DeploymentMachine::new(driver, supervisor.clone(), reporter.clone())
        .with_channel(global.channel.clone());
    if let Some(path) = &global.marker_path {
        machine = machine.with_marker(MarkerStore::new(path));
    }
    info!(
        service = %name,
        marker = %machine.marker().path().display(),
        "mapstackd starting"
    );

    // ── Run until signal or failure ────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handle = tokio::spawn(machine.run(shutdown_rx));

    tokio::select! {
        finished = &mut handle => {
            supervisor.stop_all().await;
            reporter.publish_status(ServiceStatus::Offline).await;
            match finished {
                Ok(Ok(())) => {
                    info!(service = %name, "service machine finished");
                    Ok(())
                }
                Ok(Err(e)) => {
                    error!(service = %name, error = %e, fatal = e.is_fatal(), "service failed");
                    Err(e.into())
                }
                Err(e) => Err(anyhow::Error::new(e).context("service task panicked")),
            }
        }
        _ = shutdown_signal() => {
            info!(service = %name, "shutdown signal received");
            let _ = shutdown_tx.send(true);

            match tokio::time::timeout(global.shutdown_grace(), &mut handle).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => warn!(service = %name, error = %e, "service failed while stopping"),
                Ok(Err(e)) => warn!(service = %name, error = %e, "service task panicked"),
                Err(_) => {
                    warn!(
                        service = %name,
                        grace_secs = global.shutdown_grace_secs,
                        "service still busy, abandoning"
                    );
                    handle.abort();
                }
            }

            supervisor.stop_all().await;
            reporter.publish_status(ServiceStatus::Offline).await;
            info!(service = %name, "mapstackd stopped");
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        tokio::select! {
            _ = ctrl_c() => {},
            _ = terminate() => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c().await;
    }
}

async fn ctrl_c() {
    if let Err(err) = signal::ctrl_c().await {
        warn!(?err, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            term.recv().await;
        }
        Err(err) => {
            warn!(?err, "failed to install SIGTERM handler");
            std::future::pending::<()>().await;
        }
    }
}
