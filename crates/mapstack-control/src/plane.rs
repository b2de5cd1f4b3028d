//! The control plane seam and the per-service status reporter.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{info, warn};

use mapstack_core::{ServiceStatus, disk_usage_key, status_key};

use crate::command::CommandEnvelope;
use crate::error::ControlResult;

/// Decoded commands arriving on a subscribed channel, in arrival order.
pub type CommandStream = mpsc::Receiver<CommandEnvelope>;

/// Shared key/value state plus a command channel.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Set `key` to `value` in the shared state.
    async fn publish(&self, key: &str, value: &str) -> ControlResult<()>;

    /// Start receiving commands sent on `channel`.
    ///
    /// Malformed payloads never reach the stream. The subscription lives
    /// until the returned stream is dropped.
    async fn subscribe(&self, channel: &str) -> ControlResult<CommandStream>;
}

/// Publishes one service's status and disk usage.
///
/// Detached reporters (standalone mode) only log; publish failures are
/// logged and otherwise ignored.
#[derive(Clone)]
pub struct StatusReporter {
    service: String,
    control: Option<Arc<dyn ControlPlane>>,
}

impl StatusReporter {
    pub fn new(service: impl Into<String>, control: Option<Arc<dyn ControlPlane>>) -> Self {
        Self {
            service: service.into(),
            control,
        }
    }

    /// A reporter without a control plane.
    pub fn detached(service: impl Into<String>) -> Self {
        Self::new(service, None)
    }

    pub fn is_attached(&self) -> bool {
        self.control.is_some()
    }

    pub fn control(&self) -> Option<&Arc<dyn ControlPlane>> {
        self.control.as_ref()
    }

    pub async fn publish_status(&self, status: ServiceStatus) {
        info!(service = %self.service, %status, "status");
        self.publish(&status_key(&self.service), status.as_str())
            .await;
    }

    /// Publish the formatted disk usage; `None` publishes an empty value.
    pub async fn publish_disk_usage(&self, usage: Option<&str>) {
        self.publish(&disk_usage_key(&self.service), usage.unwrap_or(""))
            .await;
    }

    async fn publish(&self, key: &str, value: &str) {
        let Some(control) = &self.control else {
            return;
        };
        if let Err(e) = control.publish(key, value).await {
            warn!(service = %self.service, %key, error = %e, "failed to publish to control plane");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryControlPlane;

    #[tokio::test]
    async fn attached_reporter_writes_service_keys() {
        let plane = MemoryControlPlane::new();
        let reporter = StatusReporter::new("routing", Some(Arc::new(plane.clone())));

        reporter.publish_status(ServiceStatus::Starting).await;
        reporter.publish_disk_usage(Some("1.5 GB")).await;
        reporter.publish_status(ServiceStatus::Online).await;

        assert_eq!(plane.get("routing.status").as_deref(), Some("online"));
        assert_eq!(plane.get("routing.disk_usage").as_deref(), Some("1.5 GB"));
        assert_eq!(plane.history_for("routing.status"), vec!["starting", "online"]);
    }

    #[tokio::test]
    async fn missing_disk_usage_publishes_empty() {
        let plane = MemoryControlPlane::new();
        let reporter = StatusReporter::new("tiling", Some(Arc::new(plane.clone())));

        reporter.publish_disk_usage(None).await;
        assert_eq!(plane.get("tiling.disk_usage").as_deref(), Some(""));
    }

    #[tokio::test]
    async fn detached_reporter_is_silent() {
        let reporter = StatusReporter::detached("geocoding");
        assert!(!reporter.is_attached());
        reporter.publish_status(ServiceStatus::Offline).await;
    }
}
