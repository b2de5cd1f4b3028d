//! Shared types used across mapstack crates.

use std::fmt;

/// Deployment value that selects the full dataset instead of a subset.
pub const FULL_DATASET: &str = "planet";

const SET_DEPLOYMENT_ACTION: &str = "set-deployment";

/// Runtime status of a service, as published to the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceStatus {
    /// Launch attempted (or data preparation in progress).
    Starting,
    /// The readiness marker was seen in the process output.
    Online,
    /// No process running: never started, stopped, or crashed.
    Offline,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Starting => "starting",
            ServiceStatus::Online => "online",
            ServiceStatus::Offline => "offline",
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared-state key holding a service's status.
pub fn status_key(service: &str) -> String {
    format!("{service}.status")
}

/// Shared-state key holding a service's human-readable disk usage.
pub fn disk_usage_key(service: &str) -> String {
    format!("{service}.disk_usage")
}

/// Command tag a service listens for to switch deployments.
pub fn set_deployment_tag(service: &str) -> String {
    format!("{service}.{SET_DEPLOYMENT_ACTION}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_displays_lowercase() {
        assert_eq!(ServiceStatus::Online.to_string(), "online");
        assert_eq!(ServiceStatus::Starting.as_str(), "starting");
        assert_eq!(ServiceStatus::Offline.as_str(), "offline");
    }

    #[test]
    fn key_naming() {
        assert_eq!(status_key("routing"), "routing.status");
        assert_eq!(disk_usage_key("tiling"), "tiling.disk_usage");
        assert_eq!(set_deployment_tag("geocoding"), "geocoding.set-deployment");
    }
}
