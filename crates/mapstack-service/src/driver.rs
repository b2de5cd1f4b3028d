//! The per-service seam of the deployment state machine.

use std::path::Path;

use mapstack_control::CommandEnvelope;
use mapstack_core::set_deployment_tag;
use mapstack_prepare::DataPreparer;
use mapstack_state::is_dir_populated;
use mapstack_supervisor::LaunchSpec;

/// What a command on the shared channel means for one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentRequest {
    /// Addressed to another service.
    Ignored,
    /// Addressed to this service but unusable.
    Invalid(String),
    /// Switch to the given deployment.
    Switch(String),
}

/// Everything the state machine needs to know about one service.
pub trait ServiceDriver: Send + Sync {
    /// Service name; also the command tag prefix and status key prefix.
    fn name(&self) -> &str;

    /// Payload field carrying the deployment in `set-deployment` commands.
    fn deployment_param(&self) -> &str;

    /// Deployment declared by static configuration, if any.
    fn expected_deployment(&self) -> Option<&str>;

    fn data_path(&self) -> &Path;

    /// Whether the data directory holds data the service can run on.
    fn is_data_dir_valid(&self) -> bool {
        is_dir_populated(self.data_path())
    }

    fn preparer(&self) -> &dyn DataPreparer;

    /// Command line of the service process. Called at every start.
    fn launch_spec(&self) -> LaunchSpec;

    /// Output substring that marks the process as ready.
    fn readiness_pattern(&self) -> Option<&str>;

    /// Interpret a command from the shared channel.
    fn deployment_request(&self, cmd: &CommandEnvelope) -> DeploymentRequest {
        if !cmd.is_for(self.name()) {
            return DeploymentRequest::Ignored;
        }
        if cmd.cmd != set_deployment_tag(self.name()) {
            return DeploymentRequest::Invalid(format!("unsupported command {}", cmd.cmd));
        }
        match cmd.param(self.deployment_param()).map(str::trim) {
            Some(deployment) if !deployment.is_empty() => {
                DeploymentRequest::Switch(deployment.to_string())
            }
            _ => DeploymentRequest::Invalid(format!(
                "{} without a `{}` field",
                cmd.cmd,
                self.deployment_param()
            )),
        }
    }
}
