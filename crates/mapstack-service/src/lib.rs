//! mapstack-service — deployment-aware supervision of one geodata service.
//!
//! A [`ServiceDriver`] describes a service: where its data lives, how to
//! prepare a deployment and how to launch it. The [`DeploymentMachine`]
//! runs the shared lifecycle on top of any driver, in standalone mode
//! (deployment from static configuration) or managed mode (deployments
//! requested over the control plane).
//!
//! # Components
//!
//! - **`driver`** — the `ServiceDriver` trait and command interpretation
//! - **`services`** — routing, geocoding and tiling drivers
//! - **`machine`** — the deployment state machine

pub mod driver;
pub mod error;
pub mod machine;
pub mod services;

pub use driver::{DeploymentRequest, ServiceDriver};
pub use error::{MachineError, MachineResult};
pub use machine::{DEFAULT_CHANNEL, DeploymentMachine};
pub use services::{
    GeocodingService, GeocodingSettings, RoutingService, RoutingSettings, TilingService,
    TilingSettings,
};
