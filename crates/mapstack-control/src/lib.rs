//! mapstack-control — the control plane as seen by one service.
//!
//! The control plane is shared infrastructure: a key/value cache of
//! service status and disk usage, and a pub/sub channel carrying JSON
//! commands tagged `<service>.<action>`. A service only ever publishes
//! its own keys and acts on commands carrying its own tag.
//!
//! Transports implement [`ControlPlane`]:
//!
//! - [`RedisControlPlane`]: `SET` + `SUBSCRIBE`, reconnecting forever with
//!   a fixed delay. Publishing never waits on the network, so an
//!   unreachable control plane neither blocks nor fails the service.
//! - [`MemoryControlPlane`]: in-process, for tests and embedding.
//!
//! Payloads that are not valid JSON commands are logged and dropped
//! inside the transport; subscribers only ever see [`CommandEnvelope`]s.

pub mod command;
pub mod error;
pub mod memory;
pub mod plane;
pub mod redis;

pub use command::CommandEnvelope;
pub use error::{ControlError, ControlResult};
pub use memory::MemoryControlPlane;
pub use plane::{CommandStream, ControlPlane, StatusReporter};
pub use crate::redis::{RedisControlPlane, RedisControlPlaneBuilder};
