//! mapstack-supervisor — supervision of external service processes.
//!
//! The [`ProcessSupervisor`] owns an explicit registry of running
//! processes keyed by identifier. Each launch returns a stream of
//! [`ProcessEvent`]s that the caller consumes sequentially.
//!
//! # Architecture
//!
//! ```text
//! ProcessSupervisor
//!   ├── registry: id → slot (pid, readiness flag, exit signal)
//!   └── per-process tasks
//!       ├── stdout / stderr forwarders → tracing, readiness matching
//!       └── waiter → remove from registry, emit Exited, wake stop()
//! ```
//!
//! Readiness is a one-shot transition: the first output line containing
//! the configured pattern emits [`ProcessEvent::Ready`], later matches are
//! ignored. Every exit, graceful or not, emits exactly one
//! [`ProcessEvent::Exited`] after the process has left the registry, so
//! `stop(id)` followed by `launch(id, ..)` never collides.

pub mod error;
mod output;
pub mod process;
pub mod supervisor;

pub use error::{SupervisorError, SupervisorResult};
pub use process::{ExitInfo, LaunchOptions, LaunchSpec, ProcessEvent, ProcessEvents, ProcessState};
pub use supervisor::ProcessSupervisor;
