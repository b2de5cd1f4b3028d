//! mapstack-state — on-disk state of a service's data directory.
//!
//! Two things live here:
//!
//! - [`MarkerStore`]: the single persisted record of which deployment the
//!   data directory currently holds. It is cleared before a preparation
//!   starts and written only after the preparation succeeded, so a marker
//!   equal to `D` always means the directory holds valid data for `D`.
//! - [`disk`]: data-directory validity and disk-usage helpers.

pub mod disk;
pub mod error;
pub mod marker;

pub use disk::{dir_size, disk_usage, format_bytes, is_dir_populated};
pub use error::{StateError, StateResult};
pub use marker::{MarkerStore, DEFAULT_MARKER_FILE};
