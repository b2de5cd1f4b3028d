//! mapstack-prepare — fetch and build the on-disk data for a deployment.
//!
//! ```text
//!   DataPreparer::prepare(deployment)
//!        │
//!        ├─ RoutingPreparer    download .osm.pbf ──► graph import (java)
//!        ├─ GeocodingPreparer  download ──► bzip2 -cd | tar -x
//!        └─ TilingPreparer     planet: download  │  bbox: versatiles convert
//! ```
//!
//! Preparers only touch the data directory. Marker bookkeeping and the
//! non-empty check belong to the caller.

pub mod download;
pub mod error;
pub mod extract;
pub mod geocoding;
pub mod progress;
pub mod routing;
pub mod tiling;

#[cfg(test)]
mod test_support;

use std::io::ErrorKind;
use std::path::Path;

use async_trait::async_trait;

pub use download::Downloader;
pub use error::{PrepareError, PrepareResult};
pub use extract::{ExtractPipeline, Stage};
pub use geocoding::GeocodingPreparer;
pub use progress::{Progress, ProgressThrottle};
pub use routing::{GraphHopper, RoutingPreparer};
pub use tiling::{TilingPreparer, tile_containers};

/// Service-specific data preparation.
#[async_trait]
pub trait DataPreparer: Send + Sync {
    /// Fetch or convert the data for `deployment` into the data directory.
    async fn prepare(&self, deployment: &str) -> PrepareResult<()>;
}

/// Remove a file or directory tree; a missing path is not an error.
pub(crate) async fn remove_path(path: &Path) -> std::io::Result<()> {
    match tokio::fs::symlink_metadata(path).await {
        Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path).await,
        Ok(_) => tokio::fs::remove_file(path).await,
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn remove_path_handles_files_dirs_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("input.osm.pbf");
        let tree = dir.path().join("cache");
        std::fs::write(&file, b"x").unwrap();
        std::fs::create_dir_all(tree.join("nested")).unwrap();
        std::fs::write(tree.join("nested/edges"), b"x").unwrap();

        remove_path(&file).await.unwrap();
        remove_path(&tree).await.unwrap();
        remove_path(&dir.path().join("never-existed")).await.unwrap();

        assert!(!file.exists());
        assert!(!tree.exists());
    }
}
