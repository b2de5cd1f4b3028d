//! Tiling data: VersaTiles containers.
//!
//! The full dataset is downloaded as-is; any other deployment is a
//! bounding box cut out of the source with `versatiles convert`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use mapstack_core::FULL_DATASET;
use mapstack_supervisor::{LaunchSpec, ProcessSupervisor};
use tracing::{debug, info};

use crate::download::Downloader;
use crate::error::{PrepareError, PrepareResult};
use crate::{DataPreparer, remove_path};

pub const CONTAINER_EXTENSION: &str = "versatiles";

const CONVERT_PROCESS_ID: &str = "versatiles-convert";

pub struct TilingPreparer {
    source: String,
    data_path: PathBuf,
    output_file: String,
    binary: String,
    bbox_border: u32,
    supervisor: ProcessSupervisor,
    downloader: Downloader,
}

impl TilingPreparer {
    pub fn new(
        source: impl Into<String>,
        data_path: impl Into<PathBuf>,
        output_file: impl Into<String>,
        binary: impl Into<String>,
        supervisor: ProcessSupervisor,
    ) -> Self {
        Self {
            source: source.into(),
            data_path: data_path.into(),
            output_file: output_file.into(),
            binary: binary.into(),
            bbox_border: 3,
            supervisor,
            downloader: Downloader::new(),
        }
    }

    /// Tiles of border added around the bounding box.
    pub fn with_bbox_border(mut self, border: u32) -> Self {
        self.bbox_border = border;
        self
    }

    pub fn output_path(&self) -> PathBuf {
        self.data_path.join(&self.output_file)
    }

    pub fn convert_spec(&self, bbox: &str) -> LaunchSpec {
        LaunchSpec::new(&self.binary).args([
            "convert".to_string(),
            "--bbox-border".to_string(),
            self.bbox_border.to_string(),
            "--bbox".to_string(),
            bbox.to_string(),
            self.source.clone(),
            self.output_path().display().to_string(),
        ])
    }

    async fn convert(&self, bbox: &str) -> PrepareResult<()> {
        let spec = self.convert_spec(bbox);
        let exit = self
            .supervisor
            .run_to_completion(CONVERT_PROCESS_ID, &spec)
            .await?;
        if !exit.success() {
            return Err(PrepareError::Conversion(format!(
                "versatiles convert exited with {exit}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl DataPreparer for TilingPreparer {
    async fn prepare(&self, deployment: &str) -> PrepareResult<()> {
        let output = self.output_path();
        info!(%deployment, source = %self.source, output = %output.display(), "preparing tiles");

        tokio::fs::create_dir_all(&self.data_path).await?;
        remove_path(&output).await?;

        if deployment == FULL_DATASET {
            self.downloader.to_file(&self.source, &output).await?;
            Ok(())
        } else {
            self.convert(deployment).await
        }
    }
}

/// All tile containers in `data_path`, sorted. A missing directory has none.
pub fn tile_containers(data_path: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(data_path) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(path = %data_path.display(), error = %e, "tile directory not readable");
            return Vec::new();
        }
    };

    let mut containers: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext == CONTAINER_EXTENSION)
        })
        .collect();
    containers.sort();
    containers
}
