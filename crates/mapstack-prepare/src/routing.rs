//! Routing data: an OSM extract imported into a GraphHopper graph cache.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use mapstack_core::SourceTemplate;
use mapstack_supervisor::{LaunchSpec, ProcessSupervisor};
use tracing::info;

use crate::download::Downloader;
use crate::error::{PrepareError, PrepareResult};
use crate::{DataPreparer, remove_path};

pub const INPUT_FILE: &str = "input.osm.pbf";
pub const CACHE_DIR: &str = "cache";

const IMPORT_PROCESS_ID: &str = "graphhopper-import";

/// How to invoke the GraphHopper jar.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphHopper {
    pub java: String,
    pub jar: PathBuf,
    pub config: PathBuf,
    pub import_heap: String,
    pub server_heap: String,
}

impl GraphHopper {
    /// Graph cache location under `data_path`.
    pub fn cache_dir(data_path: &Path) -> PathBuf {
        data_path.join(CACHE_DIR)
    }

    pub fn import_spec(&self, pbf: &Path, cache: &Path) -> LaunchSpec {
        LaunchSpec::new(&self.java).args([
            format!("-Xmx{}", self.import_heap),
            format!("-Xms{}", self.import_heap),
            format!("-Ddw.graphhopper.datareader.file={}", pbf.display()),
            format!("-Ddw.graphhopper.graph.location={}", cache.display()),
            "-jar".to_string(),
            self.jar.display().to_string(),
            "import".to_string(),
            self.config.display().to_string(),
        ])
    }

    pub fn server_spec(&self, cache: &Path) -> LaunchSpec {
        LaunchSpec::new(&self.java).args([
            format!("-Xmx{}", self.server_heap),
            format!("-Ddw.graphhopper.graph.location={}", cache.display()),
            "-jar".to_string(),
            self.jar.display().to_string(),
            "server".to_string(),
            self.config.display().to_string(),
        ])
    }
}

pub struct RoutingPreparer {
    source: SourceTemplate,
    data_path: PathBuf,
    graphhopper: GraphHopper,
    supervisor: ProcessSupervisor,
    downloader: Downloader,
}

impl RoutingPreparer {
    pub fn new(
        source: SourceTemplate,
        data_path: impl Into<PathBuf>,
        graphhopper: GraphHopper,
        supervisor: ProcessSupervisor,
    ) -> Self {
        Self {
            source,
            data_path: data_path.into(),
            graphhopper,
            supervisor,
            downloader: Downloader::new(),
        }
    }

    async fn import(&self, pbf: &Path, cache: &Path) -> PrepareResult<()> {
        info!(pbf = %pbf.display(), cache = %cache.display(), "importing graph");

        let spec = self.graphhopper.import_spec(pbf, cache);
        let exit = self
            .supervisor
            .run_to_completion(IMPORT_PROCESS_ID, &spec)
            .await?;
        if !exit.success() {
            return Err(PrepareError::Conversion(format!(
                "graph import exited with {exit}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl DataPreparer for RoutingPreparer {
    async fn prepare(&self, region: &str) -> PrepareResult<()> {
        let pbf = self.data_path.join(INPUT_FILE);
        let cache = GraphHopper::cache_dir(&self.data_path);
        let url = self.source.render(region);

        info!(%region, %url, "preparing routing data");

        remove_path(&pbf).await?;
        self.downloader.to_file(&url, &pbf).await?;

        remove_path(&cache).await?;
        tokio::fs::create_dir_all(&cache).await?;
        self.import(&pbf, &cache).await
    }
}
