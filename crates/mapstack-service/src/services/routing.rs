//! Routing: GraphHopper over an imported OSM region.

use std::path::{Path, PathBuf};

use mapstack_core::SourceTemplate;
use mapstack_prepare::{DataPreparer, GraphHopper, PrepareResult, RoutingPreparer};
use mapstack_state::is_dir_populated;
use mapstack_supervisor::{LaunchSpec, ProcessSupervisor};

use crate::driver::ServiceDriver;

pub const SERVICE: &str = "routing";
pub const REGION_PLACEHOLDER: &str = "<REGION>";

#[derive(Debug, Clone)]
pub struct RoutingSettings {
    /// Region to serve in standalone mode (e.g. `europe/germany`).
    pub region: Option<String>,
    /// Extract URL with a `<REGION>` placeholder.
    pub download_url: String,
    pub data_path: PathBuf,
    pub jar: PathBuf,
    pub config: PathBuf,
    pub java: String,
    pub import_heap: String,
    pub server_heap: String,
    pub readiness_pattern: Option<String>,
}

pub struct RoutingService {
    settings: RoutingSettings,
    graphhopper: GraphHopper,
    preparer: RoutingPreparer,
}

impl RoutingService {
    pub fn new(settings: RoutingSettings, supervisor: ProcessSupervisor) -> PrepareResult<Self> {
        let source = SourceTemplate::parse(&settings.download_url, REGION_PLACEHOLDER)?;
        let graphhopper = GraphHopper {
            java: settings.java.clone(),
            jar: settings.jar.clone(),
            config: settings.config.clone(),
            import_heap: settings.import_heap.clone(),
            server_heap: settings.server_heap.clone(),
        };
        let preparer = RoutingPreparer::new(
            source,
            &settings.data_path,
            graphhopper.clone(),
            supervisor,
        );
        Ok(Self {
            settings,
            graphhopper,
            preparer,
        })
    }

    fn cache_dir(&self) -> PathBuf {
        GraphHopper::cache_dir(&self.settings.data_path)
    }
}

impl ServiceDriver for RoutingService {
    fn name(&self) -> &str {
        SERVICE
    }

    fn deployment_param(&self) -> &str {
        "region"
    }

    fn expected_deployment(&self) -> Option<&str> {
        self.settings.region.as_deref()
    }

    fn data_path(&self) -> &Path {
        &self.settings.data_path
    }

    /// The graph cache, not the raw extract, is what the server needs.
    fn is_data_dir_valid(&self) -> bool {
        is_dir_populated(&self.cache_dir())
    }

    fn preparer(&self) -> &dyn DataPreparer {
        &self.preparer
    }

    fn launch_spec(&self) -> LaunchSpec {
        self.graphhopper.server_spec(&self.cache_dir())
    }

    fn readiness_pattern(&self) -> Option<&str> {
        self.settings.readiness_pattern.as_deref()
    }
}
