//! Tiling: VersaTiles serving every container in the data directory.

use std::path::{Path, PathBuf};

use mapstack_prepare::{DataPreparer, TilingPreparer, tile_containers};
use mapstack_supervisor::{LaunchSpec, ProcessSupervisor};

use crate::driver::ServiceDriver;

pub const SERVICE: &str = "tiling";

#[derive(Debug, Clone)]
pub struct TilingSettings {
    /// Bounding box (or `planet`) to serve in standalone mode.
    pub bbox: Option<String>,
    /// Full tile container the bounding boxes are cut from.
    pub source_url: String,
    pub data_path: PathBuf,
    pub binary: String,
    pub config: Option<PathBuf>,
    pub output_file: String,
    pub bbox_border: u32,
    pub readiness_pattern: Option<String>,
}

pub struct TilingService {
    settings: TilingSettings,
    preparer: TilingPreparer,
}

impl TilingService {
    pub fn new(settings: TilingSettings, supervisor: ProcessSupervisor) -> Self {
        let preparer = TilingPreparer::new(
            settings.source_url.clone(),
            &settings.data_path,
            settings.output_file.clone(),
            settings.binary.clone(),
            supervisor,
        )
        .with_bbox_border(settings.bbox_border);
        Self { settings, preparer }
    }
}

impl ServiceDriver for TilingService {
    fn name(&self) -> &str {
        SERVICE
    }

    fn deployment_param(&self) -> &str {
        "bbox"
    }

    fn expected_deployment(&self) -> Option<&str> {
        self.settings.bbox.as_deref()
    }

    fn data_path(&self) -> &Path {
        &self.settings.data_path
    }

    fn is_data_dir_valid(&self) -> bool {
        !tile_containers(&self.settings.data_path).is_empty()
    }

    fn preparer(&self) -> &dyn DataPreparer {
        &self.preparer
    }

    fn launch_spec(&self) -> LaunchSpec {
        let mut spec = LaunchSpec::new(&self.settings.binary).arg("serve");
        if let Some(config) = &self.settings.config {
            spec = spec.arg("--config").arg(config.display().to_string());
        }
        spec.args(
            tile_containers(&self.settings.data_path)
                .iter()
                .map(|path| path.display().to_string()),
        )
    }

    fn readiness_pattern(&self) -> Option<&str> {
        self.settings.readiness_pattern.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(data_path: &Path) -> TilingSettings {
        TilingSettings {
            bbox: Some("planet".into()),
            source_url: "https://download.versatiles.org/osm.versatiles".into(),
            data_path: data_path.to_path_buf(),
            binary: "versatiles".into(),
            config: Some(PathBuf::from("/app/config.yml")),
            output_file: "osm.versatiles".into(),
            bbox_border: 3,
            readiness_pattern: Some("listening on".into()),
        }
    }

    #[test]
    fn serves_all_containers() {
        let dir = tempfile::tempdir().unwrap();
        let service = TilingService::new(settings(dir.path()), ProcessSupervisor::new());
        assert!(!service.is_data_dir_valid());

        std::fs::write(dir.path().join("osm.versatiles"), b"x").unwrap();
        std::fs::write(dir.path().join("hillshade.versatiles"), b"x").unwrap();
        std::fs::write(dir.path().join("readme.md"), b"x").unwrap();
        assert!(service.is_data_dir_valid());

        let spec = service.launch_spec();
        assert_eq!(
            spec.args,
            vec![
                "serve".to_string(),
                "--config".to_string(),
                "/app/config.yml".to_string(),
                dir.path().join("hillshade.versatiles").display().to_string(),
                dir.path().join("osm.versatiles").display().to_string(),
            ]
        );
    }

    #[test]
    fn config_is_optional() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = settings(dir.path());
        s.config = None;
        let service = TilingService::new(s, ProcessSupervisor::new());
        assert_eq!(service.launch_spec().display_line(), "versatiles serve");
    }
}
