//! Geocoding: Photon over a per-country index.

use std::path::{Path, PathBuf};

use mapstack_core::SourceTemplate;
use mapstack_prepare::geocoding::archive_root;
use mapstack_prepare::{DataPreparer, GeocodingPreparer, PrepareResult};
use mapstack_supervisor::LaunchSpec;

use crate::driver::ServiceDriver;

pub const SERVICE: &str = "geocoding";
pub const COUNTRY_PLACEHOLDER: &str = "<COUNTRY>";

#[derive(Debug, Clone)]
pub struct GeocodingSettings {
    /// Country code to serve in standalone mode.
    pub country: Option<String>,
    /// Index archive URL with a `<COUNTRY>` placeholder.
    pub download_url: String,
    /// The `photon_data` directory.
    pub data_path: PathBuf,
    pub jar: PathBuf,
    pub java: String,
    pub readiness_pattern: Option<String>,
}

pub struct GeocodingService {
    settings: GeocodingSettings,
    preparer: GeocodingPreparer,
}

impl GeocodingService {
    pub fn new(settings: GeocodingSettings) -> PrepareResult<Self> {
        let source = SourceTemplate::parse(&settings.download_url, COUNTRY_PLACEHOLDER)?;
        let preparer = GeocodingPreparer::new(source, &settings.data_path);
        Ok(Self { settings, preparer })
    }
}

impl ServiceDriver for GeocodingService {
    fn name(&self) -> &str {
        SERVICE
    }

    fn deployment_param(&self) -> &str {
        "country"
    }

    fn expected_deployment(&self) -> Option<&str> {
        self.settings.country.as_deref()
    }

    fn data_path(&self) -> &Path {
        &self.settings.data_path
    }

    fn preparer(&self) -> &dyn DataPreparer {
        &self.preparer
    }

    fn launch_spec(&self) -> LaunchSpec {
        let root = archive_root(&self.settings.data_path);
        LaunchSpec::new(&self.settings.java)
            .args([
                "-jar".to_string(),
                self.settings.jar.display().to_string(),
                "-data-dir".to_string(),
                root.display().to_string(),
            ])
            .current_dir(root)
    }

    fn readiness_pattern(&self) -> Option<&str> {
        self.settings.readiness_pattern.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DeploymentRequest;
    use mapstack_control::CommandEnvelope;

    fn settings(data_path: &Path) -> GeocodingSettings {
        GeocodingSettings {
            country: None,
            download_url: "https://download1.graphhopper.com/public/extracts/by-country-code/<COUNTRY>/photon-db-<COUNTRY>-latest.tar.bz2".into(),
            data_path: data_path.to_path_buf(),
            jar: PathBuf::from("/photon/photon.jar"),
            java: "java".into(),
            readiness_pattern: None,
        }
    }

    #[test]
    fn runs_photon_from_archive_root() {
        let service = GeocodingService::new(settings(Path::new("/photon/photon_data"))).unwrap();
        let spec = service.launch_spec();

        assert_eq!(
            spec.display_line(),
            "java -jar /photon/photon.jar -data-dir /photon"
        );
        assert_eq!(spec.current_dir.as_deref(), Some(Path::new("/photon")));
        assert_eq!(service.expected_deployment(), None);
    }

    #[test]
    fn marker_alone_does_not_make_data_valid() {
        let dir = tempfile::tempdir().unwrap();
        let service = GeocodingService::new(settings(dir.path())).unwrap();
        assert!(!service.is_data_dir_valid());

        std::fs::write(dir.path().join(".mapstack-deployment"), "de").unwrap();
        assert!(!service.is_data_dir_valid());

        std::fs::create_dir(dir.path().join("node_1")).unwrap();
        assert!(service.is_data_dir_valid());
    }

    #[test]
    fn country_commands() {
        let service = GeocodingService::new(settings(Path::new("/photon/photon_data"))).unwrap();
        let cmd = CommandEnvelope::new("geocoding.set-deployment").with_param("country", " de ");
        assert_eq!(service.deployment_request(&cmd), DeploymentRequest::Switch("de".into()));

        let empty = CommandEnvelope::new("geocoding.set-deployment").with_param("country", "");
        assert!(matches!(service.deployment_request(&empty), DeploymentRequest::Invalid(_)));
    }
}
