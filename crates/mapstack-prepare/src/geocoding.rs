//! Geocoding data: a per-country Photon index archive.
//!
//! The archive contains `photon_data/node_1/...`, so it is unpacked in
//! the parent of the data directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use mapstack_core::SourceTemplate;
use tracing::info;

use crate::download::Downloader;
use crate::error::PrepareResult;
use crate::extract::{ExtractPipeline, Stage};
use crate::{DataPreparer, remove_path};

pub const INDEX_DIR: &str = "node_1";

pub struct GeocodingPreparer {
    source: SourceTemplate,
    data_path: PathBuf,
    pipeline: ExtractPipeline,
    downloader: Downloader,
}

impl GeocodingPreparer {
    pub fn new(source: SourceTemplate, data_path: impl Into<PathBuf>) -> Self {
        let data_path = data_path.into();
        let pipeline = ExtractPipeline::bzip2_tar(archive_root(&data_path));
        Self {
            source,
            data_path,
            pipeline,
            downloader: Downloader::new(),
        }
    }

    /// Replace the decompress and unpack stages.
    pub fn with_stages(mut self, decompress: Stage, extract: Stage) -> Self {
        self.pipeline = ExtractPipeline::new(decompress, extract, archive_root(&self.data_path));
        self
    }
}

/// Directory the archive is unpacked in; the geocoder runs from here too.
pub fn archive_root(data_path: &Path) -> PathBuf {
    match data_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[async_trait]
impl DataPreparer for GeocodingPreparer {
    async fn prepare(&self, country: &str) -> PrepareResult<()> {
        let url = self.source.render(country);
        info!(%country, %url, "preparing geocoding data");

        remove_path(&self.data_path.join(INDEX_DIR)).await?;
        tokio::fs::create_dir_all(&self.data_path).await?;

        self.pipeline.run(&self.downloader, &url).await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::PrepareError;
    use crate::test_support::{serve, static_file};

    fn fake_stages() -> (Stage, Stage) {
        (
            Stage::new("cat", Vec::<String>::new()),
            Stage::new(
                "sh",
                ["-c", "mkdir -p photon_data/node_1 && cat > photon_data/node_1/index"],
            ),
        )
    }

    #[test]
    fn archive_root_is_parent() {
        assert_eq!(archive_root(Path::new("/photon/photon_data")), PathBuf::from("/photon"));
        assert_eq!(archive_root(Path::new("photon_data")), PathBuf::from("."));
    }

    #[tokio::test]
    async fn unpacks_country_archive_next_to_data_dir() {
        let base = serve(static_file("/extracts/photon-db-de-latest.tar.bz2", b"index".to_vec())).await;
        let root = tempfile::tempdir().unwrap();
        let data = root.path().join("photon_data");

        // Leftovers from the previous country.
        std::fs::create_dir_all(data.join("node_1")).unwrap();
        std::fs::write(data.join("node_1/old-segment"), b"x").unwrap();

        let source = SourceTemplate::parse(
            &format!("{base}/extracts/photon-db-<COUNTRY>-latest.tar.bz2"),
            "<COUNTRY>",
        )
        .unwrap();
        let (decompress, extract) = fake_stages();
        let preparer = GeocodingPreparer::new(source, &data).with_stages(decompress, extract);

        preparer.prepare("de").await.unwrap();

        assert_eq!(std::fs::read(data.join("node_1/index")).unwrap(), b"index");
        assert!(!data.join("node_1/old-segment").exists());
    }

    #[tokio::test]
    async fn unknown_country_is_a_download_error() {
        let base = serve(static_file("/photon-db-de-latest.tar.bz2", Vec::new())).await;
        let root = tempfile::tempdir().unwrap();

        let source = SourceTemplate::parse(
            &format!("{base}/photon-db-<COUNTRY>-latest.tar.bz2"),
            "<COUNTRY>",
        )
        .unwrap();
        let (decompress, extract) = fake_stages();
        let preparer = GeocodingPreparer::new(source, root.path().join("photon_data"))
            .with_stages(decompress, extract);

        let err = preparer.prepare("xx").await.unwrap_err();
        assert!(matches!(err, PrepareError::Download { .. }), "{err:?}");
    }
}
