//! Streamed HTTP downloads.
//!
//! Bodies are never buffered in memory: chunks go straight to a file or
//! into the stdin of an extraction pipeline.

use std::path::Path;

use futures_util::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use crate::error::{PrepareError, PrepareResult};
use crate::progress::ProgressThrottle;

#[derive(Debug, Clone, Default)]
pub struct Downloader {
    client: reqwest::Client,
}

impl Downloader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Download `url` into `dest`, replacing any existing file.
    ///
    /// A partially written file is removed on failure.
    pub async fn to_file(&self, url: &str, dest: &Path) -> PrepareResult<u64> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let result = async {
            let written = self.to_writer(url, &mut file).await?;
            file.sync_all().await?;
            Ok::<_, PrepareError>(written)
        }
        .await;

        if result.is_err() {
            drop(file);
            if let Err(e) = tokio::fs::remove_file(dest).await {
                debug!(path = %dest.display(), error = %e, "could not remove partial download");
            }
        }
        result
    }

    /// Stream `url` into `writer`. Returns the number of bytes written.
    ///
    /// Redirects are followed; a non-success status is a download error.
    /// Write failures are returned as I/O errors.
    pub async fn to_writer<W>(&self, url: &str, writer: &mut W) -> PrepareResult<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        info!(%url, "downloading");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PrepareError::download(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PrepareError::download(url, format!("HTTP {status}")));
        }

        let mut throttle = ProgressThrottle::new(response.content_length());
        let mut body = response.bytes_stream();

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| PrepareError::download(url, e))?;
            writer.write_all(&chunk).await?;

            if let Some(progress) = throttle.advance(chunk.len() as u64) {
                match progress.percent() {
                    Some(percent) => info!(
                        %url,
                        percent = %format!("{percent:.1}"),
                        downloaded = progress.downloaded,
                        total = progress.total,
                        "download progress"
                    ),
                    None => info!(%url, downloaded = progress.downloaded, "download progress"),
                }
            }
        }
        writer.flush().await?;

        let done = throttle.current();
        info!(%url, bytes = done.downloaded, "download complete");
        Ok(done.downloaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::serve;
    use axum::Router;
    use axum::http::StatusCode;
    use axum::response::Redirect;
    use axum::routing::get;

    fn router() -> Router {
        Router::new()
            .route("/data/de.osm.pbf", get(|| async { "pbf-bytes" }))
            .route(
                "/latest/de.osm.pbf",
                get(|| async { Redirect::temporary("/data/de.osm.pbf") }),
            )
            .route("/broken", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
    }

    #[tokio::test]
    async fn downloads_to_file() {
        let base = serve(router()).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("nested").join("input.osm.pbf");

        let written = Downloader::new()
            .to_file(&format!("{base}/data/de.osm.pbf"), &dest)
            .await
            .unwrap();

        assert_eq!(written, 9);
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "pbf-bytes");
    }

    #[tokio::test]
    async fn follows_redirects() {
        let base = serve(router()).await;
        let mut buf = Vec::new();

        Downloader::new()
            .to_writer(&format!("{base}/latest/de.osm.pbf"), &mut buf)
            .await
            .unwrap();

        assert_eq!(buf, b"pbf-bytes");
    }

    #[tokio::test]
    async fn error_status_is_a_download_error() {
        let base = serve(router()).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.bin");

        let err = Downloader::new()
            .to_file(&format!("{base}/broken"), &dest)
            .await
            .unwrap_err();

        match err {
            PrepareError::Download { reason, .. } => assert!(reason.contains("500"), "{reason}"),
            other => panic!("expected download error, got {other:?}"),
        }
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn unreachable_host_is_a_download_error() {
        let mut buf = Vec::new();
        let err = Downloader::new()
            .to_writer("http://127.0.0.1:1/nothing", &mut buf)
            .await
            .unwrap_err();
        assert!(matches!(err, PrepareError::Download { .. }));
    }
}
