//! Download → decompress → unpack pipeline.
//!
//! ```text
//!   HTTP body ──► [decompress] ──stdout/stdin──► [extract] ──► files in cwd
//!   (Downloader)   bzip2 -cd                      tar -x
//! ```
//!
//! Both stages are external processes connected by an OS pipe, so memory
//! use stays flat regardless of archive size.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::download::Downloader;
use crate::error::{PrepareError, PrepareResult};

/// Program plus arguments of one pipeline stage.
#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    pub program: String,
    pub args: Vec<String>,
}

impl Stage {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    fn command(&self, cwd: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).current_dir(cwd).kill_on_drop(true);
        cmd
    }

    fn label(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone)]
pub struct ExtractPipeline {
    decompress: Stage,
    extract: Stage,
    cwd: PathBuf,
}

impl ExtractPipeline {
    /// `bzip2 -cd | tar -x`, unpacking into `cwd`.
    pub fn bzip2_tar(cwd: impl Into<PathBuf>) -> Self {
        Self::new(
            Stage::new("bzip2", ["-cd"]),
            Stage::new("tar", ["-x"]),
            cwd,
        )
    }

    pub fn new(decompress: Stage, extract: Stage, cwd: impl Into<PathBuf>) -> Self {
        Self {
            decompress,
            extract,
            cwd: cwd.into(),
        }
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Stream `url` through both stages.
    ///
    /// An HTTP failure is reported as a download error; a stage that fails
    /// to start or exits non-zero is an extraction error.
    pub async fn run(&self, downloader: &Downloader, url: &str) -> PrepareResult<()> {
        tokio::fs::create_dir_all(&self.cwd).await?;
        info!(
            cwd = %self.cwd.display(),
            decompress = %self.decompress.label(),
            extract = %self.extract.label(),
            "starting extraction pipeline"
        );

        let mut decompress = self
            .decompress
            .command(&self.cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| spawn_failed(&self.decompress, e))?;

        let mut feed = decompress
            .stdin
            .take()
            .ok_or_else(|| PrepareError::Extraction("decompress stdin unavailable".into()))?;
        let piped: Stdio = decompress
            .stdout
            .take()
            .ok_or_else(|| PrepareError::Extraction("decompress stdout unavailable".into()))?
            .try_into()
            .map_err(|e: std::io::Error| PrepareError::Extraction(e.to_string()))?;

        let extract = self
            .extract
            .command(&self.cwd)
            .stdin(piped)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| spawn_failed(&self.extract, e))?;

        let decompress_done = tokio::spawn(decompress.wait_with_output());
        let extract_done = tokio::spawn(extract.wait_with_output());

        let fed = downloader.to_writer(url, &mut feed).await;
        // EOF for the decompressor.
        drop(feed);

        let decompress_result = finish(&self.decompress, decompress_done).await;
        let extract_result = finish(&self.extract, extract_done).await;

        match fed {
            Err(e @ PrepareError::Download { .. }) => return Err(e),
            Err(e) => {
                // A write failure usually means a stage died; its exit status says why.
                decompress_result?;
                extract_result?;
                return Err(PrepareError::Extraction(format!("feeding pipeline: {e}")));
            }
            Ok(bytes) => debug!(bytes, "pipeline input complete"),
        }

        decompress_result?;
        extract_result?;
        info!(cwd = %self.cwd.display(), "extraction complete");
        Ok(())
    }
}

fn spawn_failed(stage: &Stage, err: std::io::Error) -> PrepareError {
    PrepareError::Extraction(format!("failed to start {}: {err}", stage.program))
}

async fn finish(
    stage: &Stage,
    handle: JoinHandle<std::io::Result<Output>>,
) -> PrepareResult<()> {
    let output = handle
        .await
        .map_err(|e| PrepareError::Extraction(format!("{} waiter failed: {e}", stage.program)))?
        .map_err(|e| PrepareError::Extraction(format!("{} wait failed: {e}", stage.program)))?;

    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(PrepareError::Extraction(format!(
        "{} exited with {}: {}",
        stage.label(),
        output.status,
        stderr.trim()
    )))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::test_support::{serve, static_file};

    fn shell(script: &str) -> Stage {
        Stage::new("sh", ["-c", script])
    }

    #[tokio::test]
    async fn body_flows_through_both_stages() {
        let base = serve(static_file("/archive.tar.bz2", b"node data".to_vec())).await;
        let dir = tempfile::tempdir().unwrap();

        let pipeline = ExtractPipeline::new(
            Stage::new("cat", Vec::<String>::new()),
            shell("mkdir -p photon_data/node_1 && cat > photon_data/node_1/index"),
            dir.path(),
        );
        pipeline
            .run(&Downloader::new(), &format!("{base}/archive.tar.bz2"))
            .await
            .unwrap();

        let extracted = dir.path().join("photon_data/node_1/index");
        assert_eq!(std::fs::read_to_string(extracted).unwrap(), "node data");
    }

    #[tokio::test]
    async fn failing_stage_is_an_extraction_error() {
        let base = serve(static_file("/archive.tar.bz2", b"corrupt".to_vec())).await;
        let dir = tempfile::tempdir().unwrap();

        let pipeline = ExtractPipeline::new(
            Stage::new("cat", Vec::<String>::new()),
            shell("cat > /dev/null; echo 'not an archive' >&2; exit 2"),
            dir.path(),
        );
        let err = pipeline
            .run(&Downloader::new(), &format!("{base}/archive.tar.bz2"))
            .await
            .unwrap_err();

        match err {
            PrepareError::Extraction(msg) => assert!(msg.contains("not an archive"), "{msg}"),
            other => panic!("expected extraction error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_program_is_an_extraction_error() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = ExtractPipeline::new(
            Stage::new("/nonexistent/bzip2", ["-cd"]),
            Stage::new("tar", ["-x"]),
            dir.path(),
        );
        let err = pipeline
            .run(&Downloader::new(), "http://127.0.0.1:1/never")
            .await
            .unwrap_err();
        assert!(matches!(err, PrepareError::Extraction(_)));
    }

    #[tokio::test]
    async fn http_failure_is_a_download_error() {
        let base = serve(static_file("/other", Vec::new())).await;
        let dir = tempfile::tempdir().unwrap();

        let pipeline = ExtractPipeline::new(
            Stage::new("cat", Vec::<String>::new()),
            shell("cat > /dev/null"),
            dir.path(),
        );
        let err = pipeline
            .run(&Downloader::new(), &format!("{base}/missing.tar.bz2"))
            .await
            .unwrap_err();
        assert!(matches!(err, PrepareError::Download { .. }));
    }

    #[test]
    fn default_pipeline_is_bzip2_then_tar() {
        let pipeline = ExtractPipeline::bzip2_tar("/data");
        assert_eq!(pipeline.decompress.label(), "bzip2 -cd");
        assert_eq!(pipeline.extract.label(), "tar -x");
        assert_eq!(pipeline.cwd(), Path::new("/data"));
    }
}
