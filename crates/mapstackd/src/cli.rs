//! Command-line flags. Every flag falls back to the environment variable
//! the service containers are configured with.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use mapstack_service::{GeocodingSettings, RoutingSettings, TilingSettings};

#[derive(Parser)]
#[command(name = "mapstackd", about = "Deployment-aware supervisor for mapstack services", version)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub service: ServiceCommand,
}

#[derive(Args)]
pub struct GlobalArgs {
    /// Take deployments from the control plane instead of static configuration.
    #[arg(long, env = "MANAGED")]
    pub managed: bool,

    /// Control plane (Redis/Valkey) URL, required in managed mode.
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,

    /// Command channel shared by all services.
    #[arg(long, env = "MAPSTACK_CHANNEL", default_value = "mapstack")]
    pub channel: String,

    /// Output substring that marks the service as ready.
    #[arg(long, env = "LOG_READY_MATCH")]
    pub ready_match: Option<String>,

    /// Deployment marker file. Defaults to a dot-file in the data directory.
    #[arg(long, env = "DEPLOYMENT_MARKER_PATH")]
    pub marker_path: Option<PathBuf>,

    /// Seconds between SIGTERM and SIGKILL when stopping the service.
    #[arg(long, env = "STOP_TIMEOUT_SECS", default_value = "30")]
    pub stop_timeout_secs: u64,

    /// Seconds a busy preparation gets to wind down on shutdown.
    #[arg(long, env = "SHUTDOWN_GRACE_SECS", default_value = "10")]
    pub shutdown_grace_secs: u64,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl GlobalArgs {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn readiness_pattern(&self) -> Option<String> {
        non_empty(self.ready_match.clone())
    }

    /// Control plane URL in managed mode, `None` in standalone mode.
    pub fn control_plane_url(&self) -> anyhow::Result<Option<String>> {
        if !self.managed {
            return Ok(None);
        }
        match non_empty(self.redis_url.clone()) {
            Some(url) => Ok(Some(url)),
            None => anyhow::bail!("REDIS_URL is required in managed mode"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum ServiceCommand {
    /// Routing engine (GraphHopper).
    Routing(RoutingArgs),
    /// Geocoder (Photon).
    Geocoding(GeocodingArgs),
    /// Tile server (VersaTiles).
    Tiling(TilingArgs),
}

#[derive(Args)]
pub struct RoutingArgs {
    /// Region to serve in standalone mode, e.g. `europe/germany`.
    #[arg(long, env = "REGION")]
    pub region: Option<String>,

    /// Extract URL; `<REGION>` is replaced with the region.
    #[arg(long, env = "REGION_DOWNLOAD_URL")]
    pub download_url: String,

    #[arg(long, env = "GH_DATA_PATH")]
    pub data_path: PathBuf,

    /// GraphHopper web jar.
    #[arg(long, env = "GH_BINARY_PATH")]
    pub jar: PathBuf,

    #[arg(long, env = "GH_CONFIG_PATH")]
    pub config: PathBuf,

    #[arg(long, env = "JAVA_BIN", default_value = "java")]
    pub java: String,

    /// JVM heap of the graph import.
    #[arg(long, env = "GH_IMPORT_HEAP", default_value = "4g")]
    pub import_heap: String,

    /// JVM heap of the routing server.
    #[arg(long, env = "GH_SERVER_HEAP", default_value = "2g")]
    pub server_heap: String,
}

impl RoutingArgs {
    pub fn into_settings(self, readiness_pattern: Option<String>) -> RoutingSettings {
        RoutingSettings {
            region: non_empty(self.region),
            download_url: self.download_url,
            data_path: self.data_path,
            jar: self.jar,
            config: self.config,
            java: self.java,
            import_heap: self.import_heap,
            server_heap: self.server_heap,
            readiness_pattern,
        }
    }
}

#[derive(Args)]
pub struct GeocodingArgs {
    /// Country code to serve in standalone mode.
    #[arg(long, env = "COUNTRY")]
    pub country: Option<String>,

    /// Index archive URL; `<COUNTRY>` is replaced with the country code.
    #[arg(long, env = "COUNTRY_DOWNLOAD_URL")]
    pub download_url: String,

    /// The `photon_data` directory.
    #[arg(long, env = "PHOTON_DATA_PATH")]
    pub data_path: PathBuf,

    #[arg(long, env = "PHOTON_JAR", default_value = "photon.jar")]
    pub jar: PathBuf,

    #[arg(long, env = "JAVA_BIN", default_value = "java")]
    pub java: String,
}

impl GeocodingArgs {
    pub fn into_settings(self, readiness_pattern: Option<String>) -> GeocodingSettings {
        GeocodingSettings {
            country: non_empty(self.country),
            download_url: self.download_url,
            data_path: self.data_path,
            jar: self.jar,
            java: self.java,
            readiness_pattern,
        }
    }
}

#[derive(Args)]
pub struct TilingArgs {
    /// Bounding box (`west,south,east,north`) or `planet` for standalone mode.
    #[arg(long, env = "BBOX")]
    pub bbox: Option<String>,

    /// Full tile container bounding boxes are cut from.
    #[arg(long, env = "VT_SOURCE_URL")]
    pub source_url: String,

    #[arg(long, env = "VT_DATA_PATH")]
    pub data_path: PathBuf,

    #[arg(long, env = "VT_BINARY_PATH", default_value = "versatiles")]
    pub binary: String,

    #[arg(long, env = "VT_CONFIG_PATH")]
    pub config: Option<PathBuf>,

    #[arg(long, env = "VT_OUTPUT_FILE", default_value = "osm.versatiles")]
    pub output_file: String,

    /// Tiles of border added around a bounding box.
    #[arg(long, env = "VT_BBOX_BORDER", default_value = "3")]
    pub bbox_border: u32,
}

impl TilingArgs {
    pub fn into_settings(self, readiness_pattern: Option<String>) -> TilingSettings {
        TilingSettings {
            bbox: non_empty(self.bbox),
            source_url: self.source_url,
            data_path: self.data_path,
            binary: self.binary,
            config: self.config,
            output_file: self.output_file,
            bbox_border: self.bbox_border,
            readiness_pattern,
        }
    }
}

/// Unset and blank values are the same thing in container environments.
fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
