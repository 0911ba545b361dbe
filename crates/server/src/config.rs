// crates/server/src/config.rs
//! Server configuration, parsed from flags and environment.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Default port for the server.
const DEFAULT_PORT: u16 = 47815;

/// Material takeoff analysis server.
#[derive(Debug, Clone, Parser)]
#[command(name = "takeoff", version, about)]
pub struct ServerConfig {
    /// Port to listen on.
    #[arg(long, env = "TAKEOFF_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Directory for uploaded models and generated artifacts.
    /// Defaults to `<user data dir>/takeoff/uploads`.
    #[arg(long, env = "TAKEOFF_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Comma-separated list of accepted upload extensions.
    #[arg(long, env = "TAKEOFF_ALLOWED_EXTENSIONS", default_value = "ifc", value_delimiter = ',')]
    pub allowed_extensions: Vec<String>,

    /// How long a finished job stays queryable, in seconds.
    #[arg(long, env = "TAKEOFF_JOB_TTL_SECS", default_value_t = 3600)]
    pub job_ttl_secs: u64,

    /// Interval between eviction sweeps, in seconds.
    #[arg(long, env = "TAKEOFF_EVICTION_INTERVAL_SECS", default_value_t = 60)]
    pub eviction_interval_secs: u64,
}

impl ServerConfig {
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("takeoff")
                .join("uploads")
        })
    }

    pub fn job_ttl(&self) -> Duration {
        Duration::from_secs(self.job_ttl_secs)
    }

    pub fn eviction_interval(&self) -> Duration {
        Duration::from_secs(self.eviction_interval_secs)
    }
}
