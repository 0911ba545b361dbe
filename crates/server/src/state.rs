// crates/server/src/state.rs
//! Application state for the Axum server.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use takeoff_core::AnalyzerFactory;

use crate::jobs::{JobRegistry, JobSupervisor};
use crate::live::LiveChannel;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    /// Directory holding uploaded models and generated artifacts.
    pub data_dir: PathBuf,
    /// Upload extension allow-list, lowercased.
    pub allowed_extensions: Vec<String>,
    /// Owns job lifecycles, the registry, and the live channel.
    pub supervisor: Arc<JobSupervisor>,
}

impl AppState {
    /// Create a new application state wrapped in an Arc for sharing.
    pub fn new(
        factory: Arc<dyn AnalyzerFactory>,
        data_dir: PathBuf,
        allowed_extensions: Vec<String>,
    ) -> Arc<Self> {
        let supervisor = Arc::new(JobSupervisor::new(
            Arc::new(JobRegistry::new()),
            LiveChannel::new(),
            factory,
            data_dir.clone(),
        ));
        Arc::new(Self {
            start_time: Instant::now(),
            data_dir,
            allowed_extensions: allowed_extensions
                .into_iter()
                .map(|e| e.to_lowercase())
                .collect(),
            supervisor,
        })
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        self.supervisor.registry()
    }

    pub fn live(&self) -> &LiveChannel {
        self.supervisor.live()
    }

    /// Get the server uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
