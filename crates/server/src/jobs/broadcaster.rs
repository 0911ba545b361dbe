// crates/server/src/jobs/broadcaster.rs
//! Per-job status broadcaster.
//!
//! While its job is live, this task takes a fresh snapshot once per second
//! and pushes it onto the live channel. The loop ends only after pushing
//! one snapshot of a terminal state, so every subscribed client sees the
//! final frame (with `redirectUrl` on success) exactly as the engine
//! recorded it.

use std::sync::Arc;
use std::time::Duration;

use super::registry::JobRegistry;
use crate::live::LiveChannel;

pub const BROADCAST_INTERVAL: Duration = Duration::from_secs(1);

pub async fn run_status_broadcaster(registry: Arc<JobRegistry>, live: LiveChannel, key: String) {
    let mut ticker = tokio::time::interval(BROADCAST_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let Some(snapshot) = registry.snapshot(&key) else {
            tracing::debug!(job_key = %key, "Job gone, broadcaster stopping");
            return;
        };
        let terminal = snapshot.is_terminal();
        live.push(snapshot);
        if terminal {
            tracing::debug!(job_key = %key, "Terminal frame pushed, broadcaster stopping");
            return;
        }
    }
}
