// crates/server/src/jobs/reporter.rs
//! Synthetic smooth-progress reporter.
//!
//! The analyzer reports real progress only in coarse batches, which is not
//! enough for a continuously animated progress bar. While the analysis
//! runs, this task manufactures a monotonic time-based approximation and
//! writes it into the job's synthetic counter. The worker's end-of-analysis
//! overwrite of `processed_elements` to the full total is the convergence
//! barrier; once `analysis_complete` is set the reporter stops without
//! writing again.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::registry::JobRegistry;

/// Number of synthetic ticks over the estimated analysis duration.
pub const REPORT_TICKS: u64 = 50;

/// Pause before the first tick, covering analyzer warm-up.
const WARMUP: Duration = Duration::from_secs(1);

/// Floor on the estimated analysis duration, seconds.
const MIN_ESTIMATE_SECS: f64 = 8.0;

/// Assumed steady-state throughput, elements per second.
const ESTIMATED_ELEMENTS_PER_SEC: f64 = 1000.0;

/// Estimated wall-clock duration of the analysis for `total` elements:
/// a floor constant plus a linear term.
pub fn estimated_duration(total_elements: u64) -> Duration {
    let secs = (total_elements as f64 / ESTIMATED_ELEMENTS_PER_SEC).max(MIN_ESTIMATE_SECS);
    Duration::from_secs_f64(secs)
}

/// Synthetic progress value at a tick boundary:
/// `min(round(tick/ticks × total), total)`.
pub fn synthetic_progress(tick: u64, ticks: u64, total_elements: u64) -> u64 {
    let simulated = (tick as f64 / ticks as f64 * total_elements as f64).round() as u64;
    simulated.min(total_elements)
}

/// Run the reporter for one job until the tick sequence ends, the analysis
/// completes, or the job is cancelled.
///
/// Every failure inside a tick is absorbed and logged; nothing here ever
/// escalates to job failure.
pub async fn run_progress_reporter(
    registry: Arc<JobRegistry>,
    key: String,
    total_elements: u64,
    cancel: CancellationToken,
) {
    let tick_interval = estimated_duration(total_elements) / REPORT_TICKS as u32;
    tracing::debug!(
        job_key = %key,
        total_elements,
        tick_ms = tick_interval.as_millis() as u64,
        "Progress reporter started"
    );

    tokio::select! {
        _ = cancel.cancelled() => return,
        _ = tokio::time::sleep(WARMUP) => {}
    }

    for tick in 1..=REPORT_TICKS {
        // The worker's real final count always wins; stop without another write.
        let complete = registry
            .get(&key)
            .map(|job| job.analysis_complete)
            .unwrap_or(true);
        if complete {
            tracing::debug!(job_key = %key, tick, "Analysis complete, reporter stopping");
            return;
        }

        let simulated = synthetic_progress(tick, REPORT_TICKS, total_elements);
        let updated = registry.update(&key, |job| {
            if !job.analysis_complete {
                job.set_processed_elements(simulated);
            }
        });
        if !updated {
            tracing::warn!(job_key = %key, "Job vanished mid-report, reporter stopping");
            return;
        }

        if tick % 5 == 0 {
            tracing::debug!(
                job_key = %key,
                simulated,
                total_elements,
                percent = (tick * 100) / REPORT_TICKS,
                "Synthetic progress"
            );
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(tick_interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::job::Job;

    #[test]
    fn test_estimated_duration_floor() {
        assert_eq!(estimated_duration(0), Duration::from_secs(8));
        assert_eq!(estimated_duration(5_000), Duration::from_secs(8));
    }

    #[test]
    fn test_estimated_duration_linear_term() {
        assert_eq!(estimated_duration(20_000), Duration::from_secs(20));
    }

    #[test]
    fn test_synthetic_progress_tick_values() {
        // total = 10000, T = 50: each tick advances by 2%.
        assert_eq!(synthetic_progress(1, 50, 10_000), 200);
        assert_eq!(synthetic_progress(25, 50, 10_000), 5_000);
        assert_eq!(synthetic_progress(50, 50, 10_000), 10_000);
    }

    #[test]
    fn test_synthetic_progress_never_exceeds_total() {
        for tick in 1..=50 {
            assert!(synthetic_progress(tick, 50, 7) <= 7);
        }
        assert_eq!(synthetic_progress(50, 50, 7), 7);
    }

    fn seeded_registry(total: u64) -> Arc<JobRegistry> {
        let registry = Arc::new(JobRegistry::new());
        registry.create("job.ifc", Job::new());
        registry.update("job.ifc", |j| {
            j.mark_running();
            j.set_total_elements(total);
        });
        registry
    }

    #[tokio::test(start_paused = true)]
    async fn test_reporter_full_tick_sequence() {
        let registry = seeded_registry(10_000);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_progress_reporter(
            Arc::clone(&registry),
            "job.ifc".to_string(),
            10_000,
            cancel,
        ));

        // 10s estimate / 50 ticks = 200ms per tick, plus 1s warm-up.
        let tick_ms = estimated_duration(10_000).as_millis() as u64 / REPORT_TICKS;
        assert_eq!(tick_ms, 200);
        tokio::time::sleep(Duration::from_millis(1000 + tick_ms * 25 + 10)).await;
        let mid = registry.get("job.ifc").unwrap().processed_elements();
        assert!(mid >= synthetic_progress(24, 50, 10_000));
        assert!(mid <= synthetic_progress(26, 50, 10_000));

        handle.await.unwrap();
        assert_eq!(
            registry.get("job.ifc").unwrap().processed_elements(),
            10_000
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reporter_stops_on_analysis_complete_without_writing() {
        let registry = seeded_registry(10_000);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_progress_reporter(
            Arc::clone(&registry),
            "job.ifc".to_string(),
            10_000,
            cancel,
        ));

        // Let a few 200ms ticks land.
        tokio::time::sleep(Duration::from_millis(1000 + 200 * 3)).await;

        // Worker finishes: final assignment wins.
        registry.update("job.ifc", |j| {
            j.analysis_complete = true;
            j.set_processed_elements(10_000);
        });

        handle.await.unwrap();
        assert_eq!(
            registry.get("job.ifc").unwrap().processed_elements(),
            10_000
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reporter_exits_when_job_evicted() {
        let registry = seeded_registry(10_000);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_progress_reporter(
            Arc::clone(&registry),
            "job.ifc".to_string(),
            10_000,
            cancel,
        ));

        tokio::time::sleep(Duration::from_millis(1100)).await;
        registry.update("job.ifc", |j| j.fail("gone"));
        registry.evict_terminal(Duration::ZERO);

        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reporter_cancellation() {
        let registry = seeded_registry(10_000);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_progress_reporter(
            Arc::clone(&registry),
            "job.ifc".to_string(),
            10_000,
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(500)).await;
        cancel.cancel();
        handle.await.unwrap();
        // Cancelled during warm-up: no synthetic writes happened.
        assert_eq!(registry.get("job.ifc").unwrap().processed_elements(), 0);
    }
}
