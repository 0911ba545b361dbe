// crates/core/src/metrics.rs
//! Elapsed/rate/ETA helpers for job status display.
//!
//! These are pure functions recomputed on every status read; nothing here
//! is stored back into the job record beyond the snapshot being built.

use serde::Serialize;

/// Format an elapsed wall-clock duration for display.
///
/// Tiers: under a minute → seconds; under an hour → minutes and seconds;
/// otherwise hours and minutes.
pub fn format_elapsed(elapsed_secs: f64) -> String {
    let secs = elapsed_secs.max(0.0) as u64;
    if secs < 60 {
        format!("{} seconds", secs)
    } else if secs < 3600 {
        format!("{} minutes, {} seconds", secs / 60, secs % 60)
    } else {
        format!("{} hours, {} minutes", secs / 3600, (secs % 3600) / 60)
    }
}

/// Format an estimated time remaining.
///
/// Same tiers as [`format_elapsed`], but the middle tier drops the seconds
/// component; an estimate that precise would be false precision.
pub fn format_eta(eta_secs: f64) -> String {
    let secs = eta_secs.max(0.0) as u64;
    if secs < 60 {
        format!("{} seconds", secs)
    } else if secs < 3600 {
        format!("{} minutes", secs / 60)
    } else {
        format!("{} hours, {} minutes", secs / 3600, (secs % 3600) / 60)
    }
}

/// Rate and remaining-time figures derived from one status read.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingMetrics {
    /// Elements per second since the job started.
    pub rate: f64,
    /// Display form, e.g. "812.50 elements/second".
    pub rate_formatted: String,
    /// Estimated seconds until all elements are processed.
    pub eta_secs: f64,
    /// Display form of the estimate, per [`format_eta`].
    pub eta_formatted: String,
}

/// Compute rate and ETA from the counters of one snapshot.
///
/// `processed` should already prefer the detailed (real) counter over the
/// synthetic one when the detailed counter is nonzero. Returns `None`
/// whenever any input makes the division meaningless: nothing processed
/// yet, no elapsed time, or an unknown total.
pub fn processing_rate(processed: u64, total: u64, elapsed_secs: f64) -> Option<ProcessingMetrics> {
    if processed == 0 || total == 0 || elapsed_secs <= 0.0 {
        return None;
    }
    let rate = processed as f64 / elapsed_secs;
    let remaining = total.saturating_sub(processed);
    let eta_secs = remaining as f64 / rate;
    Some(ProcessingMetrics {
        rate,
        rate_formatted: format!("{:.2} elements/second", rate),
        eta_secs,
        eta_formatted: format_eta(eta_secs),
    })
}
