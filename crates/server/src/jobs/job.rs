// crates/server/src/jobs/job.rs
//! The per-job record and its read-only snapshot form.
//!
//! A [`Job`] is plain data mutated only through [`super::registry::JobRegistry`]
//! update closures, which serialize all writes per key. Components never hold
//! a reference to a live `Job`; they read [`JobSnapshot`]s.

use std::collections::BTreeMap;
use std::time::Instant;

use serde::Serialize;

use takeoff_core::{format_elapsed, processing_rate, ArtifactRole, ProcessingMetrics};

/// Lifecycle status. Transitions are monotonic: `Pending → Running →
/// Completed | Failed`, never backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One submitted file's analysis run and its tracked state.
#[derive(Debug, Clone)]
pub struct Job {
    status: JobStatus,
    pub phase: String,
    pub phase_description: String,
    /// Set when the job flips to Running.
    pub started_at: Option<Instant>,
    /// Wall-clock twin of `started_at`, for display.
    pub started_at_wall: Option<chrono::DateTime<chrono::Utc>>,
    /// Set once, immutable thereafter.
    total_elements: u64,
    /// Synthetic counter; monotone non-decreasing, capped at total.
    processed_elements: u64,
    /// Real counter fed by the analyzer's structured progress events.
    detailed_processed_elements: u64,
    pub error: Option<String>,
    pub warning: Option<String>,
    /// Artifact role → filename; populated only on completion.
    pub results: BTreeMap<String, String>,
    /// Stops the synthetic reporter once real analysis has finished.
    pub analysis_complete: bool,
    /// Set on reaching a terminal status; drives TTL eviction.
    pub terminal_at: Option<Instant>,
}

impl Job {
    pub fn new() -> Self {
        Self {
            status: JobStatus::Pending,
            phase: "pending".to_string(),
            phase_description: "Waiting to start".to_string(),
            started_at: None,
            started_at_wall: None,
            total_elements: 0,
            processed_elements: 0,
            detailed_processed_elements: 0,
            error: None,
            warning: None,
            results: BTreeMap::new(),
            analysis_complete: false,
            terminal_at: None,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Advance the status. Backward transitions and writes past a terminal
    /// status are ignored.
    pub fn advance_status(&mut self, next: JobStatus) {
        if self.status.is_terminal() || next <= self.status {
            return;
        }
        self.status = next;
        if next.is_terminal() {
            self.terminal_at = Some(Instant::now());
        }
    }

    /// Flip to Running and record the start time.
    pub fn mark_running(&mut self) {
        self.advance_status(JobStatus::Running);
        if self.started_at.is_none() {
            self.started_at = Some(Instant::now());
            self.started_at_wall = Some(chrono::Utc::now());
        }
    }

    pub fn set_phase(&mut self, phase: &str, description: impl Into<String>) {
        self.phase = phase.to_string();
        self.phase_description = description.into();
    }

    pub fn total_elements(&self) -> u64 {
        self.total_elements
    }

    /// Record the discovered element count. Set-once; later writes ignored.
    pub fn set_total_elements(&mut self, total: u64) {
        if self.total_elements == 0 {
            self.total_elements = total;
        }
    }

    pub fn processed_elements(&self) -> u64 {
        self.processed_elements
    }

    /// Raise the synthetic progress counter. Never decreases and never
    /// exceeds the known total.
    pub fn set_processed_elements(&mut self, processed: u64) {
        let capped = if self.total_elements > 0 {
            processed.min(self.total_elements)
        } else {
            processed
        };
        self.processed_elements = self.processed_elements.max(capped);
    }

    pub fn detailed_processed_elements(&self) -> u64 {
        self.detailed_processed_elements
    }

    /// Record a real progress event from the analyzer.
    pub fn set_detailed_processed_elements(&mut self, processed: u64) {
        self.detailed_processed_elements = self.detailed_processed_elements.max(processed);
    }

    /// Terminal failure with a causing message.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
        self.set_phase("error", "Analysis failed due to an error");
        self.advance_status(JobStatus::Failed);
    }

    /// Terminal success. `results` maps artifact roles to filenames;
    /// `warning` is set when secondary exports were dropped.
    pub fn complete(
        &mut self,
        results: BTreeMap<String, String>,
        warning: Option<String>,
    ) {
        let description = if warning.is_some() {
            "Analysis complete with warnings"
        } else {
            "Analysis complete"
        };
        self.results = results;
        self.warning = warning;
        self.set_phase("complete", description);
        self.advance_status(JobStatus::Completed);
    }

    /// Elapsed seconds since the job started running.
    pub fn elapsed_secs(&self) -> f64 {
        self.started_at
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    /// Build the display snapshot, recomputing the derived metrics.
    pub fn snapshot(&self, key: &str) -> JobSnapshot {
        let elapsed_secs = self.elapsed_secs();

        // The real counter wins whenever the analyzer has reported anything.
        let effective_processed = if self.detailed_processed_elements > 0 {
            self.detailed_processed_elements
        } else {
            self.processed_elements
        };
        let metrics = processing_rate(effective_processed, self.total_elements, elapsed_secs);

        let redirect_url = if self.status == JobStatus::Completed {
            Some(format!("/api/jobs/{key}/results"))
        } else {
            None
        };

        JobSnapshot {
            key: key.to_string(),
            status: self.status,
            phase: self.phase.clone(),
            phase_description: self.phase_description.clone(),
            total_elements: self.total_elements,
            processed_elements: self.processed_elements,
            detailed_processed_elements: self.detailed_processed_elements,
            elapsed_secs,
            elapsed_formatted: self.started_at.map(|_| format_elapsed(elapsed_secs)),
            metrics,
            error: self.error.clone(),
            warning: self.warning.clone(),
            results: self.results.clone(),
            redirect_url,
            started_at: self.started_at_wall,
        }
    }
}

impl Default for Job {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only status snapshot pushed to observers and served over HTTP.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub key: String,
    pub status: JobStatus,
    pub phase: String,
    pub phase_description: String,
    pub total_elements: u64,
    pub processed_elements: u64,
    pub detailed_processed_elements: u64,
    pub elapsed_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_formatted: Option<String>,
    #[serde(flatten)]
    pub metrics: Option<ProcessingMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub results: BTreeMap<String, String>,
    /// Present on completed snapshots; tells the client where to go next.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl JobSnapshot {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Helper for building the results map the worker hands to [`Job::complete`].
pub fn results_entry(role: ArtifactRole, file_name: impl Into<String>) -> (String, String) {
    (role.as_str().to_string(), file_name.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_status_sequence_success() {
        let mut job = Job::new();
        assert_eq!(job.status(), JobStatus::Pending);
        job.mark_running();
        assert_eq!(job.status(), JobStatus::Running);
        job.complete(BTreeMap::new(), None);
        assert_eq!(job.status(), JobStatus::Completed);
        // Terminal status sticks.
        job.fail("late error");
        assert_eq!(job.status(), JobStatus::Completed);
    }

    #[test]
    fn test_status_never_goes_backward() {
        let mut job = Job::new();
        job.mark_running();
        job.advance_status(JobStatus::Pending);
        assert_eq!(job.status(), JobStatus::Running);
    }

    #[test]
    fn test_processed_is_monotone_and_capped() {
        let mut job = Job::new();
        job.set_total_elements(100);
        job.set_processed_elements(40);
        job.set_processed_elements(30);
        assert_eq!(job.processed_elements(), 40);
        job.set_processed_elements(500);
        assert_eq!(job.processed_elements(), 100);
    }

    #[test]
    fn test_total_is_set_once() {
        let mut job = Job::new();
        job.set_total_elements(100);
        job.set_total_elements(999);
        assert_eq!(job.total_elements(), 100);
    }

    #[test]
    fn test_start_time_recorded_once() {
        let mut job = Job::new();
        job.mark_running();
        let first = job.started_at;
        job.mark_running();
        assert_eq!(job.started_at, first);
    }

    #[test]
    fn test_fail_sets_error_and_phase() {
        let mut job = Job::new();
        job.mark_running();
        job.fail("boom");
        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("boom"));
        assert_eq!(job.phase, "error");
        assert!(job.terminal_at.is_some());
    }

    #[test]
    fn test_snapshot_prefers_detailed_counter_for_metrics() {
        let mut job = Job::new();
        job.mark_running();
        job.set_total_elements(1000);
        job.set_processed_elements(100);
        job.set_detailed_processed_elements(400);
        std::thread::sleep(std::time::Duration::from_millis(20));

        let snap = job.snapshot("k");
        let metrics = snap.metrics.expect("metrics defined");
        // 400 real elements over the elapsed window, not 100 synthetic.
        assert!(metrics.rate > 100.0 / snap.elapsed_secs + 1.0);
    }

    #[test]
    fn test_snapshot_metrics_absent_before_progress() {
        let mut job = Job::new();
        job.mark_running();
        job.set_total_elements(1000);
        let snap = job.snapshot("k");
        assert!(snap.metrics.is_none());
    }

    #[test]
    fn test_snapshot_redirect_only_when_completed() {
        let mut job = Job::new();
        job.mark_running();
        assert!(job.snapshot("1700_t.ifc").redirect_url.is_none());

        job.complete(
            BTreeMap::from([results_entry(ArtifactRole::Primary, "a.json")]),
            None,
        );
        let snap = job.snapshot("1700_t.ifc");
        assert_eq!(
            snap.redirect_url.as_deref(),
            Some("/api/jobs/1700_t.ifc/results")
        );
        assert_eq!(snap.results["primary"], "a.json");
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let mut job = Job::new();
        job.mark_running();
        job.set_total_elements(10);
        let json = serde_json::to_value(job.snapshot("k")).unwrap();
        assert_eq!(json["status"], "running");
        assert!(json.get("totalElements").is_some());
        assert!(json.get("error").is_none());
    }
}
