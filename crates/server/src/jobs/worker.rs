// crates/server/src/jobs/worker.rs
//! Drives one job's analysis end to end: discover scale, run the blocking
//! analysis with a synthetic reporter alongside, persist artifacts,
//! finalize job state.
//!
//! Failure semantics: analyzer construction, primary-artifact persistence,
//! and analysis panics are fatal and flip the job to `failed`; secondary
//! artifact exports are best-effort and at worst downgrade the result to
//! completed-with-warning. No retries anywhere.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use takeoff_core::{
    artifact_file_name, job_base_name, AnalyzerError, AnalyzerFactory, ExportFormat,
};

use super::handles::HandleMap;
use super::job::results_entry;
use super::registry::JobRegistry;
use super::reporter::run_progress_reporter;

/// Fatal outcomes of a worker run; the message becomes the job's `error`.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Failed to load model: {0}")]
    Construction(#[source] AnalyzerError),

    #[error("Analysis failed: {0}")]
    Analysis(#[source] AnalyzerError),

    #[error("Failed to save primary results: {0}")]
    PrimaryArtifact(#[source] AnalyzerError),

    #[error("Analysis task panicked: {0}")]
    Panicked(String),

    #[error("Analysis cancelled by user")]
    Cancelled,
}

/// Everything a worker needs besides its job key.
#[derive(Clone)]
pub struct WorkerEnv {
    pub registry: Arc<JobRegistry>,
    pub factory: Arc<dyn AnalyzerFactory>,
    pub data_dir: PathBuf,
    pub reporters: Arc<HandleMap>,
}

/// Run one job to a terminal state. Never panics the caller: every fatal
/// path is folded into the job record.
pub async fn run_job_worker(env: WorkerEnv, key: String, cancel: CancellationToken) {
    if let Err(e) = drive(&env, &key, &cancel).await {
        tracing::error!(job_key = %key, error = %e, "Job failed");
        env.registry.update(&key, |job| job.fail(e.to_string()));
    }
}

async fn drive(env: &WorkerEnv, key: &str, cancel: &CancellationToken) -> Result<(), WorkerError> {
    env.registry.update(key, |job| {
        job.mark_running();
        job.set_phase("initializing", "Loading model file");
    });
    tracing::info!(job_key = %key, "Starting analysis");

    if cancel.is_cancelled() {
        return Err(WorkerError::Cancelled);
    }

    // Construction parses the model; run it off the async threads.
    let factory = Arc::clone(&env.factory);
    let model_path = env.data_dir.join(key);
    let mut analyzer = tokio::task::spawn_blocking(move || factory.open(&model_path))
        .await
        .map_err(|e| WorkerError::Panicked(e.to_string()))?
        .map_err(WorkerError::Construction)?;

    let total = analyzer.total_elements();
    env.registry.update(key, |job| {
        job.set_total_elements(total);
        job.set_phase("analyzing", format!("Analyzing {total} elements"));
    });
    tracing::info!(job_key = %key, total_elements = total, "Model loaded");

    // Real progress events from the analyzer feed the detailed counter.
    {
        let registry = Arc::clone(&env.registry);
        let observer_key = key.to_string();
        analyzer.set_progress_observer(Box::new(move |processed, _total| {
            registry.update(&observer_key, |job| {
                job.set_detailed_processed_elements(processed);
            });
        }));
    }

    if cancel.is_cancelled() {
        return Err(WorkerError::Cancelled);
    }

    // The synthetic reporter animates progress while the analysis blocks.
    env.reporters.spawn_tracked(
        key,
        run_progress_reporter(
            Arc::clone(&env.registry),
            key.to_string(),
            total,
            cancel.clone(),
        ),
    );

    let started = std::time::Instant::now();
    let analysis = tokio::task::spawn_blocking(move || {
        let result = analyzer.analyze_all();
        (analyzer, result)
    })
    .await;

    // Convergence barrier: whatever happened, the counters land on the
    // real total and the reporter stops writing.
    env.registry.update(key, |job| {
        job.analysis_complete = true;
        job.set_processed_elements(total);
    });

    let (analyzer, result) = analysis.map_err(|e| WorkerError::Panicked(e.to_string()))?;
    result.map_err(WorkerError::Analysis)?;
    tracing::info!(
        job_key = %key,
        total_elements = total,
        duration_secs = started.elapsed().as_secs_f64(),
        "Finished analyzing elements"
    );

    if cancel.is_cancelled() {
        return Err(WorkerError::Cancelled);
    }

    env.registry.update(key, |job| {
        job.set_phase("generating_results", "Generating summary and reports");
    });

    // Primary artifact first; it is the only guaranteed durable record.
    let base = job_base_name(key).to_string();
    let primary_name = artifact_file_name(&base, ExportFormat::Json);
    let primary_path = env.data_dir.join(&primary_name);
    let (analyzer, primary_result) = tokio::task::spawn_blocking(move || {
        let r = analyzer.export(ExportFormat::Json, &primary_path);
        (analyzer, r)
    })
    .await
    .map_err(|e| WorkerError::Panicked(e.to_string()))?;
    primary_result.map_err(WorkerError::PrimaryArtifact)?;
    tracing::info!(job_key = %key, file = %primary_name, "Saved primary results");

    let mut results = BTreeMap::from([results_entry(ExportFormat::Json.role(), &primary_name)]);

    // Secondary exports; a failure here is only a warning.
    let data_dir = env.data_dir.clone();
    let export_base = base.clone();
    let secondary = tokio::task::spawn_blocking(move || {
        [ExportFormat::SummaryCsv, ExportFormat::DetailsCsv].map(|format| {
            let name = artifact_file_name(&export_base, format);
            let result = analyzer.export(format, &data_dir.join(&name));
            (format, name, result)
        })
    })
    .await;

    let warning = match secondary {
        Ok(outcomes) => {
            let mut failures: Vec<String> = Vec::new();
            for (format, name, result) in outcomes {
                match result {
                    Ok(()) => {
                        results.insert(format.role().as_str().to_string(), name);
                    }
                    Err(e) => {
                        tracing::warn!(job_key = %key, file = %name, error = %e, "Secondary export failed");
                        failures.push(e.to_string());
                    }
                }
            }
            (!failures.is_empty()).then(|| {
                format!(
                    "Some export formats could not be generated: {}",
                    failures.join("; ")
                )
            })
        }
        Err(e) => Some(format!("Some export formats could not be generated: {e}")),
    };

    env.registry
        .update(key, |job| job.complete(results, warning));
    tracing::info!(job_key = %key, "Analysis complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::job::{Job, JobStatus};
    use crate::jobs::testutil::{StubBehavior, StubFactory};
    use takeoff_core::IfcAnalyzerFactory;

    fn env_with(factory: Arc<dyn AnalyzerFactory>, data_dir: PathBuf) -> WorkerEnv {
        WorkerEnv {
            registry: Arc::new(JobRegistry::new()),
            factory,
            data_dir,
            reporters: Arc::new(HandleMap::new()),
        }
    }

    fn seeded(env: &WorkerEnv, key: &str) {
        env.registry.create(key, Job::new());
    }

    #[tokio::test]
    async fn test_worker_success_path() {
        let env = env_with(
            Arc::new(StubFactory::new(1000, StubBehavior::Succeed)),
            std::env::temp_dir(),
        );
        seeded(&env, "a.ifc");

        run_job_worker(env.clone(), "a.ifc".to_string(), CancellationToken::new()).await;

        let job = env.registry.get("a.ifc").unwrap();
        assert_eq!(job.status(), JobStatus::Completed);
        assert_eq!(job.processed_elements(), 1000);
        assert!(job.analysis_complete);
        assert!(job.warning.is_none());
        assert_eq!(job.results.len(), 3);
        assert_eq!(job.results["primary"], "a_takeoff.json");
        assert_eq!(job.results["summary"], "a_takeoff_summary.csv");
        assert_eq!(job.results["detail"], "a_takeoff_details.csv");
        assert_eq!(job.phase, "complete");
    }

    #[tokio::test]
    async fn test_worker_construction_failure_is_fatal() {
        let env = env_with(
            Arc::new(StubFactory::new(1000, StubBehavior::FailConstruction)),
            std::env::temp_dir(),
        );
        seeded(&env, "a.ifc");

        run_job_worker(env.clone(), "a.ifc".to_string(), CancellationToken::new()).await;

        let job = env.registry.get("a.ifc").unwrap();
        assert_eq!(job.status(), JobStatus::Failed);
        let error = job.error.unwrap();
        assert!(error.starts_with("Failed to load model"), "{error}");
        assert!(job.results.is_empty());
    }

    #[tokio::test]
    async fn test_worker_analysis_failure_still_converges_counters() {
        let env = env_with(
            Arc::new(StubFactory::new(500, StubBehavior::FailAnalysis)),
            std::env::temp_dir(),
        );
        seeded(&env, "a.ifc");

        run_job_worker(env.clone(), "a.ifc".to_string(), CancellationToken::new()).await;

        let job = env.registry.get("a.ifc").unwrap();
        assert_eq!(job.status(), JobStatus::Failed);
        assert!(job.analysis_complete);
        assert_eq!(job.processed_elements(), 500);
        assert!(job.error.unwrap().starts_with("Analysis failed"));
    }

    #[tokio::test]
    async fn test_worker_primary_artifact_failure_is_fatal() {
        let env = env_with(
            Arc::new(StubFactory::new(100, StubBehavior::FailPrimaryExport)),
            std::env::temp_dir(),
        );
        seeded(&env, "a.ifc");

        run_job_worker(env.clone(), "a.ifc".to_string(), CancellationToken::new()).await;

        let job = env.registry.get("a.ifc").unwrap();
        assert_eq!(job.status(), JobStatus::Failed);
        assert!(job
            .error
            .unwrap()
            .starts_with("Failed to save primary results"));
        assert!(job.results.is_empty());
    }

    #[tokio::test]
    async fn test_worker_secondary_failure_completes_with_warning() {
        let env = env_with(
            Arc::new(StubFactory::new(100, StubBehavior::FailSecondaryExports)),
            std::env::temp_dir(),
        );
        seeded(&env, "a.ifc");

        run_job_worker(env.clone(), "a.ifc".to_string(), CancellationToken::new()).await;

        let job = env.registry.get("a.ifc").unwrap();
        assert_eq!(job.status(), JobStatus::Completed);
        let warning = job.warning.unwrap();
        assert!(
            warning.starts_with("Some export formats could not be generated"),
            "{warning}"
        );
        // Only the primary artifact survives.
        assert_eq!(job.results.len(), 1);
        assert!(job.results.contains_key("primary"));
        assert_eq!(job.phase_description, "Analysis complete with warnings");
    }

    #[tokio::test]
    async fn test_worker_panic_in_analysis_is_caught() {
        let env = env_with(
            Arc::new(StubFactory::new(100, StubBehavior::PanicInAnalysis)),
            std::env::temp_dir(),
        );
        seeded(&env, "a.ifc");

        run_job_worker(env.clone(), "a.ifc".to_string(), CancellationToken::new()).await;

        let job = env.registry.get("a.ifc").unwrap();
        assert_eq!(job.status(), JobStatus::Failed);
        assert!(job.error.unwrap().starts_with("Analysis task panicked"));
        assert!(job.analysis_complete);
    }

    #[tokio::test]
    async fn test_worker_cancelled_before_start() {
        let env = env_with(
            Arc::new(StubFactory::new(100, StubBehavior::Succeed)),
            std::env::temp_dir(),
        );
        seeded(&env, "a.ifc");

        let cancel = CancellationToken::new();
        cancel.cancel();
        run_job_worker(env.clone(), "a.ifc".to_string(), cancel).await;

        let job = env.registry.get("a.ifc").unwrap();
        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("Analysis cancelled by user"));
    }

    #[tokio::test]
    async fn test_worker_records_detailed_progress_events() {
        let env = env_with(
            Arc::new(StubFactory::new(1000, StubBehavior::Succeed)),
            std::env::temp_dir(),
        );
        seeded(&env, "a.ifc");

        run_job_worker(env.clone(), "a.ifc".to_string(), CancellationToken::new()).await;

        // The stub emits a final (total, total) event during analyze.
        let job = env.registry.get("a.ifc").unwrap();
        assert_eq!(job.detailed_processed_elements(), 1000);
    }

    #[tokio::test]
    async fn test_worker_end_to_end_with_real_analyzer() {
        let dir = tempfile::tempdir().unwrap();
        let key = "1700_tower.ifc";
        std::fs::write(
            dir.path().join(key),
            "ISO-10303-21;\nDATA;\n\
             #10=IFCWALL('g1',#2,'W1',$,$,#5,#6,$);\n\
             #11=IFCSLAB('g2',#2,'S1',$,$,#5,#6,$,.FLOOR.);\n\
             ENDSEC;\nEND-ISO-10303-21;\n",
        )
        .unwrap();

        let env = env_with(Arc::new(IfcAnalyzerFactory), dir.path().to_path_buf());
        seeded(&env, key);

        run_job_worker(env.clone(), key.to_string(), CancellationToken::new()).await;

        let job = env.registry.get(key).unwrap();
        assert_eq!(job.status(), JobStatus::Completed);
        assert_eq!(job.total_elements(), 2);
        assert!(dir.path().join("1700_tower_takeoff.json").exists());
        assert!(dir.path().join("1700_tower_takeoff_summary.csv").exists());
        assert!(dir.path().join("1700_tower_takeoff_details.csv").exists());
    }
}
