// crates/core/src/lib.rs
//! Takeoff domain library.
//!
//! This crate holds everything the server engine needs that is not
//! HTTP- or scheduling-specific: the [`Analyzer`] collaborator interface
//! and the reference IFC implementation, artifact naming, job-key
//! derivation, and the elapsed/rate/ETA display helpers.

pub mod analyzer;
pub mod artifacts;
pub mod error;
pub mod keys;
pub mod metrics;

pub use analyzer::{
    Analyzer, AnalyzerFactory, IfcAnalyzerFactory, IfcTakeoffAnalyzer, ProgressObserver,
    TakeoffResults,
};
pub use artifacts::{artifact_file_name, ArtifactRole, ExportFormat};
pub use error::AnalyzerError;
pub use keys::{derive_job_key, job_base_name, key_extension};
pub use metrics::{format_elapsed, format_eta, processing_rate, ProcessingMetrics};
