// crates/core/src/artifacts.rs
//! Artifact roles and deterministic artifact file naming.

use serde::{Deserialize, Serialize};

/// Named role an artifact plays in a job's results map.
///
/// `Primary` is the lossless structured dump and the only artifact whose
/// absence fails a job; the others are convenience exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactRole {
    Primary,
    Summary,
    Detail,
}

impl ArtifactRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Summary => "summary",
            Self::Detail => "detail",
        }
    }
}

/// Output format an [`crate::Analyzer`] can export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Lossless JSON dump of the full results structure.
    Json,
    /// Per-entity-type totals, CSV.
    SummaryCsv,
    /// Per-element rows, CSV.
    DetailsCsv,
}

impl ExportFormat {
    pub fn role(&self) -> ArtifactRole {
        match self {
            Self::Json => ArtifactRole::Primary,
            Self::SummaryCsv => ArtifactRole::Summary,
            Self::DetailsCsv => ArtifactRole::Detail,
        }
    }

    fn suffix(&self) -> &'static str {
        match self {
            Self::Json => "_takeoff.json",
            Self::SummaryCsv => "_takeoff_summary.csv",
            Self::DetailsCsv => "_takeoff_details.csv",
        }
    }
}

/// Deterministic artifact filename: job base name plus a fixed per-role suffix.
pub fn artifact_file_name(job_base: &str, format: ExportFormat) -> String {
    format!("{}{}", job_base, format.suffix())
}
