// crates/core/src/analyzer.rs
//! The analysis collaborator: trait surface plus the reference IFC
//! implementation.
//!
//! The engine drives analyzers only through [`Analyzer`] and
//! [`AnalyzerFactory`], so tests can substitute stubs and the takeoff
//! algorithm can evolve without touching job scheduling. Progress is
//! delivered through a structured observer callback rather than by
//! pattern-matching diagnostic log lines.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use regex_lite::Regex;
use serde::Serialize;

use crate::artifacts::ExportFormat;
use crate::error::AnalyzerError;

/// Structured progress callback: `(processed, total)` element counts.
///
/// Invoked from the blocking analysis thread; implementations must be
/// cheap and must not panic.
pub type ProgressObserver = Box<dyn Fn(u64, u64) + Send + Sync>;

/// One material-takeoff analysis over a single model file.
///
/// `analyze_all` is synchronous and CPU-bound; callers are expected to run
/// it on a blocking thread.
pub trait Analyzer: Send {
    /// Number of countable product elements in the model. Known as soon as
    /// the analyzer is constructed.
    fn total_elements(&self) -> u64;

    /// Install the progress observer invoked during [`Self::analyze_all`].
    fn set_progress_observer(&mut self, observer: ProgressObserver);

    /// Run the full analysis, populating the internal results structure.
    fn analyze_all(&mut self) -> Result<(), AnalyzerError>;

    /// Persist the results in the given format to `path`.
    fn export(&self, format: ExportFormat, path: &Path) -> Result<(), AnalyzerError>;
}

/// Constructs an [`Analyzer`] for a stored model file.
pub trait AnalyzerFactory: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn Analyzer>, AnalyzerError>;
}

// =============================================================================
// Reference implementation: STEP/IFC takeoff
// =============================================================================

/// Emit a progress event every this many elements during analysis.
const PROGRESS_BATCH: u64 = 250;

/// Entity-type prefixes treated as countable products.
///
/// Prefix matching covers subtypes (IFCWALLSTANDARDCASE matches IFCWALL).
const PRODUCT_PREFIXES: &[&str] = &[
    "IFCWALL",
    "IFCSLAB",
    "IFCBEAM",
    "IFCCOLUMN",
    "IFCDOOR",
    "IFCWINDOW",
    "IFCROOF",
    "IFCSTAIR",
    "IFCRAILING",
    "IFCCOVERING",
    "IFCFOOTING",
    "IFCPILE",
    "IFCPLATE",
    "IFCMEMBER",
    "IFCCURTAINWALL",
    "IFCBUILDINGELEMENTPROXY",
    "IFCFURNISHINGELEMENT",
    "IFCFLOWTERMINAL",
    "IFCFLOWSEGMENT",
];

/// One product instance pulled from the STEP file.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementRecord {
    /// STEP instance id (`#123`).
    pub step_id: u64,
    pub entity_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Aggregated takeoff for one entity type.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeTakeoff {
    pub count: u64,
}

/// Full results structure; the primary artifact is a lossless dump of this.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TakeoffResults {
    pub source_file: String,
    pub total_elements: u64,
    pub by_type: BTreeMap<String, TypeTakeoff>,
    pub elements: Vec<ElementRecord>,
}

/// Reference takeoff analyzer for IFC models in STEP physical file form.
///
/// Construction parses the file and indexes product entity instances;
/// [`Analyzer::analyze_all`] walks them to build per-type aggregates.
pub struct IfcTakeoffAnalyzer {
    path: PathBuf,
    products: Vec<ElementRecord>,
    results: Option<TakeoffResults>,
    observer: Option<ProgressObserver>,
}

// Manual impl: the observer closure has no Debug.
impl std::fmt::Debug for IfcTakeoffAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IfcTakeoffAnalyzer")
            .field("path", &self.path)
            .field("products", &self.products.len())
            .field("analyzed", &self.results.is_some())
            .finish_non_exhaustive()
    }
}

impl IfcTakeoffAnalyzer {
    pub fn open(path: &Path) -> Result<Self, AnalyzerError> {
        let contents = fs::read_to_string(path).map_err(|e| AnalyzerError::open(path, e))?;

        if !contents.trim_start().starts_with("ISO-10303-21") {
            return Err(AnalyzerError::InvalidFormat { path: path.into() });
        }

        // `#123=IFCWALL('guid',#5,'Name',...);` captures id, type, raw argument list.
        let instance_re = Regex::new(r"#(\d+)\s*=\s*([A-Z0-9_]+)\s*\((.*)\)\s*;")
            .expect("instance pattern is valid");
        let string_re = Regex::new(r"'([^']*)'").expect("string pattern is valid");

        let mut products = Vec::new();
        for line in contents.lines() {
            let Some(caps) = instance_re.captures(line.trim()) else {
                continue;
            };
            let entity_type = &caps[2];
            if !PRODUCT_PREFIXES.iter().any(|p| entity_type.starts_with(p)) {
                continue;
            }
            let step_id: u64 = caps[1].parse().unwrap_or(0);

            // First two quoted arguments are GlobalId and Name for all
            // IfcRoot subtypes.
            let mut strings = string_re
                .captures_iter(&caps[3])
                .map(|c| c[1].to_string());
            let global_id = strings.next().filter(|s| !s.is_empty());
            let name = strings.next().filter(|s| !s.is_empty());

            products.push(ElementRecord {
                step_id,
                entity_type: entity_type.to_string(),
                global_id,
                name,
            });
        }

        if products.is_empty() {
            return Err(AnalyzerError::EmptyModel { path: path.into() });
        }

        Ok(Self {
            path: path.into(),
            products,
            results: None,
            observer: None,
        })
    }

    fn emit_progress(&self, processed: u64, total: u64) {
        if let Some(observer) = &self.observer {
            observer(processed, total);
        }
    }

    fn results(&self) -> Result<&TakeoffResults, AnalyzerError> {
        self.results.as_ref().ok_or_else(|| {
            AnalyzerError::Export {
                path: self.path.clone(),
                source: std::io::Error::other("analysis has not run"),
            }
        })
    }
}

impl Analyzer for IfcTakeoffAnalyzer {
    fn total_elements(&self) -> u64 {
        self.products.len() as u64
    }

    fn set_progress_observer(&mut self, observer: ProgressObserver) {
        self.observer = Some(observer);
    }

    fn analyze_all(&mut self) -> Result<(), AnalyzerError> {
        let total = self.total_elements();
        let mut by_type: BTreeMap<String, TypeTakeoff> = BTreeMap::new();

        for (i, element) in self.products.iter().enumerate() {
            by_type
                .entry(element.entity_type.clone())
                .or_default()
                .count += 1;

            let processed = i as u64 + 1;
            if processed % PROGRESS_BATCH == 0 {
                self.emit_progress(processed, total);
            }
        }
        self.emit_progress(total, total);

        self.results = Some(TakeoffResults {
            source_file: self.path.display().to_string(),
            total_elements: total,
            by_type,
            elements: self.products.clone(),
        });
        Ok(())
    }

    fn export(&self, format: ExportFormat, path: &Path) -> Result<(), AnalyzerError> {
        let results = self.results()?;
        match format {
            ExportFormat::Json => {
                let json = serde_json::to_vec_pretty(results)?;
                fs::write(path, json).map_err(|e| AnalyzerError::export(path, e))?;
            }
            ExportFormat::SummaryCsv => {
                let mut out = Vec::new();
                writeln!(out, "entity_type,count").map_err(|e| AnalyzerError::export(path, e))?;
                for (entity_type, takeoff) in &results.by_type {
                    writeln!(out, "{},{}", entity_type, takeoff.count)
                        .map_err(|e| AnalyzerError::export(path, e))?;
                }
                fs::write(path, out).map_err(|e| AnalyzerError::export(path, e))?;
            }
            ExportFormat::DetailsCsv => {
                let mut out = Vec::new();
                writeln!(out, "step_id,entity_type,global_id,name")
                    .map_err(|e| AnalyzerError::export(path, e))?;
                for el in &results.elements {
                    writeln!(
                        out,
                        "{},{},{},{}",
                        el.step_id,
                        el.entity_type,
                        el.global_id.as_deref().unwrap_or(""),
                        el.name.as_deref().unwrap_or(""),
                    )
                    .map_err(|e| AnalyzerError::export(path, e))?;
                }
                fs::write(path, out).map_err(|e| AnalyzerError::export(path, e))?;
            }
        }
        Ok(())
    }
}

/// Factory producing [`IfcTakeoffAnalyzer`] instances.
#[derive(Debug, Clone, Default)]
pub struct IfcAnalyzerFactory;

impl AnalyzerFactory for IfcAnalyzerFactory {
    fn open(&self, path: &Path) -> Result<Box<dyn Analyzer>, AnalyzerError> {
        Ok(Box::new(IfcTakeoffAnalyzer::open(path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    const FIXTURE: &str = "ISO-10303-21;\n\
        HEADER;\n\
        FILE_DESCRIPTION((''),'2;1');\n\
        ENDSEC;\n\
        DATA;\n\
        #1=IFCPROJECT('proj-guid',$,'Tower',$,$,$,$,$,$);\n\
        #10=IFCWALL('wall-guid-1',#2,'North wall',$,$,#5,#6,$);\n\
        #11=IFCWALLSTANDARDCASE('wall-guid-2',#2,'South wall',$,$,#5,#6,$);\n\
        #12=IFCSLAB('slab-guid',#2,'Ground slab',$,$,#5,#6,$,.FLOOR.);\n\
        #13=IFCDOOR('door-guid',#2,'Entry door',$,$,#5,#6,$,2.1,0.9);\n\
        #20=IFCRELAGGREGATES('rel-guid',$,$,$,#1,(#10));\n\
        ENDSEC;\n\
        END-ISO-10303-21;\n";

    fn write_fixture(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("tower.ifc");
        fs::write(&path, FIXTURE).unwrap();
        path
    }

    #[test]
    fn test_open_counts_products_only() {
        let dir = tempfile::tempdir().unwrap();
        let analyzer = IfcTakeoffAnalyzer::open(&write_fixture(&dir)).unwrap();
        // IFCPROJECT and IFCRELAGGREGATES are not products.
        assert_eq!(analyzer.total_elements(), 4);
    }

    #[test]
    fn test_debug_summarizes_without_observer() {
        let dir = tempfile::tempdir().unwrap();
        let mut analyzer = IfcTakeoffAnalyzer::open(&write_fixture(&dir)).unwrap();
        analyzer.set_progress_observer(Box::new(|_, _| {}));

        let rendered = format!("{analyzer:?}");
        assert!(rendered.contains("IfcTakeoffAnalyzer"));
        assert!(rendered.contains("tower.ifc"));
        assert!(rendered.contains("products: 4"));
    }

    #[test]
    fn test_open_missing_file() {
        let err = IfcTakeoffAnalyzer::open(Path::new("/nonexistent/file.ifc")).unwrap_err();
        assert!(matches!(err, AnalyzerError::NotFound { .. }));
    }

    #[test]
    fn test_open_rejects_non_step_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notstep.ifc");
        fs::write(&path, "hello world").unwrap();
        let err = IfcTakeoffAnalyzer::open(&path).unwrap_err();
        assert!(matches!(err, AnalyzerError::InvalidFormat { .. }));
    }

    #[test]
    fn test_open_rejects_empty_model() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.ifc");
        fs::write(&path, "ISO-10303-21;\nDATA;\nENDSEC;\n").unwrap();
        let err = IfcTakeoffAnalyzer::open(&path).unwrap_err();
        assert!(matches!(err, AnalyzerError::EmptyModel { .. }));
    }

    #[test]
    fn test_analyze_aggregates_by_type() {
        let dir = tempfile::tempdir().unwrap();
        let mut analyzer = IfcTakeoffAnalyzer::open(&write_fixture(&dir)).unwrap();
        analyzer.analyze_all().unwrap();

        let results = analyzer.results().unwrap();
        assert_eq!(results.total_elements, 4);
        assert_eq!(results.by_type["IFCWALL"].count, 1);
        assert_eq!(results.by_type["IFCWALLSTANDARDCASE"].count, 1);
        assert_eq!(results.by_type["IFCSLAB"].count, 1);
        assert_eq!(results.by_type["IFCDOOR"].count, 1);

        let wall = results.elements.iter().find(|e| e.step_id == 10).unwrap();
        assert_eq!(wall.global_id.as_deref(), Some("wall-guid-1"));
        assert_eq!(wall.name.as_deref(), Some("North wall"));
    }

    #[test]
    fn test_analyze_emits_final_progress_event() {
        let dir = tempfile::tempdir().unwrap();
        let mut analyzer = IfcTakeoffAnalyzer::open(&write_fixture(&dir)).unwrap();

        let events: Arc<Mutex<Vec<(u64, u64)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        analyzer.set_progress_observer(Box::new(move |processed, total| {
            sink.lock().unwrap().push((processed, total));
        }));

        analyzer.analyze_all().unwrap();
        let events = events.lock().unwrap();
        assert_eq!(*events.last().unwrap(), (4, 4));
    }

    #[test]
    fn test_export_all_formats() {
        let dir = tempfile::tempdir().unwrap();
        let mut analyzer = IfcTakeoffAnalyzer::open(&write_fixture(&dir)).unwrap();
        analyzer.analyze_all().unwrap();

        let json_path = dir.path().join("out_takeoff.json");
        analyzer.export(ExportFormat::Json, &json_path).unwrap();
        let parsed: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(parsed["totalElements"], 4);

        let summary_path = dir.path().join("out_takeoff_summary.csv");
        analyzer
            .export(ExportFormat::SummaryCsv, &summary_path)
            .unwrap();
        let summary = fs::read_to_string(&summary_path).unwrap();
        assert!(summary.starts_with("entity_type,count\n"));
        assert!(summary.contains("IFCSLAB,1"));

        let details_path = dir.path().join("out_takeoff_details.csv");
        analyzer
            .export(ExportFormat::DetailsCsv, &details_path)
            .unwrap();
        let details = fs::read_to_string(&details_path).unwrap();
        assert!(details.contains("10,IFCWALL,wall-guid-1,North wall"));
    }

    #[test]
    fn test_export_before_analyze_fails() {
        let dir = tempfile::tempdir().unwrap();
        let analyzer = IfcTakeoffAnalyzer::open(&write_fixture(&dir)).unwrap();
        let err = analyzer
            .export(ExportFormat::Json, &dir.path().join("x.json"))
            .unwrap_err();
        assert!(matches!(err, AnalyzerError::Export { .. }));
    }
}
