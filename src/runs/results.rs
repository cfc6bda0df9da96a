// src/runs/results.rs

//! Pass/fail/coverage lookup for a single proof.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ConfigFile;
use crate::errors::Result;
use crate::fs::FileSystem;
use crate::runs::catalog::{is_plain_name, RunCatalog, RunInfo};

/// Outcome of one proof in a run, computed from the report files on demand.
///
/// Missing report files are a normal state (run still in flight, or no run
/// yet) and produce `is_complete = false` with everything else empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VerificationResult {
    pub is_complete: bool,
    pub status: Option<String>,
    pub failures: Vec<String>,
    pub coverage: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ResultDocument {
    #[serde(rename = "viewer-result")]
    result: ProverResult,
}

#[derive(Debug, Deserialize)]
struct ProverResult {
    prover: Option<String>,
    #[serde(default)]
    results: PropertyResults,
}

#[derive(Debug, Default, Deserialize)]
struct PropertyResults {
    #[serde(default, rename = "false")]
    failed: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CoverageDocument {
    #[serde(rename = "viewer-coverage")]
    coverage: CoverageSummary,
}

#[derive(Debug, Deserialize)]
struct CoverageSummary {
    overall_coverage: OverallCoverage,
}

#[derive(Debug, Deserialize)]
struct OverallCoverage {
    percentage: f64,
}

#[derive(Debug, Clone)]
pub struct ResultReader {
    fs: Arc<dyn FileSystem>,
    catalog: RunCatalog,
    proof_report_dir: String,
    result_file: String,
    coverage_file: String,
}

impl ResultReader {
    pub fn new(fs: Arc<dyn FileSystem>, catalog: RunCatalog, cfg: &ConfigFile) -> Self {
        Self {
            fs,
            catalog,
            proof_report_dir: cfg.reports.proof_report_dir.clone(),
            result_file: cfg.reports.result_file.clone(),
            coverage_file: cfg.reports.coverage_file.clone(),
        }
    }

    /// Result of `proof` in the most recent run.
    pub fn result(&self, proof: &str) -> Result<VerificationResult> {
        match self.catalog.latest()? {
            Some(run) => Ok(self.result_in(&run, proof)),
            None => Ok(VerificationResult::default()),
        }
    }

    /// Result of `proof` in a specific run.
    pub fn result_in(&self, run: &RunInfo, proof: &str) -> VerificationResult {
        let Some(report_dir) = self.report_dir(&run.path, proof) else {
            return VerificationResult::default();
        };

        if !self.fs.is_dir(&report_dir) {
            debug!(run = %run.name, proof, "no report directory yet");
            return VerificationResult::default();
        }

        let mut result = VerificationResult {
            is_complete: true,
            ..Default::default()
        };

        if let Some(doc) = self.read_json::<ResultDocument>(&report_dir.join(&self.result_file)) {
            result.status = doc.result.prover;
            result.failures = doc.result.results.failed;
        }

        if let Some(doc) =
            self.read_json::<CoverageDocument>(&report_dir.join(&self.coverage_file))
        {
            result.coverage = Some(doc.coverage.overall_coverage.percentage);
        }

        result
    }

    fn report_dir(&self, run_dir: &Path, proof: &str) -> Option<PathBuf> {
        // Proof names share the run id alphabet; anything else cannot match
        // a report directory.
        if !is_plain_name(proof) {
            return None;
        }
        Some(run_dir.join(self.proof_report_dir.replace("{proof}", proof)))
    }

    fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Option<T> {
        if !self.fs.is_file(path) {
            return None;
        }

        let parsed = self
            .fs
            .read_to_string(path)
            .and_then(|raw| serde_json::from_str::<T>(&raw).map_err(anyhow::Error::from));

        match parsed {
            Ok(doc) => Some(doc),
            Err(err) => {
                warn!(?path, error = %err, "ignoring unreadable report file");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RawConfigFile;
    use crate::fs::mock::MockFileSystem;

    const RUN: &str = "/proofs/output/litani/runs/r1";

    fn reader(fs: &MockFileSystem) -> ResultReader {
        let mut raw = RawConfigFile::default();
        raw.runner.proof_root = PathBuf::from("/proofs");
        let cfg = ConfigFile::try_from(raw).unwrap();
        let fs: Arc<dyn FileSystem> = Arc::new(fs.clone());
        let catalog = RunCatalog::new(Arc::clone(&fs), &cfg);
        ResultReader::new(fs, catalog, &cfg)
    }

    #[test]
    fn no_runs_means_incomplete() {
        let fs = MockFileSystem::new();
        assert_eq!(reader(&fs).result("foo").unwrap(), VerificationResult::default());
    }

    #[test]
    fn missing_report_dir_means_incomplete() {
        let fs = MockFileSystem::new();
        fs.add_dir(RUN);
        let result = reader(&fs).result("foo").unwrap();
        assert!(!result.is_complete);
        assert!(result.status.is_none());
    }

    #[test]
    fn both_documents_are_parsed() {
        let fs = MockFileSystem::new();
        let dir = format!("{RUN}/artifacts/foo/report/json");
        fs.add_file(
            format!("{dir}/viewer-result.json"),
            r#"{"viewer-result": {"prover": "failure",
                "results": {"false": ["foo.pointer_dereference.1"], "true": ["foo.assertion.1"]}}}"#,
        );
        fs.add_file(
            format!("{dir}/viewer-coverage.json"),
            r#"{"viewer-coverage": {"overall_coverage": {"hit": 8, "total": 10, "percentage": 0.8}}}"#,
        );

        let result = reader(&fs).result("foo").unwrap();
        assert!(result.is_complete);
        assert_eq!(result.status.as_deref(), Some("failure"));
        assert_eq!(result.failures, vec!["foo.pointer_dereference.1".to_string()]);
        assert_eq!(result.coverage, Some(0.8));
    }

    #[test]
    fn documents_are_independent() {
        let fs = MockFileSystem::new();
        let dir = format!("{RUN}/artifacts/foo/report/json");
        fs.add_file(
            format!("{dir}/viewer-coverage.json"),
            r#"{"viewer-coverage": {"overall_coverage": {"percentage": 1.0}}}"#,
        );
        fs.add_file(format!("{dir}/viewer-result.json"), "{ truncated");

        let result = reader(&fs).result("foo").unwrap();
        assert!(result.is_complete);
        assert!(result.status.is_none());
        assert!(result.failures.is_empty());
        assert_eq!(result.coverage, Some(1.0));
    }

    #[test]
    fn odd_proof_names_never_match() {
        let fs = MockFileSystem::new();
        fs.add_dir(format!("{RUN}/artifacts/foo/report/json"));
        assert!(!reader(&fs).result("../foo").unwrap().is_complete);
    }
}
