#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::builders::ConfigBuilder;

/// Default runs directory, relative to the proof root.
pub const RUNS_DIR: &str = "output/litani/runs";

/// A temporary proof root laid out the way the batch runner leaves it.
pub struct ProofRoot {
    dir: TempDir,
}

impl ProofRoot {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp proof root"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.path().join(RUNS_DIR)
    }

    pub fn run_dir(&self, run: &str) -> PathBuf {
        self.runs_dir().join(run)
    }

    pub fn config(&self) -> ConfigBuilder {
        ConfigBuilder::new(self.path())
    }

    /// Create a run directory with a `run.json` descriptor and an HTML index.
    pub fn add_run(&self, run: &str, start_time: &str) -> PathBuf {
        let dir = self.run_dir(run);
        fs::create_dir_all(dir.join("html")).expect("create run dir");
        fs::write(
            dir.join("run.json"),
            format!(r#"{{"run_id": "{run}", "start_time": "{start_time}"}}"#),
        )
        .expect("write run.json");
        fs::write(
            dir.join("html/index.html"),
            format!("<html><body>{run}</body></html>"),
        )
        .expect("write index.html");
        dir
    }

    /// Write the JSON report documents of `proof` under `run`.
    ///
    /// A `None` status or coverage leaves the corresponding document out;
    /// `failures` is only written along with a status.
    pub fn add_report(
        &self,
        run: &str,
        proof: &str,
        status: Option<&str>,
        failures: &[&str],
        coverage: Option<f64>,
    ) -> PathBuf {
        let dir = self
            .run_dir(run)
            .join(format!("artifacts/{proof}/report/json"));
        fs::create_dir_all(&dir).expect("create report dir");

        if let Some(prover) = status {
            let failures = failures
                .iter()
                .map(|f| format!("\"{f}\""))
                .collect::<Vec<_>>()
                .join(", ");
            fs::write(
                dir.join("viewer-result.json"),
                format!(
                    r#"{{"viewer-result": {{"prover": "{prover}", "results": {{"false": [{failures}], "true": []}}}}}}"#
                ),
            )
            .expect("write viewer-result.json");
        }

        if let Some(pct) = coverage {
            fs::write(
                dir.join("viewer-coverage.json"),
                format!(
                    r#"{{"viewer-coverage": {{"overall_coverage": {{"hit": 1, "total": 1, "percentage": {pct}}}}}}}"#
                ),
            )
            .expect("write viewer-coverage.json");
        }
        dir
    }

    /// Write a shell script into the proof root and return its file name.
    pub fn write_script(&self, name: &str, body: &str) -> String {
        fs::write(self.path().join(name), body).expect("write script");
        name.to_string()
    }

    pub fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.path().join(relative)).unwrap_or_default()
    }
}

impl Default for ProofRoot {
    fn default() -> Self {
        Self::new()
    }
}
