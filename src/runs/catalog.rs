// src/runs/catalog.rs

//! Discovery of run directories left behind by the batch runner.

use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::SystemTime;

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ConfigFile;
use crate::errors::{ProofrunError, Result};
use crate::fs::FileSystem;

/// Alias accepted wherever a run id is expected.
pub const LATEST: &str = "latest";
/// Names the live task in the API; never a run id.
pub const CURRENT: &str = "current";

static RUN_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("valid run id regex"));

/// True if `name` is a single path component: no separators, no `..`.
pub fn is_plain_name(name: &str) -> bool {
    RUN_ID.is_match(name)
}

/// True if `id` can name a run directory. `latest` and `current` are
/// reserved by the API.
pub fn is_valid_run_id(id: &str) -> bool {
    is_plain_name(id) && !id.eq_ignore_ascii_case(LATEST) && !id.eq_ignore_ascii_case(CURRENT)
}

/// Metadata of one persisted run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunInfo {
    pub name: String,
    pub start_time: DateTime<Utc>,
    #[serde(skip)]
    pub path: PathBuf,
}

/// Only the field we need from the runner's run descriptor.
#[derive(Debug, Deserialize)]
struct RunDescriptor {
    start_time: String,
}

/// Scans the runs directory. Nothing is cached: every call reflects the
/// filesystem as it is now.
#[derive(Debug, Clone)]
pub struct RunCatalog {
    fs: Arc<dyn FileSystem>,
    runs_root: PathBuf,
    html_dir: PathBuf,
    run_descriptor: String,
    start_time_format: String,
}

impl RunCatalog {
    pub fn new(fs: Arc<dyn FileSystem>, cfg: &ConfigFile) -> Self {
        Self {
            fs,
            runs_root: cfg.runs_root(),
            html_dir: cfg.reports.html_dir.clone(),
            run_descriptor: cfg.reports.run_descriptor.clone(),
            start_time_format: cfg.reports.start_time_format.clone(),
        }
    }

    /// All runs, newest first.
    ///
    /// A missing runs directory means no run was ever started and yields an
    /// empty list.
    pub fn list(&self) -> Result<Vec<RunInfo>> {
        let mut runs: Vec<RunInfo> = self
            .run_dirs()?
            .into_iter()
            .map(|(name, path)| {
                let start_time = self.start_time_of(&path);
                RunInfo {
                    name,
                    start_time,
                    path,
                }
            })
            .collect();

        runs.sort_by(|a, b| {
            b.start_time
                .cmp(&a.start_time)
                .then_with(|| b.name.cmp(&a.name))
        });

        debug!(count = runs.len(), root = ?self.runs_root, "listed runs");
        Ok(runs)
    }

    /// Number of run directories, without reading any metadata.
    pub fn count(&self) -> Result<usize> {
        Ok(self.run_dirs()?.len())
    }

    pub fn latest(&self) -> Result<Option<RunInfo>> {
        Ok(self.list()?.into_iter().next())
    }

    /// Resolve a run id (or `latest`) to its metadata.
    pub fn get(&self, run_id: &str) -> Result<RunInfo> {
        if run_id.eq_ignore_ascii_case(LATEST) {
            return self
                .latest()?
                .ok_or_else(|| ProofrunError::NotFound("no runs available".to_string()));
        }

        let path = self.run_dir(run_id)?;
        Ok(RunInfo {
            name: run_id.to_string(),
            start_time: self.start_time_of(&path),
            path,
        })
    }

    /// Path of an existing run directory.
    pub fn run_dir(&self, run_id: &str) -> Result<PathBuf> {
        if !is_valid_run_id(run_id) {
            return Err(ProofrunError::NotFound(format!("run '{run_id}'")));
        }

        let path = self.runs_root.join(run_id);
        if !self.fs.is_dir(&path) {
            return Err(ProofrunError::NotFound(format!("run '{run_id}'")));
        }
        Ok(path)
    }

    /// Locate a file of a run's HTML/JSON report tree.
    ///
    /// An empty path or a directory resolves to its `index.html`. Paths with
    /// `..`, root or prefix components are treated as missing.
    pub fn artifact_path(&self, run_id: &str, relative: &str) -> Result<PathBuf> {
        let run = self.get(run_id)?;
        let relative = relative.trim_start_matches('/');
        let relative = Path::new(relative);

        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(ProofrunError::NotFound(format!(
                "file '{}' in run '{}'",
                relative.display(),
                run.name
            )));
        }

        let mut path = run.path.join(&self.html_dir).join(relative);
        if self.fs.is_dir(&path) {
            path = path.join("index.html");
        }

        if !self.fs.is_file(&path) {
            return Err(ProofrunError::NotFound(format!(
                "file '{}' in run '{}'",
                relative.display(),
                run.name
            )));
        }
        Ok(path)
    }

    pub fn remove(&self, path: &Path) -> Result<()> {
        self.fs.remove_dir_all(path).map_err(ProofrunError::from)
    }

    fn run_dirs(&self) -> Result<Vec<(String, PathBuf)>> {
        if !self.fs.is_dir(&self.runs_root) {
            return Ok(Vec::new());
        }

        let dirs = self
            .fs
            .read_dir(&self.runs_root)?
            .into_iter()
            .filter(|p| self.fs.is_dir(p))
            .filter_map(|p| {
                let name = p.file_name()?.to_str()?.to_string();
                is_valid_run_id(&name).then_some((name, p))
            })
            .collect();
        Ok(dirs)
    }

    fn start_time_of(&self, run_dir: &Path) -> DateTime<Utc> {
        match self.descriptor_start_time(run_dir) {
            Ok(t) => t,
            Err(err) => {
                debug!(dir = ?run_dir, error = %err, "no usable run descriptor; using directory time");
                match self.fs.created(run_dir) {
                    Ok(t) => DateTime::<Utc>::from(t),
                    Err(err) => {
                        warn!(dir = ?run_dir, error = %err, "cannot read run directory timestamps");
                        DateTime::<Utc>::from(SystemTime::UNIX_EPOCH)
                    }
                }
            }
        }
    }

    fn descriptor_start_time(&self, run_dir: &Path) -> anyhow::Result<DateTime<Utc>> {
        let raw = self.fs.read_to_string(&run_dir.join(&self.run_descriptor))?;
        let descriptor: RunDescriptor = serde_json::from_str(&raw)?;
        let naive = NaiveDateTime::parse_from_str(&descriptor.start_time, &self.start_time_format)?;
        Ok(naive.and_utc())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RawConfigFile;
    use crate::fs::mock::MockFileSystem;

    const ROOT: &str = "/proofs/output/litani/runs";

    fn catalog(fs: &MockFileSystem) -> RunCatalog {
        let mut raw = RawConfigFile::default();
        raw.runner.proof_root = PathBuf::from("/proofs");
        let cfg = ConfigFile::try_from(raw).unwrap();
        RunCatalog::new(Arc::new(fs.clone()), &cfg)
    }

    #[test]
    fn missing_runs_root_lists_nothing() {
        let fs = MockFileSystem::new();
        let runs = catalog(&fs).list().unwrap();
        assert!(runs.is_empty());
    }

    #[test]
    fn runs_are_sorted_newest_first() {
        let fs = MockFileSystem::new();
        fs.add_file(
            format!("{ROOT}/aaa/run.json"),
            r#"{"start_time": "2024-03-01T10:00:00Z", "status": "success"}"#,
        );
        fs.add_file(
            format!("{ROOT}/bbb/run.json"),
            r#"{"start_time": "2024-03-02T09:30:00Z"}"#,
        );

        let runs = catalog(&fs).list().unwrap();
        let names: Vec<_> = runs.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["bbb", "aaa"]);
        assert_eq!(runs[0].start_time.to_rfc3339(), "2024-03-02T09:30:00+00:00");
    }

    #[test]
    fn unreadable_descriptor_falls_back_to_directory_time() {
        let fs = MockFileSystem::new();
        fs.add_file(format!("{ROOT}/broken/run.json"), "not json");
        fs.set_created(format!("{ROOT}/broken"), 1_700_000_000);
        fs.add_dir(format!("{ROOT}/bare"));
        fs.set_created(format!("{ROOT}/bare"), 1_600_000_000);

        let runs = catalog(&fs).list().unwrap();
        assert_eq!(runs[0].name, "broken");
        assert_eq!(runs[0].start_time.timestamp(), 1_700_000_000);
        assert_eq!(runs[1].start_time.timestamp(), 1_600_000_000);
    }

    #[test]
    fn stray_files_and_odd_names_are_not_runs() {
        let fs = MockFileSystem::new();
        fs.add_file(format!("{ROOT}/notes.txt"), "x");
        fs.add_dir(format!("{ROOT}/.hidden"));
        fs.add_dir(format!("{ROOT}/r1"));

        let cat = catalog(&fs);
        assert_eq!(cat.count().unwrap(), 1);
    }

    #[test]
    fn latest_alias_and_unknown_ids() {
        let fs = MockFileSystem::new();
        fs.add_dir(format!("{ROOT}/r1"));
        let cat = catalog(&fs);

        assert_eq!(cat.get("latest").unwrap().name, "r1");
        assert!(matches!(cat.get("r2"), Err(ProofrunError::NotFound(_))));
        assert!(matches!(cat.run_dir("../r1"), Err(ProofrunError::NotFound(_))));
    }

    #[test]
    fn reserved_names_are_not_runs() {
        let fs = MockFileSystem::new();
        fs.add_dir(format!("{ROOT}/current"));
        fs.add_dir(format!("{ROOT}/Latest"));
        fs.add_dir(format!("{ROOT}/r1"));
        let cat = catalog(&fs);

        assert!(!is_valid_run_id("current"));
        assert!(!is_valid_run_id("LATEST"));
        assert!(is_valid_run_id("current-1"));

        let names: Vec<_> = cat.list().unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["r1"]);
        assert!(matches!(cat.run_dir("current"), Err(ProofrunError::NotFound(_))));
    }

    #[test]
    fn artifact_paths_stay_inside_the_run() {
        let fs = MockFileSystem::new();
        fs.add_file(format!("{ROOT}/r1/html/index.html"), "<html/>");
        fs.add_file(format!("{ROOT}/r1/html/proofs/foo.html"), "<html/>");
        fs.add_file(format!("{ROOT}/secret.txt"), "x");
        let cat = catalog(&fs);

        assert_eq!(
            cat.artifact_path("r1", "").unwrap(),
            PathBuf::from(format!("{ROOT}/r1/html/index.html"))
        );
        assert!(cat.artifact_path("r1", "proofs/foo.html").is_ok());
        assert!(matches!(
            cat.artifact_path("r1", "../../secret.txt"),
            Err(ProofrunError::NotFound(_))
        ));
        assert!(matches!(
            cat.artifact_path("r1", "missing.html"),
            Err(ProofrunError::NotFound(_))
        ));
    }
}
