// src/config/model.rs

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::types::WatchMode;

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [server]
/// bind = "0.0.0.0:8000"
///
/// [runner]
/// proof_root = "/data/proofs"
/// program = "python3"
/// args = ["run-cbmc-proofs.py"]
///
/// [output]
/// watch_mode = "notify"
/// ```
///
/// Every section is optional and has defaults matching a stock
/// cbmc-starter-kit + litani checkout.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub runner: RunnerSection,

    #[serde(default)]
    pub output: OutputSection,

    #[serde(default)]
    pub reports: ReportsSection,
}

/// `[server]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Prefix under which the task API is mounted.
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_api_prefix() -> String {
    "/api/v1".to_string()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            api_prefix: default_api_prefix(),
        }
    }
}

/// `[runner]` section: how the external batch runner is launched and where
/// it leaves its bookkeeping.
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerSection {
    /// Working directory of the batch runner.
    #[serde(default = "default_proof_root")]
    pub proof_root: PathBuf,

    #[serde(default = "default_program")]
    pub program: String,

    #[serde(default = "default_args")]
    pub args: Vec<String>,

    /// One subdirectory per run, relative to `proof_root`.
    #[serde(default = "default_runs_dir")]
    pub runs_dir: PathBuf,

    /// Output buffer file, relative to `proof_root`.
    #[serde(default = "default_output_file")]
    pub output_file: PathBuf,

    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    #[serde(default = "default_bookkeeping_poll_ms")]
    pub bookkeeping_poll_ms: u64,

    /// Grace period between SIGTERM and SIGKILL on cancellation.
    #[serde(default = "default_kill_grace_secs")]
    pub kill_grace_secs: u64,

    /// How many trailing stderr lines are kept for the failure log.
    #[serde(default = "default_stderr_tail_lines")]
    pub stderr_tail_lines: usize,
}

fn default_proof_root() -> PathBuf {
    PathBuf::from("proofs")
}

fn default_program() -> String {
    "python3".to_string()
}

fn default_args() -> Vec<String> {
    vec!["run-cbmc-proofs.py".to_string()]
}

fn default_runs_dir() -> PathBuf {
    PathBuf::from("output/litani/runs")
}

fn default_output_file() -> PathBuf {
    PathBuf::from("output/proofrun-output.log")
}

fn default_startup_timeout_secs() -> u64 {
    120
}

fn default_bookkeeping_poll_ms() -> u64 {
    500
}

fn default_kill_grace_secs() -> u64 {
    10
}

fn default_stderr_tail_lines() -> usize {
    50
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            proof_root: default_proof_root(),
            program: default_program(),
            args: default_args(),
            runs_dir: default_runs_dir(),
            output_file: default_output_file(),
            startup_timeout_secs: default_startup_timeout_secs(),
            bookkeeping_poll_ms: default_bookkeeping_poll_ms(),
            kill_grace_secs: default_kill_grace_secs(),
            stderr_tail_lines: default_stderr_tail_lines(),
        }
    }
}

/// `[output]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct OutputSection {
    #[serde(default = "default_output_poll_ms")]
    pub poll_ms: u64,

    #[serde(default)]
    pub watch_mode: WatchMode,
}

fn default_output_poll_ms() -> u64 {
    100
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            poll_ms: default_output_poll_ms(),
            watch_mode: WatchMode::default(),
        }
    }
}

/// `[reports]` section: the layout the batch runner leaves inside each run
/// directory.
#[derive(Debug, Clone, Deserialize)]
pub struct ReportsSection {
    #[serde(default = "default_html_dir")]
    pub html_dir: PathBuf,

    #[serde(default = "default_run_descriptor")]
    pub run_descriptor: String,

    /// `chrono` format of the `start_time` field in the run descriptor.
    #[serde(default = "default_start_time_format")]
    pub start_time_format: String,

    /// Per-proof report directory inside a run; `{proof}` is substituted.
    #[serde(default = "default_proof_report_dir")]
    pub proof_report_dir: String,

    #[serde(default = "default_result_file")]
    pub result_file: String,

    #[serde(default = "default_coverage_file")]
    pub coverage_file: String,
}

fn default_html_dir() -> PathBuf {
    PathBuf::from("html")
}

fn default_run_descriptor() -> String {
    "run.json".to_string()
}

fn default_start_time_format() -> String {
    "%Y-%m-%dT%H:%M:%SZ".to_string()
}

fn default_proof_report_dir() -> String {
    "artifacts/{proof}/report/json".to_string()
}

fn default_result_file() -> String {
    "viewer-result.json".to_string()
}

fn default_coverage_file() -> String {
    "viewer-coverage.json".to_string()
}

impl Default for ReportsSection {
    fn default() -> Self {
        Self {
            html_dir: default_html_dir(),
            run_descriptor: default_run_descriptor(),
            start_time_format: default_start_time_format(),
            proof_report_dir: default_proof_report_dir(),
            result_file: default_result_file(),
            coverage_file: default_coverage_file(),
        }
    }
}

/// Validated configuration used by the rest of the crate.
///
/// Obtained through `ConfigFile::try_from(RawConfigFile)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub bind: SocketAddr,
    pub server: ServerSection,
    pub runner: RunnerSection,
    pub output: OutputSection,
    pub reports: ReportsSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(bind: SocketAddr, raw: RawConfigFile) -> Self {
        Self {
            bind,
            server: raw.server,
            runner: raw.runner,
            output: raw.output,
            reports: raw.reports,
        }
    }

    pub fn proof_root(&self) -> &Path {
        &self.runner.proof_root
    }

    /// Directory holding one subdirectory per run.
    pub fn runs_root(&self) -> PathBuf {
        self.runner.proof_root.join(&self.runner.runs_dir)
    }

    pub fn output_path(&self) -> PathBuf {
        self.runner.proof_root.join(&self.runner.output_file)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.runner.startup_timeout_secs)
    }

    pub fn bookkeeping_poll(&self) -> Duration {
        Duration::from_millis(self.runner.bookkeeping_poll_ms)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_secs(self.runner.kill_grace_secs)
    }

    pub fn output_poll(&self) -> Duration {
        Duration::from_millis(self.output.poll_ms)
    }
}
