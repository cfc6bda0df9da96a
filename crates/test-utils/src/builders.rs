#![allow(dead_code)]

use std::path::Path;

use proofrun::config::{ConfigFile, RawConfigFile};
use proofrun::types::WatchMode;

/// Builder for `ConfigFile` with test-friendly (short) timings.
pub struct ConfigBuilder {
    config: RawConfigFile,
}

impl ConfigBuilder {
    pub fn new(proof_root: &Path) -> Self {
        let mut config = RawConfigFile::default();
        config.server.bind = "127.0.0.1:0".to_string();
        config.runner.proof_root = proof_root.to_path_buf();
        config.runner.startup_timeout_secs = 5;
        config.runner.bookkeeping_poll_ms = 20;
        config.runner.kill_grace_secs = 2;
        config.output.poll_ms = 20;
        Self { config }
    }

    /// Run `sh <script>` inside the proof root.
    pub fn with_script(mut self, script: &str) -> Self {
        self.config.runner.program = "sh".to_string();
        self.config.runner.args = vec![script.to_string()];
        self
    }

    pub fn with_program(mut self, program: &str, args: &[&str]) -> Self {
        self.config.runner.program = program.to_string();
        self.config.runner.args = args.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_startup_timeout_secs(mut self, secs: u64) -> Self {
        self.config.runner.startup_timeout_secs = secs;
        self
    }

    pub fn with_kill_grace_secs(mut self, secs: u64) -> Self {
        self.config.runner.kill_grace_secs = secs;
        self
    }

    pub fn with_watch_mode(mut self, mode: WatchMode) -> Self {
        self.config.output.watch_mode = mode;
        self
    }

    pub fn with_api_prefix(mut self, prefix: &str) -> Self {
        self.config.server.api_prefix = prefix.to_string();
        self
    }

    pub fn raw(&self) -> &RawConfigFile {
        &self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}
