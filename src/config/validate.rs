// src/config/validate.rs

use std::net::SocketAddr;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{ProofrunError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = ProofrunError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let bind = validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(bind, raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<SocketAddr> {
    let bind = validate_server(cfg)?;
    validate_runner(cfg)?;
    validate_intervals(cfg)?;
    validate_reports(cfg)?;
    Ok(bind)
}

fn validate_server(cfg: &RawConfigFile) -> Result<SocketAddr> {
    let prefix = &cfg.server.api_prefix;
    if !prefix.is_empty() && (!prefix.starts_with('/') || prefix.ends_with('/')) {
        return Err(ProofrunError::ConfigError(format!(
            "[server].api_prefix must start with '/' and not end with '/' (got '{prefix}')"
        )));
    }

    cfg.server.bind.parse::<SocketAddr>().map_err(|e| {
        ProofrunError::ConfigError(format!(
            "[server].bind is not a socket address ('{}'): {e}",
            cfg.server.bind
        ))
    })
}

fn validate_runner(cfg: &RawConfigFile) -> Result<()> {
    if cfg.runner.program.trim().is_empty() {
        return Err(ProofrunError::ConfigError(
            "[runner].program must not be empty".to_string(),
        ));
    }

    if cfg.runner.runs_dir.as_os_str().is_empty() {
        return Err(ProofrunError::ConfigError(
            "[runner].runs_dir must not be empty".to_string(),
        ));
    }

    // The buffer must not live inside a run directory, or the catalog would
    // pick it up as a run.
    if cfg.runner.output_file.starts_with(&cfg.runner.runs_dir) {
        return Err(ProofrunError::ConfigError(format!(
            "[runner].output_file ({:?}) must not be inside runs_dir ({:?})",
            cfg.runner.output_file, cfg.runner.runs_dir
        )));
    }

    Ok(())
}

fn validate_intervals(cfg: &RawConfigFile) -> Result<()> {
    let checks = [
        ("[runner].bookkeeping_poll_ms", cfg.runner.bookkeeping_poll_ms),
        ("[runner].startup_timeout_secs", cfg.runner.startup_timeout_secs),
        ("[output].poll_ms", cfg.output.poll_ms),
    ];

    for (name, value) in checks {
        if value == 0 {
            return Err(ProofrunError::ConfigError(format!(
                "{name} must be >= 1 (got 0)"
            )));
        }
    }

    Ok(())
}

fn validate_reports(cfg: &RawConfigFile) -> Result<()> {
    if !cfg.reports.proof_report_dir.contains("{proof}") {
        return Err(ProofrunError::ConfigError(format!(
            "[reports].proof_report_dir must contain '{{proof}}' (got '{}')",
            cfg.reports.proof_report_dir
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = ConfigFile::try_from(RawConfigFile::default()).unwrap();
        assert_eq!(cfg.bind.port(), 8000);
        assert_eq!(cfg.runs_root(), std::path::Path::new("proofs/output/litani/runs"));
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let mut raw = RawConfigFile::default();
        raw.output.poll_ms = 0;

        match ConfigFile::try_from(raw) {
            Err(ProofrunError::ConfigError(msg)) => assert!(msg.contains("[output].poll_ms")),
            other => panic!("expected ConfigError, got {other:?}"),
        }
    }

    #[test]
    fn report_template_needs_placeholder() {
        let mut raw = RawConfigFile::default();
        raw.reports.proof_report_dir = "artifacts/report".to_string();
        assert!(matches!(
            ConfigFile::try_from(raw),
            Err(ProofrunError::ConfigError(_))
        ));
    }

    #[test]
    fn output_file_inside_runs_dir_is_rejected() {
        let mut raw = RawConfigFile::default();
        raw.runner.output_file = raw.runner.runs_dir.join("out.log");
        assert!(matches!(
            ConfigFile::try_from(raw),
            Err(ProofrunError::ConfigError(_))
        ));
    }
}
