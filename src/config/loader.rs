// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Environment variable overriding `[runner].proof_root`.
pub const PROOF_ROOT_ENV: &str = "PROOFRUN_PROOF_ROOT";
/// Environment variable overriding `[server].bind`.
pub const BIND_ENV: &str = "PROOFRUN_BIND";

/// Load a configuration file and return the raw, unvalidated model.
///
/// A missing file is not an error: every section has defaults, so an absent
/// config simply yields `RawConfigFile::default()`.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    if !path.exists() {
        debug!(?path, "config file not found; using defaults");
        return Ok(RawConfigFile::default());
    }

    let contents = fs::read_to_string(path)?;
    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

fn apply_overrides_from(raw: &mut RawConfigFile, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(root) = lookup(PROOF_ROOT_ENV).filter(|s| !s.is_empty()) {
        raw.runner.proof_root = PathBuf::from(root);
    }
    if let Some(bind) = lookup(BIND_ENV).filter(|s| !s.is_empty()) {
        raw.server.bind = bind;
    }
}

/// Load, apply environment overrides, then `bind` from the command line,
/// and validate.
pub fn load_and_validate(path: impl AsRef<Path>, bind: Option<&str>) -> Result<ConfigFile> {
    load_with(path.as_ref(), bind, |key| std::env::var(key).ok())
}

fn load_with(
    path: &Path,
    bind: Option<&str>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<ConfigFile> {
    let mut raw = load_from_path(path)?;
    apply_overrides_from(&mut raw, lookup);
    if let Some(bind) = bind {
        raw.server.bind = bind.to_string();
    }
    ConfigFile::try_from(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_overrides_replace_file_values() {
        let mut raw = RawConfigFile::default();
        apply_overrides_from(&mut raw, |key| match key {
            PROOF_ROOT_ENV => Some("/srv/proofs".to_string()),
            BIND_ENV => Some("0.0.0.0:9000".to_string()),
            _ => None,
        });

        assert_eq!(raw.runner.proof_root, PathBuf::from("/srv/proofs"));
        assert_eq!(raw.server.bind, "0.0.0.0:9000");
    }

    #[test]
    fn empty_override_is_ignored() {
        let mut raw = RawConfigFile::default();
        apply_overrides_from(&mut raw, |_| Some(String::new()));
        assert_eq!(raw.runner.proof_root, PathBuf::from("proofs"));
    }

    #[test]
    fn cli_bind_wins_over_env_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Proofrun.toml");
        fs::write(&path, "[server]\nbind = \"127.0.0.1:7000\"\n").unwrap();

        let env = |key: &str| (key == BIND_ENV).then(|| "127.0.0.1:8000".to_string());

        let cfg = load_with(&path, None, env).unwrap();
        assert_eq!(cfg.bind.port(), 8000);

        let cfg = load_with(&path, Some("127.0.0.1:9000"), env).unwrap();
        assert_eq!(cfg.bind.port(), 9000);
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_with(&dir.path().join("absent.toml"), None, |_| None).unwrap();
        assert_eq!(cfg.runner.program, RawConfigFile::default().runner.program);
    }
}
