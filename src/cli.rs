// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `proofrun`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "proofrun",
    version,
    about = "Serve, supervise and archive bounded-model-checking proof runs.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Proofrun.toml` in the current working directory. A missing
    /// file means "all defaults".
    #[arg(long, value_name = "PATH", default_value = "Proofrun.toml")]
    pub config: String,

    /// Listen address, overriding `[server].bind` and `PROOFRUN_BIND`.
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PROOFRUN_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Load and validate the configuration, print it, and exit.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_flags() {
        let args = CliArgs::try_parse_from(["proofrun"]).unwrap();
        assert_eq!(args.config, "Proofrun.toml");
        assert!(args.bind.is_none());
        assert!(!args.dry_run);
    }

    #[test]
    fn all_flags_parse() {
        let args = CliArgs::try_parse_from([
            "proofrun",
            "--config",
            "ci/Proofrun.toml",
            "--bind",
            "0.0.0.0:9000",
            "--log-level",
            "debug",
            "--dry-run",
        ])
        .unwrap();
        assert_eq!(args.config, "ci/Proofrun.toml");
        assert_eq!(args.bind.as_deref(), Some("0.0.0.0:9000"));
        assert!(matches!(args.log_level, Some(LogLevel::Debug)));
        assert!(args.dry_run);
    }
}
