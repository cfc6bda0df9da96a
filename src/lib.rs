// src/lib.rs

pub mod archive;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod orchestrator;
pub mod output;
pub mod runs;
pub mod server;
pub mod types;

use anyhow::Result;
use tracing::debug;

use crate::cli::CliArgs;
use crate::config::load_and_validate;
use crate::config::ConfigFile;

pub use crate::orchestrator::Orchestrator;

/// High-level entry point used by `main.rs`.
///
/// Loads the config (file, then `PROOFRUN_*`, then CLI flags), and either
/// prints it (`--dry-run`) or serves the HTTP API until Ctrl-C.
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = resolve_config(&args)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    server::serve(cfg).await
}

fn resolve_config(args: &CliArgs) -> Result<ConfigFile> {
    Ok(load_and_validate(&args.config, args.bind.as_deref())?)
}

/// Print the resolved configuration.
fn print_dry_run(cfg: &ConfigFile) {
    println!("proofrun dry-run");
    println!("  server.bind = {}", cfg.bind);
    println!("  server.api_prefix = {:?}", cfg.server.api_prefix);
    println!();

    println!("runner:");
    println!("  proof_root: {}", cfg.proof_root().display());
    println!(
        "  command: {} {}",
        cfg.runner.program,
        cfg.runner.args.join(" ")
    );
    println!("  runs: {}", cfg.runs_root().display());
    println!("  output buffer: {}", cfg.output_path().display());
    println!(
        "  startup timeout: {}s, bookkeeping poll: {}ms, kill grace: {}s",
        cfg.runner.startup_timeout_secs, cfg.runner.bookkeeping_poll_ms, cfg.runner.kill_grace_secs
    );
    println!();

    println!("output:");
    println!("  poll: {}ms ({:?})", cfg.output.poll_ms, cfg.output.watch_mode);
    println!();

    println!("reports:");
    println!("  html_dir: {}", cfg.reports.html_dir.display());
    println!("  run_descriptor: {}", cfg.reports.run_descriptor);
    println!("  proof_report_dir: {}", cfg.reports.proof_report_dir);

    debug!("dry-run complete (no server started)");
}
