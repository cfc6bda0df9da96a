#![allow(dead_code)]

pub use proofrun_test_utils::fixtures::ProofRoot;
pub use proofrun_test_utils::init_tracing;

pub use proofrun_test_utils::eventually;

use std::sync::Arc;
use std::time::Duration;

use proofrun::config::ConfigFile;
use proofrun::fs::RealFileSystem;
use proofrun::Orchestrator;

/// Generous bound for anything involving a real child process.
pub const PROCESS_TIMEOUT: Duration = Duration::from_secs(20);

pub fn orchestrator(cfg: &ConfigFile) -> Orchestrator {
    Orchestrator::new(cfg, Arc::new(RealFileSystem))
}

/// Wait until the orchestrator reports no live task.
pub async fn wait_idle(orch: &Orchestrator) -> bool {
    eventually(PROCESS_TIMEOUT, || !orch.status().is_running).await
}

/// True if `pid` is a live (non-zombie) process.
#[cfg(target_os = "linux")]
pub fn is_alive(pid: u32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => {
            let state = stat
                .rfind(')')
                .and_then(|i| stat[i + 1..].split_whitespace().next());
            !matches!(state, Some("Z") | Some("X"))
        }
        Err(_) => false,
    }
}
