// src/orchestrator.rs

//! Facade composing the supervisor, run catalog, result reader, output
//! broadcaster and archive service into the externally visible operations.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::archive::{ArchiveService, RunArchive};
use crate::config::ConfigFile;
use crate::errors::{ProofrunError, Result};
use crate::exec::{spawn_supervisor, StartTicket, SupervisorHandle, SupervisorSettings};
use crate::fs::FileSystem;
use crate::output::{ChangeWaiter, IntervalWaiter, OutputBroadcaster, OutputSubscription};
use crate::runs::{ResultReader, RunCatalog, RunInfo, VerificationResult};
use crate::types::ArchiveFormat;

/// Body of the status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TaskStatus {
    pub is_running: bool,
}

/// Cheaply cloneable handle shared by all request handlers.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    supervisor: SupervisorHandle,
    catalog: RunCatalog,
    results: ResultReader,
    archives: ArchiveService,
    output: OutputBroadcaster,
    startup_timeout: Duration,
    bookkeeping_poll: Duration,
}

impl Orchestrator {
    /// Build every component and spawn the supervisor actor.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(cfg: &ConfigFile, fs: Arc<dyn FileSystem>) -> Self {
        let catalog = RunCatalog::new(Arc::clone(&fs), cfg);
        let supervisor = spawn_supervisor(SupervisorSettings::from_config(cfg), catalog.clone());
        let results = ResultReader::new(fs, catalog.clone(), cfg);
        let archives = ArchiveService::new(catalog.clone(), supervisor.subscribe_state());
        let output = OutputBroadcaster::new(
            cfg.output_path(),
            supervisor.subscribe_state(),
            cfg.output.watch_mode,
            cfg.output_poll(),
        );

        Self {
            inner: Arc::new(Inner {
                supervisor,
                catalog,
                results,
                archives,
                output,
                startup_timeout: cfg.startup_timeout(),
                bookkeeping_poll: cfg.bookkeeping_poll(),
            }),
        }
    }

    /// Start a run and wait until the batch runner has registered it.
    ///
    /// If registration does not happen within the startup timeout the
    /// process is left running (and cancellable) and `StartupTimeout` is
    /// returned.
    pub async fn start(&self) -> Result<RunInfo> {
        let ticket = self.inner.supervisor.start().await?;
        let run = self.wait_for_new_run(&ticket).await?;
        info!(
            generation = ticket.generation,
            pid = ticket.pid,
            run_id = %run.name,
            "verification run registered"
        );
        Ok(run)
    }

    async fn wait_for_new_run(&self, ticket: &StartTicket) -> Result<RunInfo> {
        let waiter = IntervalWaiter::new(self.inner.bookkeeping_poll);
        let deadline = Instant::now() + self.inner.startup_timeout;

        loop {
            // Sample liveness before counting: a process that registers its
            // run and exits right away must still count as registered.
            let live = self.inner.supervisor.status().generation() == Some(ticket.generation);

            if self.inner.catalog.count()? > ticket.baseline_runs {
                return self
                    .inner
                    .catalog
                    .latest()?
                    .ok_or_else(|| ProofrunError::NotFound("newly started run".to_string()));
            }

            if !live {
                return Err(ProofrunError::UpstreamFailure(
                    "verification process exited before registering a run".to_string(),
                ));
            }

            if Instant::now() >= deadline {
                warn!(
                    generation = ticket.generation,
                    timeout_secs = self.inner.startup_timeout.as_secs(),
                    "no run registered in time; process left running"
                );
                return Err(ProofrunError::StartupTimeout(self.inner.startup_timeout));
            }

            waiter.wait().await;
        }
    }

    pub fn status(&self) -> TaskStatus {
        TaskStatus {
            is_running: self.inner.supervisor.is_running(),
        }
    }

    pub async fn cancel(&self) -> Result<()> {
        self.inner.supervisor.cancel().await
    }

    pub fn list(&self) -> Result<Vec<RunInfo>> {
        self.inner.catalog.list()
    }

    pub fn result(&self, proof: &str) -> Result<VerificationResult> {
        self.inner.results.result(proof)
    }

    pub async fn archive(&self, run_id: &str, format: ArchiveFormat) -> Result<RunArchive> {
        self.inner.archives.archive(run_id, format).await
    }

    pub fn delete(&self, run_id: &str) -> Result<()> {
        self.inner.archives.delete(run_id)
    }

    pub async fn subscribe_output(&self) -> OutputSubscription {
        self.inner.output.subscribe().await
    }

    pub fn artifact_path(&self, run_id: &str, relative: &str) -> Result<PathBuf> {
        self.inner.catalog.artifact_path(run_id, relative)
    }

    /// Terminate a live run and wait up to `limit` for it to be cleared.
    pub async fn shutdown(&self, limit: Duration) {
        self.inner.supervisor.shutdown(limit).await
    }
}
