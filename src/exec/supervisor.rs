// src/exec/supervisor.rs

//! Single-owner actor around the verification task.
//!
//! All start / cancel / exit handling is serialised through one mpsc channel
//! and one Tokio task, so two concurrent `start()` calls can never both see
//! "no task". Readers (`status()`, output tailers) observe the state through
//! a `watch` channel and never wait on the actor.

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::config::ConfigFile;
use crate::engine::{
    CoreCommand, CoreReply, ExitClass, Generation, Rejection, SupervisorCore, SupervisorEvent,
    TaskState,
};
use crate::errors::{ProofrunError, Result};
use crate::exec::runner::{launch, LaunchSpec, LaunchedProcess};
use crate::runs::RunCatalog;

/// Messages handled by the supervisor actor.
#[derive(Debug)]
pub enum SupervisorMessage {
    Start {
        reply: oneshot::Sender<Result<StartTicket>>,
    },
    Cancel {
        reply: oneshot::Sender<Result<()>>,
    },
    /// Sent once per launched process by its completion handler.
    Exited {
        generation: Generation,
        exit: ExitClass,
        stderr_tail: Vec<String>,
    },
}

/// What a successful start hands back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartTicket {
    pub generation: Generation,
    pub pid: Option<u32>,
    /// Number of run directories observed immediately before spawning.
    pub baseline_runs: usize,
}

/// Launch parameters taken from the config.
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub output_path: PathBuf,
    pub stderr_tail_lines: usize,
    pub kill_grace: Duration,
}

impl SupervisorSettings {
    pub fn from_config(cfg: &ConfigFile) -> Self {
        Self {
            program: cfg.runner.program.clone(),
            args: cfg.runner.args.clone(),
            working_dir: cfg.runner.proof_root.clone(),
            output_path: cfg.output_path(),
            stderr_tail_lines: cfg.runner.stderr_tail_lines,
            kill_grace: cfg.kill_grace(),
        }
    }
}

/// The live process as seen by the actor.
struct ActiveTask {
    generation: Generation,
    pid: Option<u32>,
    cancel: Option<oneshot::Sender<()>>,
}

/// Cloneable handle used by the rest of the crate.
#[derive(Debug, Clone)]
pub struct SupervisorHandle {
    tx: mpsc::Sender<SupervisorMessage>,
    state: watch::Receiver<TaskState>,
}

impl SupervisorHandle {
    /// Start a new verification process. Fails with `AlreadyRunning` if one
    /// is live; never queues.
    pub async fn start(&self) -> Result<StartTicket> {
        let (reply, rx) = oneshot::channel();
        self.send(SupervisorMessage::Start { reply }).await?;
        rx.await.map_err(|_| supervisor_gone())?
    }

    /// Signal the live process tree. Returns once the signal is dispatched;
    /// the task stays `Running` until its completion handler reports.
    pub async fn cancel(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(SupervisorMessage::Cancel { reply }).await?;
        rx.await.map_err(|_| supervisor_gone())?
    }

    pub fn status(&self) -> TaskState {
        self.state.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        self.state.borrow().is_running()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<TaskState> {
        self.state.clone()
    }

    /// Wait until no task is live, or `limit` elapses. Returns whether the
    /// supervisor is idle.
    pub async fn wait_idle(&self, limit: Duration) -> bool {
        let mut state = self.state.clone();
        let idle = tokio::time::timeout(limit, state.wait_for(|s| !s.is_running())).await;
        matches!(idle, Ok(Ok(_)))
    }

    /// Cancel a live task (if any) and wait for it to be cleared.
    pub async fn shutdown(&self, limit: Duration) {
        match self.cancel().await {
            Ok(()) => info!("cancelling verification task for shutdown"),
            Err(ProofrunError::NotRunning) => return,
            Err(e) => {
                warn!(error = %e, "could not cancel verification task during shutdown");
                return;
            }
        }
        if !self.wait_idle(limit).await {
            warn!("verification task still running at shutdown");
        }
    }

    async fn send(&self, msg: SupervisorMessage) -> Result<()> {
        self.tx.send(msg).await.map_err(|_| supervisor_gone())
    }
}

fn supervisor_gone() -> ProofrunError {
    ProofrunError::Other(anyhow::anyhow!("supervisor task stopped"))
}

/// Spawn the supervisor actor.
///
/// `catalog` is used only to count run directories right before each spawn.
pub fn spawn_supervisor(settings: SupervisorSettings, catalog: RunCatalog) -> SupervisorHandle {
    let (tx, rx) = mpsc::channel::<SupervisorMessage>(32);
    let (state_tx, state_rx) = watch::channel(TaskState::Idle);

    let actor = Supervisor {
        core: SupervisorCore::new(),
        active: None,
        settings,
        catalog,
        state_tx,
        self_tx: tx.downgrade(),
    };
    tokio::spawn(actor.run(rx));

    SupervisorHandle {
        tx,
        state: state_rx,
    }
}

struct Supervisor {
    core: SupervisorCore,
    active: Option<ActiveTask>,
    settings: SupervisorSettings,
    catalog: RunCatalog,
    state_tx: watch::Sender<TaskState>,
    // Weak, so the actor stops once every handle is dropped and no process
    // is left to report.
    self_tx: mpsc::WeakSender<SupervisorMessage>,
}

impl Supervisor {
    async fn run(mut self, mut rx: mpsc::Receiver<SupervisorMessage>) {
        info!("supervisor started");

        while let Some(msg) = rx.recv().await {
            match msg {
                SupervisorMessage::Start { reply } => {
                    let result = self.handle_start().await;
                    let _ = reply.send(result);
                }
                SupervisorMessage::Cancel { reply } => {
                    let _ = reply.send(self.handle_cancel());
                }
                SupervisorMessage::Exited {
                    generation,
                    exit,
                    stderr_tail,
                } => self.handle_exited(generation, exit, stderr_tail),
            }
        }

        info!("supervisor finished (channel closed)");
    }

    async fn handle_start(&mut self) -> Result<StartTicket> {
        let step = self.core.step(SupervisorEvent::StartRequested);
        let generation = match step.reply {
            CoreReply::Started { generation } => generation,
            CoreReply::Rejected(Rejection::AlreadyRunning) => {
                debug!("start refused: task already running");
                return Err(ProofrunError::AlreadyRunning);
            }
            other => {
                return Err(ProofrunError::Other(anyhow::anyhow!(
                    "unexpected core reply to start: {other:?}"
                )));
            }
        };

        let mut ticket = None;
        for command in step.commands {
            if let CoreCommand::Spawn { generation } = command {
                ticket = Some(self.spawn(generation).await);
            }
        }

        ticket.unwrap_or_else(|| {
            self.core.step(SupervisorEvent::SpawnFailed { generation });
            Err(ProofrunError::Other(anyhow::anyhow!(
                "core accepted start without a spawn command"
            )))
        })
    }

    async fn spawn(&mut self, generation: Generation) -> Result<StartTicket> {
        let baseline_runs = match self.catalog.count() {
            Ok(n) => n,
            Err(e) => {
                self.core.step(SupervisorEvent::SpawnFailed { generation });
                return Err(e);
            }
        };

        let Some(tx) = self.self_tx.upgrade() else {
            self.core.step(SupervisorEvent::SpawnFailed { generation });
            return Err(supervisor_gone());
        };

        let spec = LaunchSpec {
            generation,
            program: self.settings.program.clone(),
            args: self.settings.args.clone(),
            working_dir: self.settings.working_dir.clone(),
            output_path: self.settings.output_path.clone(),
            stderr_tail_lines: self.settings.stderr_tail_lines,
            kill_grace: self.settings.kill_grace,
        };

        match launch(spec, tx).await {
            Ok(LaunchedProcess { pid, cancel, handle }) => {
                // The completion handler owns the process from here.
                drop(handle);
                self.active = Some(ActiveTask {
                    generation,
                    pid,
                    cancel: Some(cancel),
                });
                self.state_tx.send_replace(TaskState::Running {
                    generation,
                    pid,
                    started_at: Utc::now(),
                });
                Ok(StartTicket {
                    generation,
                    pid,
                    baseline_runs,
                })
            }
            Err(e) => {
                error!(generation, error = %format!("{e:#}"), "failed to launch verification process");
                self.core.step(SupervisorEvent::SpawnFailed { generation });
                Err(ProofrunError::UpstreamFailure(format!(
                    "failed to launch '{}': {e:#}",
                    self.settings.program
                )))
            }
        }
    }

    fn handle_cancel(&mut self) -> Result<()> {
        let step = self.core.step(SupervisorEvent::CancelRequested);
        match step.reply {
            CoreReply::Cancelling { .. } => {}
            CoreReply::Rejected(Rejection::NotRunning) => return Err(ProofrunError::NotRunning),
            other => {
                return Err(ProofrunError::Other(anyhow::anyhow!(
                    "unexpected core reply to cancel: {other:?}"
                )));
            }
        }

        for command in step.commands {
            if let CoreCommand::Terminate { generation } = command {
                self.signal_active(generation);
            }
        }
        Ok(())
    }

    fn signal_active(&mut self, generation: Generation) {
        let Some(active) = self.active.as_mut().filter(|a| a.generation == generation) else {
            debug!(generation, "no active process for terminate command");
            return;
        };

        match active.cancel.take() {
            Some(cancel) => {
                info!(generation, pid = active.pid, "cancelling verification task");
                if cancel.send(()).is_err() {
                    debug!(generation, "process already finished while cancelling");
                }
            }
            None => debug!(
                generation,
                "cancellation already dispatched; waiting for process exit"
            ),
        }
    }

    fn handle_exited(&mut self, generation: Generation, exit: ExitClass, stderr_tail: Vec<String>) {
        let step = self
            .core
            .step(SupervisorEvent::ProcessExited { generation, exit });

        if step.commands.is_empty() {
            debug!(generation, "ignoring stale exit report");
            return;
        }

        for command in step.commands {
            if let CoreCommand::Report {
                generation,
                exit,
                cancel_requested,
            } = command
            {
                self.active = None;
                self.state_tx.send_replace(TaskState::Idle);
                report_exit(generation, exit, cancel_requested, &stderr_tail);
            }
        }
    }
}

/// Exit classification is logged only: the HTTP call that started the run
/// returned long ago.
fn report_exit(generation: Generation, exit: ExitClass, cancel_requested: bool, stderr: &[String]) {
    match exit {
        ExitClass::Success => info!(generation, "verification task completed"),
        ExitClass::Failed(code) => error!(
            generation,
            exit_code = code,
            stderr = %stderr.join("\n"),
            "verification task failed"
        ),
        ExitClass::Cancelled(signal) if cancel_requested => warn!(
            generation,
            signal, "verification task cancelled by user"
        ),
        ExitClass::Cancelled(signal) => error!(
            generation,
            signal,
            stderr = %stderr.join("\n"),
            "verification task killed by signal"
        ),
    }
}
