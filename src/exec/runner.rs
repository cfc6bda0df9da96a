// src/exec/runner.rs

//! Launch and babysit one verification process.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::engine::{ExitClass, Generation};
use crate::exec::supervisor::SupervisorMessage;

/// Upper bound on waiting for the output pipes to close after the process
/// exited. A straggler that inherited stdout would otherwise keep the task
/// alive forever.
const PIPE_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything needed to launch one run.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub generation: Generation,
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub output_path: PathBuf,
    pub stderr_tail_lines: usize,
    pub kill_grace: Duration,
}

/// Handle the supervisor keeps for a launched process.
#[derive(Debug)]
pub struct LaunchedProcess {
    pub pid: Option<u32>,
    pub cancel: oneshot::Sender<()>,
    pub handle: JoinHandle<()>,
}

/// Spawn the external process with stdout going into a freshly truncated
/// output buffer, then hand its lifetime to a background task.
///
/// The background task always ends by sending exactly one
/// `SupervisorMessage::Exited` for `spec.generation`, whatever the exit path.
pub async fn launch(
    spec: LaunchSpec,
    supervisor_tx: mpsc::Sender<SupervisorMessage>,
) -> Result<LaunchedProcess> {
    if let Some(parent) = spec.output_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating output dir {:?}", parent))?;
    }
    let buffer = File::create(&spec.output_path)
        .await
        .with_context(|| format!("creating output buffer {:?}", spec.output_path))?;

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .current_dir(&spec.working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    // Own process group, so the whole tree can be signalled at once.
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning '{}' in {:?}", spec.program, spec.working_dir))?;

    let pid = child.id();
    info!(
        generation = spec.generation,
        pid,
        program = %spec.program,
        cwd = ?spec.working_dir,
        "verification process started"
    );

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let drain = tokio::spawn(drain_stdout(spec.generation, stdout, buffer));
    let stderr_tail = tokio::spawn(collect_stderr(
        spec.generation,
        stderr,
        spec.stderr_tail_lines,
    ));

    let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(supervise(
        spec,
        child,
        pid,
        cancel_rx,
        drain,
        stderr_tail,
        supervisor_tx,
    ));

    Ok(LaunchedProcess {
        pid,
        cancel: cancel_tx,
        handle,
    })
}

/// Completion handler: wait for exit (or cancellation), flush output, report.
async fn supervise(
    spec: LaunchSpec,
    mut child: Child,
    pid: Option<u32>,
    mut cancel_rx: oneshot::Receiver<()>,
    drain: JoinHandle<()>,
    stderr_tail: JoinHandle<Vec<String>>,
    supervisor_tx: mpsc::Sender<SupervisorMessage>,
) {
    let generation = spec.generation;
    let mut cancel_open = true;

    let status = loop {
        tokio::select! {
            status = child.wait() => break status,

            cancel = &mut cancel_rx, if cancel_open => {
                match cancel {
                    Ok(()) => break terminate_and_wait(&mut child, pid, generation, spec.kill_grace).await,
                    Err(_) => {
                        // Supervisor dropped its handle; keep waiting for a
                        // natural exit.
                        debug!(generation, "cancel channel closed without cancellation");
                        cancel_open = false;
                    }
                }
            }
        }
    };

    let exit = match status {
        Ok(status) => ExitClass::from_status(&status),
        Err(e) => {
            error!(generation, pid, error = %e, "failed to wait for verification process");
            ExitClass::Failed(-1)
        }
    };

    // Stdout must be fully written before the task is reported as gone:
    // tailers stop once they see the idle state.
    let drain_abort = drain.abort_handle();
    if timeout(PIPE_DRAIN_TIMEOUT, drain).await.is_err() {
        warn!(
            generation,
            pid, "stdout still open after process exit; killing leftovers and closing buffer"
        );
        #[cfg(unix)]
        {
            if let Some(pid) = pid {
                crate::exec::terminate::kill_tree(pid);
            }
        }
        drain_abort.abort();
    }

    let stderr_tail = match timeout(PIPE_DRAIN_TIMEOUT, stderr_tail).await {
        Ok(Ok(lines)) => lines,
        _ => Vec::new(),
    };

    if supervisor_tx
        .send(SupervisorMessage::Exited {
            generation,
            exit,
            stderr_tail,
        })
        .await
        .is_err()
    {
        warn!(generation, "supervisor gone; dropping exit report");
    }
}

async fn terminate_and_wait(
    child: &mut Child,
    pid: Option<u32>,
    generation: Generation,
    grace: Duration,
) -> std::io::Result<ExitStatus> {
    info!(generation, pid, "cancellation requested; terminating process tree");

    #[cfg(unix)]
    {
        match pid {
            Some(pid) => {
                crate::exec::terminate::terminate_tree(pid);
            }
            None => debug!(generation, "process already reaped before termination"),
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = child.start_kill() {
            warn!(generation, error = %e, "failed to kill verification process");
        }
    }

    match timeout(grace, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
            warn!(
                generation,
                pid,
                grace_secs = grace.as_secs(),
                "process tree ignored SIGTERM; sending SIGKILL"
            );
            #[cfg(unix)]
            {
                if let Some(pid) = pid {
                    crate::exec::terminate::kill_tree(pid);
                }
            }
            if let Err(e) = child.start_kill() {
                debug!(generation, error = %e, "start_kill after SIGKILL");
            }
            child.wait().await
        }
    }
}

/// Single writer of the output buffer: copy stdout chunk by chunk, flushing
/// each one so tailers see it immediately.
async fn drain_stdout(generation: Generation, stdout: Option<ChildStdout>, mut buffer: File) {
    let Some(mut stdout) = stdout else {
        warn!(generation, "no stdout pipe available");
        return;
    };

    let mut chunk = vec![0u8; 8 * 1024];
    let mut total = 0usize;
    loop {
        let n = match stdout.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                warn!(generation, error = %e, "error reading process stdout");
                break;
            }
        };

        if let Err(e) = buffer.write_all(&chunk[..n]).await {
            error!(generation, error = %e, "error writing output buffer");
            break;
        }
        if let Err(e) = buffer.flush().await {
            error!(generation, error = %e, "error flushing output buffer");
            break;
        }
        total += n;
    }

    if let Err(e) = buffer.sync_all().await {
        debug!(generation, error = %e, "sync of output buffer failed");
    }
    debug!(generation, bytes = total, "stdout drained");
}

/// Log stderr at debug and keep the last `keep` lines for the failure report.
async fn collect_stderr(
    generation: Generation,
    stderr: Option<ChildStderr>,
    keep: usize,
) -> Vec<String> {
    let Some(stderr) = stderr else {
        return Vec::new();
    };

    let mut tail = VecDeque::with_capacity(keep);
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(generation, "stderr: {}", line);
        if keep == 0 {
            continue;
        }
        if tail.len() == keep {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail.into()
}
