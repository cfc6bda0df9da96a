// src/engine/mod.rs

//! Verification task state machine.
//!
//! The pure core in [`core`] decides what happens for each
//! [`SupervisorEvent`]; the async actor in `exec::supervisor` feeds it events
//! and carries out the returned [`CoreCommand`]s (spawning, signalling,
//! logging).

use std::process::ExitStatus;

use chrono::{DateTime, Utc};

/// Monotonic counter identifying one started process.
///
/// Exit reports carry the generation they belong to, so a late or duplicate
/// report can never clear a newer task.
pub type Generation = u64;

/// How a verification process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitClass {
    /// Exit code zero.
    Success,
    /// Non-zero exit code. Partial results may still be on disk.
    Failed(i32),
    /// Killed by the given signal (normally a user cancellation).
    Cancelled(i32),
}

impl ExitClass {
    pub fn from_status(status: &ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return if code == 0 {
                ExitClass::Success
            } else {
                ExitClass::Failed(code)
            };
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return ExitClass::Cancelled(signal);
            }
        }

        ExitClass::Failed(-1)
    }
}

/// Externally visible task state, published by the supervisor actor.
///
/// `Running` holds exactly while an external verification process is alive
/// (or its output is still being flushed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Idle,
    Running {
        generation: Generation,
        pid: Option<u32>,
        started_at: DateTime<Utc>,
    },
}

impl TaskState {
    pub fn is_running(&self) -> bool {
        matches!(self, TaskState::Running { .. })
    }

    pub fn generation(&self) -> Option<Generation> {
        match self {
            TaskState::Running { generation, .. } => Some(*generation),
            TaskState::Idle => None,
        }
    }
}

/// Events flowing into the supervisor core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    /// A client asked for a new run.
    StartRequested,
    /// The process for `generation` could not be spawned.
    SpawnFailed { generation: Generation },
    /// A client asked to cancel the live run.
    CancelRequested,
    /// The process for `generation` exited and its output was flushed.
    ProcessExited {
        generation: Generation,
        exit: ExitClass,
    },
}

pub mod core;

pub use self::core::{CoreCommand, CoreReply, CoreState, CoreStep, Rejection, SupervisorCore};
