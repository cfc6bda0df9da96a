// src/engine/core.rs

//! Pure supervisor state machine.
//!
//! `SupervisorCore` has two states, `Idle` and `Running`. It owns no
//! processes, channels or files; it only answers "is this request legal, and
//! what should the shell do about it". That keeps the mutual-exclusion and
//! exactly-once-completion rules testable without Tokio.

use crate::engine::{ExitClass, Generation, SupervisorEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreState {
    Idle,
    Running {
        generation: Generation,
        cancel_requested: bool,
    },
}

/// Why a request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    AlreadyRunning,
    NotRunning,
}

/// Answer for the requester of the event, if there is one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreReply {
    Started { generation: Generation },
    Cancelling { generation: Generation },
    Rejected(Rejection),
    /// Internal events (spawn failure, process exit) have no requester.
    Nothing,
}

/// Work the IO shell has to carry out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreCommand {
    /// Launch the external process for this generation.
    Spawn { generation: Generation },
    /// Signal the process tree of this generation.
    Terminate { generation: Generation },
    /// The task for this generation is gone; log how it ended.
    Report {
        generation: Generation,
        exit: ExitClass,
        cancel_requested: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreStep {
    pub reply: CoreReply,
    pub commands: Vec<CoreCommand>,
}

impl CoreStep {
    fn reply(reply: CoreReply) -> Self {
        Self {
            reply,
            commands: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct SupervisorCore {
    state: CoreState,
    next_generation: Generation,
}

impl Default for SupervisorCore {
    fn default() -> Self {
        Self::new()
    }
}

impl SupervisorCore {
    pub fn new() -> Self {
        Self {
            state: CoreState::Idle,
            next_generation: 1,
        }
    }

    pub fn state(&self) -> CoreState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, CoreState::Running { .. })
    }

    pub fn step(&mut self, event: SupervisorEvent) -> CoreStep {
        match event {
            SupervisorEvent::StartRequested => self.handle_start(),
            SupervisorEvent::CancelRequested => self.handle_cancel(),
            SupervisorEvent::SpawnFailed { generation } => {
                if self.is_current(generation) {
                    self.state = CoreState::Idle;
                }
                CoreStep::reply(CoreReply::Nothing)
            }
            SupervisorEvent::ProcessExited { generation, exit } => {
                self.handle_exit(generation, exit)
            }
        }
    }

    fn handle_start(&mut self) -> CoreStep {
        if self.is_running() {
            return CoreStep::reply(CoreReply::Rejected(Rejection::AlreadyRunning));
        }

        let generation = self.next_generation;
        self.next_generation += 1;
        self.state = CoreState::Running {
            generation,
            cancel_requested: false,
        };

        CoreStep {
            reply: CoreReply::Started { generation },
            commands: vec![CoreCommand::Spawn { generation }],
        }
    }

    fn handle_cancel(&mut self) -> CoreStep {
        match self.state {
            CoreState::Idle => CoreStep::reply(CoreReply::Rejected(Rejection::NotRunning)),
            CoreState::Running { generation, .. } => {
                // Every cancel asks for termination; the shell delivers the
                // signal once per generation. State stays Running until the
                // exit report arrives.
                self.state = CoreState::Running {
                    generation,
                    cancel_requested: true,
                };
                CoreStep {
                    reply: CoreReply::Cancelling { generation },
                    commands: vec![CoreCommand::Terminate { generation }],
                }
            }
        }
    }

    fn handle_exit(&mut self, generation: Generation, exit: ExitClass) -> CoreStep {
        match self.state {
            CoreState::Running {
                generation: current,
                cancel_requested,
            } if current == generation => {
                self.state = CoreState::Idle;
                CoreStep {
                    reply: CoreReply::Nothing,
                    commands: vec![CoreCommand::Report {
                        generation,
                        exit,
                        cancel_requested,
                    }],
                }
            }
            // Stale or duplicate report: already cleared.
            _ => CoreStep::reply(CoreReply::Nothing),
        }
    }

    fn is_current(&self, generation: Generation) -> bool {
        matches!(self.state, CoreState::Running { generation: g, .. } if g == generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(core: &mut SupervisorCore) -> Generation {
        match core.step(SupervisorEvent::StartRequested).reply {
            CoreReply::Started { generation } => generation,
            other => panic!("expected Started, got {other:?}"),
        }
    }

    #[test]
    fn second_start_is_rejected_while_running() {
        let mut core = SupervisorCore::new();
        started(&mut core);

        let step = core.step(SupervisorEvent::StartRequested);
        assert_eq!(step.reply, CoreReply::Rejected(Rejection::AlreadyRunning));
        assert!(step.commands.is_empty());
    }

    #[test]
    fn cancel_while_idle_is_rejected_and_changes_nothing() {
        let mut core = SupervisorCore::new();
        let step = core.step(SupervisorEvent::CancelRequested);

        assert_eq!(step.reply, CoreReply::Rejected(Rejection::NotRunning));
        assert!(step.commands.is_empty());
        assert_eq!(core.state(), CoreState::Idle);
    }

    #[test]
    fn cancel_keeps_running_until_exit_is_reported() {
        let mut core = SupervisorCore::new();
        let generation = started(&mut core);

        let step = core.step(SupervisorEvent::CancelRequested);
        assert_eq!(step.commands, vec![CoreCommand::Terminate { generation }]);
        assert!(core.is_running());

        let step = core.step(SupervisorEvent::ProcessExited {
            generation,
            exit: ExitClass::Cancelled(15),
        });
        assert_eq!(
            step.commands,
            vec![CoreCommand::Report {
                generation,
                exit: ExitClass::Cancelled(15),
                cancel_requested: true,
            }]
        );
        assert_eq!(core.state(), CoreState::Idle);
    }

    #[test]
    fn duplicate_exit_report_is_ignored() {
        let mut core = SupervisorCore::new();
        let generation = started(&mut core);

        let exit = SupervisorEvent::ProcessExited {
            generation,
            exit: ExitClass::Success,
        };
        assert_eq!(core.step(exit.clone()).commands.len(), 1);
        assert!(core.step(exit).commands.is_empty());
    }

    #[test]
    fn stale_exit_does_not_clear_newer_task() {
        let mut core = SupervisorCore::new();
        let first = started(&mut core);
        core.step(SupervisorEvent::ProcessExited {
            generation: first,
            exit: ExitClass::Failed(2),
        });

        let second = started(&mut core);
        assert_ne!(first, second);

        core.step(SupervisorEvent::ProcessExited {
            generation: first,
            exit: ExitClass::Success,
        });
        assert!(core.is_running());
    }

    #[test]
    fn spawn_failure_returns_to_idle() {
        let mut core = SupervisorCore::new();
        let generation = started(&mut core);

        core.step(SupervisorEvent::SpawnFailed { generation });
        assert_eq!(core.state(), CoreState::Idle);
        started(&mut core);
    }
}
