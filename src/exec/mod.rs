// src/exec/mod.rs

//! Running the external verification process.
//!
//! - [`supervisor`] owns the single live task and serialises start/cancel.
//! - [`runner`] spawns the process, drains its output and reports its exit.
//! - [`terminate`] signals a process and every one of its descendants.

pub mod runner;
pub mod supervisor;
pub mod terminate;

pub use supervisor::{
    spawn_supervisor, StartTicket, SupervisorHandle, SupervisorMessage, SupervisorSettings,
};
