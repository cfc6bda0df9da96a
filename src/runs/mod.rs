// src/runs/mod.rs

//! Persisted runs: directory discovery ([`catalog`]) and per-proof report
//! parsing ([`results`]).

pub mod catalog;
pub mod results;

pub use catalog::{RunCatalog, RunInfo};
pub use results::{ResultReader, VerificationResult};
