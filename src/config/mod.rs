// src/config/mod.rs

//! Configuration loading.
//!
//! - [`model`] holds the serde model of `Proofrun.toml`.
//! - [`validate`] turns a `RawConfigFile` into a checked `ConfigFile`.
//! - [`loader`] reads the file and applies `PROOFRUN_*` overrides.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path};
pub use model::{
    ConfigFile, OutputSection, RawConfigFile, ReportsSection, RunnerSection, ServerSection,
};
