//! Keel Runner
//!
//! Runs compiled pipeline steps as containers.
//!
//! Architecture:
//! - Environment: pipeline volumes and network, created once and torn down
//!   at the end
//! - Executor: per-step create, start, tail and wait, including the image
//!   pull policy and the pull-on-miss retry
//! - Engine: the `setup` / `run` / `destroy` contract composed from both
//!
//! The engine holds a single shared [`keel_runtime::RuntimeClient`] and no
//! other mutable state, so steps may be run concurrently by the caller.

pub mod config;
pub mod convert;
pub mod engine;
pub mod environment;
pub mod error;
pub mod executor;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use engine::{ContainerEngine, Engine};
pub use environment::{CleanupAction, CleanupFailure, CleanupReport, EnvironmentManager};
pub use error::{EngineError, ResourceKind, Result};
pub use executor::{StepExecutor, should_pull_first};
