//! Core domain types
//!
//! This module contains the structures produced by the pipeline compiler and
//! consumed read-only by the runner. A `Spec` describes one pipeline execution:
//! the platform, the shared volumes, the shared network and the ordered steps.

pub mod pipeline;
pub mod state;
pub mod step;
pub mod volume;

pub use pipeline::{Network, Platform, Spec, SpecError};
pub use state::State;
pub use step::{Auth, PullPolicy, Step, VolumeMount};
pub use volume::{Volume, VolumeEmptyDir, VolumeHostPath};
