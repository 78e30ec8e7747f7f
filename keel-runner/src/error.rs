//! Engine error types

use keel_core::{ImageRefError, SpecError};
use keel_runtime::RuntimeError;
use std::fmt;
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Runtime resource managed by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Volume,
    Network,
    Container,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Volume => write!(f, "volume"),
            ResourceKind::Network => write!(f, "network"),
            ResourceKind::Container => write!(f, "container"),
        }
    }
}

/// Fatal errors of `setup` and `run`
///
/// A step that fails with any of these produces no `State`.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The step image reference is malformed
    #[error("Invalid image reference for step '{step}': {source}")]
    InvalidImage {
        step: String,
        #[source]
        source: ImageRefError,
    },

    /// The compiled spec violates identifier invariants
    #[error("Invalid pipeline spec: {0}")]
    InvalidSpec(#[from] SpecError),

    /// Creating a volume, network or container failed
    #[error("Failed to create {resource} '{name}': {source}")]
    ResourceCreation {
        resource: ResourceKind,
        name: String,
        #[source]
        source: RuntimeError,
    },

    /// The image is missing locally and could not be made available
    #[error("Image '{image}' not found for step '{step}': {source}")]
    ImageNotFound {
        step: String,
        image: String,
        #[source]
        source: RuntimeError,
    },

    #[error("Failed to pull image '{image}': {source}")]
    Pull {
        image: String,
        #[source]
        source: RuntimeError,
    },

    #[error("Failed to start container '{step}': {source}")]
    Start {
        step: String,
        #[source]
        source: RuntimeError,
    },

    #[error("Failed to open log stream for container '{step}': {source}")]
    StreamUnavailable {
        step: String,
        #[source]
        source: RuntimeError,
    },

    #[error("Failed to inspect container '{step}': {source}")]
    Inspect {
        step: String,
        #[source]
        source: RuntimeError,
    },

    /// The caller cancelled the step while waiting for it to exit
    #[error("Step '{step}' was cancelled before it exited")]
    Cancelled { step: String },
}

impl EngineError {
    /// Check if this error comes from malformed input rather than the runtime
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::InvalidImage { .. } | Self::InvalidSpec(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
