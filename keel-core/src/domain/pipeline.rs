//! Pipeline domain types

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use super::step::Step;
use super::volume::Volume;

/// Compiled pipeline execution
///
/// Built by the pipeline compiler and treated as read-only by the engine.
/// Volume and step identifiers must be unique within a spec.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Spec {
    #[serde(default)]
    pub platform: Platform,
    #[serde(default)]
    pub volumes: Vec<Volume>,
    pub network: Network,
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// Target platform of the pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub arch: String,
}

impl Platform {
    pub fn is_windows(&self) -> bool {
        self.os == "windows"
    }
}

/// Pipeline network. Every step container is attached to it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub id: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

/// Structural problems in a compiled spec
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecError {
    #[error("network id must not be empty")]
    EmptyNetworkId,

    #[error("{kind} at index {index} has an empty id")]
    EmptyId { kind: &'static str, index: usize },

    #[error("duplicate {kind} id '{id}'")]
    DuplicateId { kind: &'static str, id: String },
}

impl Spec {
    /// Looks up a step by id
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|step| step.id == id)
    }

    /// Looks up a volume by its name, as referenced from step mounts
    pub fn volume(&self, name: &str) -> Option<&Volume> {
        self.volumes.iter().find(|volume| volume.name() == name)
    }

    /// Checks identifier invariants
    ///
    /// Step and volume ids double as runtime resource names, so they must be
    /// non-empty and unique within the spec.
    pub fn validate(&self) -> Result<(), SpecError> {
        if self.network.id.is_empty() {
            return Err(SpecError::EmptyNetworkId);
        }

        let mut seen = HashSet::new();
        for (index, volume) in self.volumes.iter().enumerate() {
            let id = volume.id();
            if id.is_empty() {
                return Err(SpecError::EmptyId {
                    kind: "volume",
                    index,
                });
            }
            if !seen.insert(id) {
                return Err(SpecError::DuplicateId {
                    kind: "volume",
                    id: id.to_string(),
                });
            }
        }

        let mut seen = HashSet::new();
        for (index, step) in self.steps.iter().enumerate() {
            if step.id.is_empty() {
                return Err(SpecError::EmptyId {
                    kind: "step",
                    index,
                });
            }
            if !seen.insert(step.id.as_str()) {
                return Err(SpecError::DuplicateId {
                    kind: "step",
                    id: step.id.clone(),
                });
            }
        }

        Ok(())
    }
}
