//! Volume domain types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Medium value marking a tmpfs-backed empty dir
pub const MEDIUM_MEMORY: &str = "memory";

/// Pipeline volume shared between steps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Volume {
    /// Ephemeral volume scoped to the pipeline
    EmptyDir(VolumeEmptyDir),
    /// Directory on the host, bind mounted into steps
    HostPath(VolumeHostPath),
}

/// Ephemeral pipeline volume
///
/// A `memory` medium is mounted as tmpfs and has no backing runtime volume.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeEmptyDir {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub medium: String,
    /// Size limit in bytes for memory volumes, 0 means unlimited
    #[serde(default)]
    pub size_limit: i64,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

/// Host directory volume
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeHostPath {
    pub id: String,
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl Volume {
    pub fn id(&self) -> &str {
        match self {
            Volume::EmptyDir(v) => &v.id,
            Volume::HostPath(v) => &v.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Volume::EmptyDir(v) => &v.name,
            Volume::HostPath(v) => &v.name,
        }
    }

    pub fn empty_dir(&self) -> Option<&VolumeEmptyDir> {
        match self {
            Volume::EmptyDir(v) => Some(v),
            Volume::HostPath(_) => None,
        }
    }

    /// True for memory-backed empty dirs
    pub fn is_memory(&self) -> bool {
        self.empty_dir().is_some_and(VolumeEmptyDir::is_memory)
    }
}

impl VolumeEmptyDir {
    pub fn is_memory(&self) -> bool {
        self.medium == MEDIUM_MEMORY
    }
}
