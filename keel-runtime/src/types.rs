//! Request and response types of the runtime client
//!
//! These are runtime-neutral: the CLI client renders them as command line
//! flags, a fake client in tests simply records them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Driver used for pipeline volumes
pub const VOLUME_DRIVER_LOCAL: &str = "local";

/// Volume creation request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VolumeCreate {
    pub name: String,
    pub driver: String,
    pub labels: HashMap<String, String>,
}

/// Network creation request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkCreate {
    pub name: String,
    pub driver: String,
    pub labels: HashMap<String, String>,
}

/// Image pull options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullOptions {
    /// Encoded registry credentials, see [`crate::auth::encode`]
    pub registry_auth: Option<String>,
}

/// Container removal options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoveOptions {
    pub force: bool,
    pub remove_volumes: bool,
    pub remove_links: bool,
}

/// Container log stream options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogsOptions {
    pub follow: bool,
    pub stdout: bool,
    pub stderr: bool,
    pub timestamps: bool,
    pub details: bool,
}

/// Kind of a container mount
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountKind {
    /// Named runtime volume
    Volume,
    /// Host directory
    Bind,
    /// In-memory filesystem, optional size limit in bytes
    Tmpfs { size: Option<i64> },
}

/// Mount of a volume, host path or tmpfs into the container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub kind: MountKind,
    /// Volume name or host path, empty for tmpfs
    pub source: String,
    pub target: String,
    pub read_only: bool,
}

/// Full description of a container to create
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerConfig {
    /// Container name
    pub name: String,
    pub image: String,
    pub entrypoint: Vec<String>,
    pub command: Vec<String>,
    pub env: HashMap<String, String>,
    pub labels: HashMap<String, String>,
    pub working_dir: Option<String>,
    pub user: Option<String>,
    pub privileged: bool,
    pub mounts: Vec<Mount>,
    /// Network to attach the container to
    pub network: Option<String>,
    pub network_aliases: Vec<String>,
    /// Memory limit in bytes, 0 means unlimited
    pub memory: i64,
    /// Shared memory size in bytes, 0 keeps the runtime default
    pub shm_size: i64,
    pub cpu_shares: i64,
}

/// Container inspection data
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerInspect {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub state: ContainerState,
}

/// Process state reported by container inspection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerState {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub exit_code: i64,
    #[serde(default, rename = "OOMKilled")]
    pub oom_killed: bool,
}
