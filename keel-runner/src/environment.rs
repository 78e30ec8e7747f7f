//! Pipeline environment lifecycle
//!
//! Creates the volumes and network a pipeline shares across its steps and
//! tears everything down again afterwards.

use crate::error::{EngineError, ResourceKind, Result};
use keel_core::{Platform, Spec, Volume};
use keel_runtime::{NetworkCreate, RemoveOptions, RuntimeClient, VOLUME_DRIVER_LOCAL, VolumeCreate};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Network driver for the target platform
pub fn network_driver(platform: &Platform) -> &'static str {
    if platform.is_windows() { "nat" } else { "bridge" }
}

/// Cleanup action that failed during teardown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupAction {
    Kill,
    Remove,
}

impl fmt::Display for CleanupAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CleanupAction::Kill => write!(f, "kill"),
            CleanupAction::Remove => write!(f, "remove"),
        }
    }
}

/// A single failed teardown call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupFailure {
    pub resource: ResourceKind,
    pub name: String,
    pub action: CleanupAction,
    pub message: String,
}

impl fmt::Display for CleanupFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} '{}': {}",
            self.action, self.resource, self.name, self.message
        )
    }
}

/// Outcome of a teardown
///
/// Teardown never fails; whatever could not be cleaned up is listed here so
/// operators can reconcile it out of band.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub failures: Vec<CleanupFailure>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn record(
        &mut self,
        resource: ResourceKind,
        name: &str,
        action: CleanupAction,
        err: keel_runtime::RuntimeError,
    ) {
        if err.is_not_found() {
            debug!("{} {} '{}' skipped: {}", action, resource, name, err);
        } else {
            warn!("Failed to {} {} '{}': {}", action, resource, name, err);
        }
        self.failures.push(CleanupFailure {
            resource,
            name: name.to_string(),
            action,
            message: err.to_string(),
        });
    }
}

/// Creates and destroys pipeline-wide resources
pub struct EnvironmentManager {
    client: Arc<dyn RuntimeClient>,
    kill_signal: String,
}

impl EnvironmentManager {
    pub fn new(client: Arc<dyn RuntimeClient>, kill_signal: impl Into<String>) -> Self {
        Self {
            client,
            kill_signal: kill_signal.into(),
        }
    }

    /// Creates the pipeline volumes and network
    ///
    /// Every empty dir gets a backing volume, including memory-medium ones.
    /// The first failure aborts; anything already created is left for
    /// [`destroy`](Self::destroy).
    pub async fn setup(&self, spec: &Spec) -> Result<()> {
        spec.validate()?;

        for volume in &spec.volumes {
            let Some(empty_dir) = volume.empty_dir() else {
                continue;
            };

            let req = VolumeCreate {
                name: empty_dir.id.clone(),
                driver: VOLUME_DRIVER_LOCAL.to_string(),
                labels: empty_dir.labels.clone(),
            };
            debug!("Creating volume {}", req.name);
            self.client
                .volume_create(&req)
                .await
                .map_err(|source| EngineError::ResourceCreation {
                    resource: ResourceKind::Volume,
                    name: req.name.clone(),
                    source,
                })?;
        }

        let req = NetworkCreate {
            name: spec.network.id.clone(),
            driver: network_driver(&spec.platform).to_string(),
            labels: spec.network.labels.clone(),
        };
        debug!("Creating network {} (driver {})", req.name, req.driver);
        self.client
            .network_create(&req)
            .await
            .map_err(|source| EngineError::ResourceCreation {
                resource: ResourceKind::Network,
                name: req.name.clone(),
                source,
            })?;

        info!(
            "Environment ready: {} volume(s), network {}",
            spec.volumes.len(),
            spec.network.id
        );
        Ok(())
    }

    /// Tears down every step container, volume and the network
    ///
    /// Kills all containers first so none of them holds a volume or the
    /// network while it is removed. Memory-medium volumes are not removed
    /// here; the runtime drops them with their containers.
    pub async fn destroy(&self, spec: &Spec) -> CleanupReport {
        let mut report = CleanupReport::default();

        for step in &spec.steps {
            if let Err(err) = self.client.container_kill(&step.id, &self.kill_signal).await {
                report.record(ResourceKind::Container, &step.id, CleanupAction::Kill, err);
            }
        }

        let opts = RemoveOptions {
            force: true,
            remove_volumes: true,
            remove_links: false,
        };
        for step in &spec.steps {
            if let Err(err) = self.client.container_remove(&step.id, &opts).await {
                report.record(ResourceKind::Container, &step.id, CleanupAction::Remove, err);
            }
        }

        for volume in &spec.volumes {
            let Volume::EmptyDir(empty_dir) = volume else {
                continue;
            };
            if empty_dir.is_memory() {
                continue;
            }
            if let Err(err) = self.client.volume_remove(&empty_dir.id, true).await {
                report.record(ResourceKind::Volume, &empty_dir.id, CleanupAction::Remove, err);
            }
        }

        if let Err(err) = self.client.network_remove(&spec.network.id).await {
            report.record(
                ResourceKind::Network,
                &spec.network.id,
                CleanupAction::Remove,
                err,
            );
        }

        if report.is_clean() {
            info!("Environment {} destroyed", spec.network.id);
        } else {
            warn!(
                "Environment {} destroyed with {} failure(s)",
                spec.network.id,
                report.failures.len()
            );
        }
        report
    }
}
