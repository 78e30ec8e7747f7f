//! Step to container translation
//!
//! Pure mapping from a compiled step to the runtime's container description.

use keel_core::{Spec, Step, Volume};
use keel_runtime::{ContainerConfig, Mount, MountKind};
use tracing::warn;

/// Builds the container description for a step
///
/// The container is named after the step id and attached to the pipeline
/// network, reachable under the step name and any extra aliases.
pub fn to_container_config(spec: &Spec, step: &Step) -> ContainerConfig {
    let mut network_aliases = Vec::new();
    for alias in std::iter::once(&step.name).chain(&step.network_aliases) {
        if !alias.is_empty() && !network_aliases.contains(alias) {
            network_aliases.push(alias.clone());
        }
    }

    ContainerConfig {
        name: step.id.clone(),
        image: step.image.clone(),
        entrypoint: step.entrypoint.clone(),
        command: step.command.clone(),
        env: step.envs.clone(),
        labels: step.labels.clone(),
        working_dir: step.working_dir.clone(),
        user: step.user.clone(),
        privileged: step.privileged,
        mounts: to_mounts(spec, step),
        network: Some(spec.network.id.clone()),
        network_aliases,
        memory: step.mem_limit,
        shm_size: step.shm_size,
        cpu_shares: step.cpu_shares,
    }
}

/// Resolves step volume mounts against the pipeline volumes
///
/// Memory-medium empty dirs become tmpfs mounts; mounts naming an unknown
/// volume are skipped.
fn to_mounts(spec: &Spec, step: &Step) -> Vec<Mount> {
    let mut mounts = Vec::with_capacity(step.volumes.len());

    for mount in &step.volumes {
        let Some(volume) = spec.volume(&mount.name) else {
            warn!(
                "Step '{}' mounts unknown volume '{}', skipping",
                step.name, mount.name
            );
            continue;
        };

        let mount = match volume {
            Volume::EmptyDir(v) if v.is_memory() => Mount {
                kind: MountKind::Tmpfs {
                    size: (v.size_limit > 0).then_some(v.size_limit),
                },
                source: String::new(),
                target: mount.path.clone(),
                read_only: false,
            },
            Volume::EmptyDir(v) => Mount {
                kind: MountKind::Volume,
                source: v.id.clone(),
                target: mount.path.clone(),
                read_only: false,
            },
            Volume::HostPath(v) => Mount {
                kind: MountKind::Bind,
                source: v.path.clone(),
                target: mount.path.clone(),
                read_only: v.read_only,
            },
        };
        mounts.push(mount);
    }

    mounts
}
