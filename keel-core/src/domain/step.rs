//! Step domain types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One unit of pipeline work, executed as a single container
///
/// The `id` is also the container name, so it must be unique per execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub auth: Option<Auth>,
    #[serde(default)]
    pub pull: PullPolicy,
    #[serde(default)]
    pub entrypoint: Vec<String>,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub envs: HashMap<String, String>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub volumes: Vec<VolumeMount>,
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub privileged: bool,
    #[serde(default)]
    pub network_aliases: Vec<String>,
    /// Memory limit in bytes, 0 means unlimited
    #[serde(default)]
    pub mem_limit: i64,
    /// Shared memory size in bytes, 0 keeps the runtime default
    #[serde(default)]
    pub shm_size: i64,
    #[serde(default)]
    pub cpu_shares: i64,
}

/// Registry credentials for pulling the step image
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Auth {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Auth")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// When to fetch the step image before running it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PullPolicy {
    /// Pull when the tag is `latest`, or when the image is missing locally
    #[default]
    Default,
    /// Pull before every run
    Always,
    /// Never pull; a missing image fails the step
    Never,
}

/// Mount of a pipeline volume into a step
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMount {
    /// Name of the pipeline volume
    pub name: String,
    /// Mount point inside the container
    pub path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_debug_redacts_password() {
        let auth = Auth {
            username: "octocat".to_string(),
            password: "hunter2".to_string(),
        };

        let rendered = format!("{:?}", auth);
        assert!(rendered.contains("octocat"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_pull_policy_serde() {
        assert_eq!(
            serde_json::to_string(&PullPolicy::Never).unwrap(),
            "\"never\""
        );
        let policy: PullPolicy = serde_json::from_str("\"always\"").unwrap();
        assert_eq!(policy, PullPolicy::Always);
        assert_eq!(PullPolicy::default(), PullPolicy::Default);
    }
}
