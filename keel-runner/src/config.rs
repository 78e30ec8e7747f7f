//! Engine configuration
//!
//! Defines the runtime binary and the timing knobs of the step executor.

use std::time::Duration;

/// Engine configuration
///
/// Timings are configurable to allow tuning for slow runtimes (remote
/// sockets, rootless podman) or noisy steps with large log tails.
#[derive(Debug, Clone)]
pub struct Config {
    /// Runtime binary driven by the CLI client (e.g. "podman" or "docker")
    pub runtime_binary: String,

    /// Signal sent to step containers during teardown
    pub kill_signal: String,

    /// Pause before waiting again when a container still reports running
    /// after its wait call returned
    pub wait_retry_delay: Duration,

    /// How long to keep copying logs after the step exited before
    /// detaching from the stream
    pub log_drain_timeout: Duration,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(runtime_binary: String) -> Self {
        Self {
            runtime_binary,
            kill_signal: "9".to_string(),
            wait_retry_delay: Duration::from_secs(1),
            log_drain_timeout: Duration::from_secs(30),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - KEEL_RUNTIME (optional, default: podman)
    /// - KEEL_KILL_SIGNAL (optional, default: 9)
    /// - KEEL_WAIT_RETRY_MS (optional, milliseconds, default: 1000)
    /// - KEEL_LOG_DRAIN_TIMEOUT (optional, seconds, default: 30)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Creates configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let runtime_binary = lookup("KEEL_RUNTIME").unwrap_or(defaults.runtime_binary);

        let kill_signal = lookup("KEEL_KILL_SIGNAL").unwrap_or(defaults.kill_signal);

        let wait_retry_delay = lookup("KEEL_WAIT_RETRY_MS")
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.wait_retry_delay);

        let log_drain_timeout = lookup("KEEL_LOG_DRAIN_TIMEOUT")
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.log_drain_timeout);

        Self {
            runtime_binary,
            kill_signal,
            wait_retry_delay,
            log_drain_timeout,
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.runtime_binary.trim().is_empty() {
            anyhow::bail!("runtime_binary cannot be empty");
        }

        if self.kill_signal.trim().is_empty() {
            anyhow::bail!("kill_signal cannot be empty");
        }

        if self.wait_retry_delay.is_zero() {
            anyhow::bail!("wait_retry_delay must be greater than 0");
        }

        if self.log_drain_timeout.is_zero() {
            anyhow::bail!("log_drain_timeout must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new("podman".to_string())
    }
}
