//! Keel Runtime Client
//!
//! Capability surface of the container runtime the step engine drives.
//!
//! The engine never talks to a runtime directly; it is handed an
//! `Arc<dyn RuntimeClient>` so tests can substitute a fake and deployments can
//! pick a backend. This crate provides:
//! - [`RuntimeClient`]: volume, network, image and container primitives
//! - [`PodmanClient`]: a backend driving a podman or docker compatible CLI
//! - [`auth`]: registry credential encoding
//! - [`stdcopy`]: the multiplexed stdout/stderr log stream format
//!
//! # Example
//!
//! ```no_run
//! use keel_runtime::{PodmanClient, RuntimeClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = PodmanClient::new("podman");
//!     client.check_available().await?;
//!
//!     let inspect = client.container_inspect("step-1").await?;
//!     println!("running: {}", inspect.state.running);
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod error;
mod podman;
pub mod stdcopy;
mod types;

pub use error::{Result, RuntimeError};
pub use podman::PodmanClient;
pub use types::{
    ContainerConfig, ContainerInspect, ContainerState, LogsOptions, Mount, MountKind,
    NetworkCreate, PullOptions, RemoveOptions, VOLUME_DRIVER_LOCAL, VolumeCreate,
};

use async_trait::async_trait;
use tokio::io::AsyncRead;

/// Byte stream returned by pulls and log requests
///
/// Callers own the stream: drain it, then drop it to release the underlying
/// connection or process.
pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

/// Container runtime operations used by the step engine
///
/// Every call is independent and may fail on its own. Implementations must be
/// safe to share across concurrent calls.
#[async_trait]
pub trait RuntimeClient: Send + Sync {
    /// Creates a named volume
    async fn volume_create(&self, req: &VolumeCreate) -> Result<()>;

    /// Removes a named volume
    async fn volume_remove(&self, name: &str, force: bool) -> Result<()>;

    /// Creates a network
    async fn network_create(&self, req: &NetworkCreate) -> Result<()>;

    /// Removes a network
    async fn network_remove(&self, name: &str) -> Result<()>;

    /// Pulls an image, returning its progress output
    async fn image_pull(&self, image: &str, opts: &PullOptions) -> Result<ByteStream>;

    /// Creates (but does not start) a container
    ///
    /// # Errors
    /// Returns `RuntimeError::ImageNotFound` when the image is not present
    /// locally
    async fn container_create(&self, config: &ContainerConfig) -> Result<()>;

    /// Starts a created container
    async fn container_start(&self, id: &str) -> Result<()>;

    /// Sends a signal to a running container
    async fn container_kill(&self, id: &str, signal: &str) -> Result<()>;

    /// Removes a container
    async fn container_remove(&self, id: &str, opts: &RemoveOptions) -> Result<()>;

    /// Blocks until the container stops, returning its exit code
    async fn container_wait(&self, id: &str) -> Result<i64>;

    /// Returns current inspection data for a container
    async fn container_inspect(&self, id: &str) -> Result<ContainerInspect>;

    /// Opens the container's log stream in [`stdcopy`] framing
    async fn container_logs(&self, id: &str, opts: &LogsOptions) -> Result<ByteStream>;
}
