//! Podman CLI backend
//!
//! Implements [`RuntimeClient`] by shelling out to a podman (or docker)
//! compatible binary:
//! - Volumes and networks via `volume create/rm` and `network create/rm`
//! - Images via `pull`, credentials passed with `--creds`
//! - Containers via `create --pull never`, `start`, `kill`, `rm`, `wait`,
//!   `container inspect` and `logs --follow`
//!
//! Log output is re-framed into the [`stdcopy`] format so callers see the
//! same stream a runtime API would return.

use async_trait::async_trait;
use std::collections::HashMap;
use std::io::Cursor;
use std::process::{Output, Stdio};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, DuplexStream};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Result, RuntimeError};
use crate::stdcopy::{self, StreamKind};
use crate::types::{
    ContainerConfig, ContainerInspect, LogsOptions, MountKind, NetworkCreate, PullOptions,
    RemoveOptions, VolumeCreate,
};
use crate::{ByteStream, RuntimeClient, auth};

/// stderr fragments meaning the image is not available locally
const IMAGE_NOT_FOUND_MARKERS: &[&str] = &[
    "image not known",
    "no such image",
    "unable to find image",
];

/// stderr fragments meaning the target resource does not exist
const NOT_FOUND_MARKERS: &[&str] = &[
    "no such container",
    "no container with name or id",
    "no such volume",
    "no volume with name",
    "no such network",
    "network not found",
    "unable to find network",
];

/// Buffer between the log process and the consumer
const LOG_PIPE_CAPACITY: usize = 64 * 1024;

/// Runtime client driving a podman or docker compatible CLI
#[derive(Debug, Clone)]
pub struct PodmanClient {
    program: String,
}

impl PodmanClient {
    /// Creates a client for the given binary (e.g. `podman` or `docker`)
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Checks that the runtime binary is installed and answers
    ///
    /// # Returns
    /// The version string reported by the binary
    pub async fn check_available(&self) -> Result<String> {
        let output = self.exec(vec!["--version".to_string()]).await?;
        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        info!("{} is available: {}", self.program, version);
        Ok(version)
    }

    /// Runs the binary to completion, mapping failures to `RuntimeError`
    async fn exec(&self, args: Vec<String>) -> Result<Output> {
        debug!("Running {} {}", self.program, display_args(&args));

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            return Err(self.command_error(&args, &output));
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            debug!("{} {} stderr: {}", self.program, args[0], stderr.trim());
        }

        Ok(output)
    }

    fn command_error(&self, args: &[String], output: &Output) -> RuntimeError {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        match classify(&stderr) {
            Some(ErrorClass::ImageNotFound) => RuntimeError::ImageNotFound(stderr),
            Some(ErrorClass::NotFound) => RuntimeError::NotFound(stderr),
            None => RuntimeError::Command {
                program: self.program.clone(),
                args: display_args(args),
                exit_code: output.status.code(),
                stderr,
            },
        }
    }
}

#[async_trait]
impl RuntimeClient for PodmanClient {
    async fn volume_create(&self, req: &VolumeCreate) -> Result<()> {
        self.exec(volume_create_args(req)).await?;
        Ok(())
    }

    async fn volume_remove(&self, name: &str, force: bool) -> Result<()> {
        let mut args = vec!["volume".to_string(), "rm".to_string()];
        if force {
            args.push("--force".to_string());
        }
        args.push(name.to_string());

        self.exec(args).await?;
        Ok(())
    }

    async fn network_create(&self, req: &NetworkCreate) -> Result<()> {
        self.exec(network_create_args(req)).await?;
        Ok(())
    }

    async fn network_remove(&self, name: &str) -> Result<()> {
        self.exec(vec!["network".to_string(), "rm".to_string(), name.to_string()])
            .await?;
        Ok(())
    }

    async fn image_pull(&self, image: &str, opts: &PullOptions) -> Result<ByteStream> {
        let credentials = opts
            .registry_auth
            .as_deref()
            .map(auth::decode)
            .transpose()?;

        let output = self.exec(pull_args(image, credentials)).await?;

        // podman reports progress on stderr and the image id on stdout
        let mut progress = output.stderr;
        progress.extend_from_slice(&output.stdout);
        Ok(Box::new(Cursor::new(progress)))
    }

    async fn container_create(&self, config: &ContainerConfig) -> Result<()> {
        let output = self.exec(create_args(config)).await?;
        debug!(
            "Container {} created: {}",
            config.name,
            String::from_utf8_lossy(&output.stdout).trim()
        );
        Ok(())
    }

    async fn container_start(&self, id: &str) -> Result<()> {
        self.exec(vec!["start".to_string(), id.to_string()]).await?;
        Ok(())
    }

    async fn container_kill(&self, id: &str, signal: &str) -> Result<()> {
        self.exec(vec![
            "kill".to_string(),
            "--signal".to_string(),
            signal.to_string(),
            id.to_string(),
        ])
        .await?;
        Ok(())
    }

    async fn container_remove(&self, id: &str, opts: &RemoveOptions) -> Result<()> {
        self.exec(remove_args(id, opts)).await?;
        Ok(())
    }

    async fn container_wait(&self, id: &str) -> Result<i64> {
        let output = self
            .exec(vec!["wait".to_string(), id.to_string()])
            .await?;
        parse_wait(&output.stdout)
    }

    async fn container_inspect(&self, id: &str) -> Result<ContainerInspect> {
        let output = self
            .exec(vec![
                "container".to_string(),
                "inspect".to_string(),
                id.to_string(),
            ])
            .await?;
        parse_inspect(id, &output.stdout)
    }

    async fn container_logs(&self, id: &str, opts: &LogsOptions) -> Result<ByteStream> {
        let args = logs_args(id, opts);
        debug!("Streaming {} {}", self.program, display_args(&args));

        let mut command = Command::new(&self.program);
        command.args(&args);
        stream_process(command, id)
    }
}

/// Spawns a following log process and multiplexes its pipes into one stream
///
/// Stdout and stderr become stdout and stderr frames. A non-zero exit ends the
/// stream with a system error frame.
fn stream_process(mut command: Command, container: &str) -> Result<ByteStream> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| RuntimeError::InvalidRequest("log stdout not captured".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| RuntimeError::InvalidRequest("log stderr not captured".to_string()))?;

    let (reader, writer) = tokio::io::duplex(LOG_PIPE_CAPACITY);
    let writer = Arc::new(Mutex::new(writer));
    let container = container.to_string();

    tokio::spawn(async move {
        let (out, err) = tokio::join!(
            pump(stdout, StreamKind::Stdout, writer.clone()),
            pump(stderr, StreamKind::Stderr, writer.clone()),
        );
        if let Err(e) = out.and(err) {
            // the consumer went away, stop following
            debug!("Log stream for {} closed early: {}", container, e);
            let _ = child.start_kill();
        }

        match child.wait().await {
            Ok(status) if !status.success() => {
                let message = format!("log stream for {} exited with {}", container, status);
                warn!("{}", message);
                let mut writer = writer.lock().await;
                let _ =
                    stdcopy::write_frame(&mut *writer, StreamKind::SystemErr, message.as_bytes())
                        .await;
            }
            Ok(_) => {}
            Err(e) => warn!("Failed to reap log process for {}: {}", container, e),
        }
    });

    Ok(Box::new(reader))
}

/// Copies one pipe of the log process into the shared multiplexed stream
async fn pump<R>(
    mut src: R,
    stream: StreamKind,
    dst: Arc<Mutex<DuplexStream>>,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; 8 * 1024];
    loop {
        let n = src.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        let mut dst = dst.lock().await;
        stdcopy::write_frame(&mut *dst, stream, &buf[..n]).await?;
    }
}

/// Renders arguments for logs and errors with credential values masked
fn display_args(args: &[String]) -> String {
    let mut shown = Vec::with_capacity(args.len());
    let mut mask_next = false;
    for arg in args {
        if mask_next {
            let user = arg.split_once(':').map_or("", |(user, _)| user);
            shown.push(format!("{}:***", user));
            mask_next = false;
        } else {
            mask_next = arg == "--creds";
            shown.push(arg.clone());
        }
    }
    shown.join(" ")
}

enum ErrorClass {
    ImageNotFound,
    NotFound,
}

fn classify(stderr: &str) -> Option<ErrorClass> {
    let lower = stderr.to_lowercase();
    if IMAGE_NOT_FOUND_MARKERS.iter().any(|m| lower.contains(m)) {
        Some(ErrorClass::ImageNotFound)
    } else if NOT_FOUND_MARKERS.iter().any(|m| lower.contains(m)) {
        Some(ErrorClass::NotFound)
    } else {
        None
    }
}

/// Renders labels as repeated `--label k=v` flags in a stable order
fn push_labels(args: &mut Vec<String>, labels: &HashMap<String, String>) {
    let mut labels: Vec<_> = labels.iter().collect();
    labels.sort();
    for (key, value) in labels {
        args.push("--label".to_string());
        args.push(format!("{}={}", key, value));
    }
}

fn volume_create_args(req: &VolumeCreate) -> Vec<String> {
    let mut args = vec!["volume".to_string(), "create".to_string()];
    if !req.driver.is_empty() {
        args.push("--driver".to_string());
        args.push(req.driver.clone());
    }
    push_labels(&mut args, &req.labels);
    args.push(req.name.clone());
    args
}

fn network_create_args(req: &NetworkCreate) -> Vec<String> {
    let mut args = vec!["network".to_string(), "create".to_string()];
    if !req.driver.is_empty() {
        args.push("--driver".to_string());
        args.push(req.driver.clone());
    }
    push_labels(&mut args, &req.labels);
    args.push(req.name.clone());
    args
}

fn pull_args(image: &str, credentials: Option<(String, String)>) -> Vec<String> {
    let mut args = vec!["pull".to_string()];
    if let Some((username, password)) = credentials {
        args.push("--creds".to_string());
        args.push(format!("{}:{}", username, password));
    }
    args.push(image.to_string());
    args
}

fn create_args(config: &ContainerConfig) -> Vec<String> {
    let mut args = vec![
        "create".to_string(),
        "--name".to_string(),
        config.name.clone(),
        "--pull".to_string(),
        "never".to_string(),
    ];

    // --entrypoint takes a single executable; remaining entrypoint words
    // are passed ahead of the command
    let mut command: Vec<String> = Vec::new();
    if let Some((program, rest)) = config.entrypoint.split_first() {
        args.push("--entrypoint".to_string());
        args.push(program.clone());
        command.extend(rest.iter().cloned());
    }
    command.extend(config.command.iter().cloned());

    let mut env: Vec<_> = config.env.iter().collect();
    env.sort();
    for (key, value) in env {
        args.push("--env".to_string());
        args.push(format!("{}={}", key, value));
    }
    push_labels(&mut args, &config.labels);

    if let Some(dir) = &config.working_dir {
        args.push("--workdir".to_string());
        args.push(dir.clone());
    }
    if let Some(user) = &config.user {
        args.push("--user".to_string());
        args.push(user.clone());
    }
    if config.privileged {
        args.push("--privileged".to_string());
    }

    for mount in &config.mounts {
        let mut spec = match &mount.kind {
            MountKind::Volume => {
                format!("type=volume,source={},target={}", mount.source, mount.target)
            }
            MountKind::Bind => {
                format!("type=bind,source={},target={}", mount.source, mount.target)
            }
            MountKind::Tmpfs { size } => {
                let mut spec = format!("type=tmpfs,target={}", mount.target);
                if let Some(size) = size.filter(|s| *s > 0) {
                    spec.push_str(&format!(",tmpfs-size={}", size));
                }
                spec
            }
        };
        if mount.read_only {
            spec.push_str(",readonly=true");
        }
        args.push("--mount".to_string());
        args.push(spec);
    }

    if let Some(network) = &config.network {
        args.push("--network".to_string());
        args.push(network.clone());
        for alias in &config.network_aliases {
            args.push("--network-alias".to_string());
            args.push(alias.clone());
        }
    }

    if config.memory > 0 {
        args.push("--memory".to_string());
        args.push(config.memory.to_string());
    }
    if config.shm_size > 0 {
        args.push("--shm-size".to_string());
        args.push(config.shm_size.to_string());
    }
    if config.cpu_shares > 0 {
        args.push("--cpu-shares".to_string());
        args.push(config.cpu_shares.to_string());
    }

    args.push(config.image.clone());
    args.extend(command);
    args
}

fn remove_args(id: &str, opts: &RemoveOptions) -> Vec<String> {
    let mut args = vec!["rm".to_string()];
    if opts.force {
        args.push("--force".to_string());
    }
    if opts.remove_volumes {
        args.push("--volumes".to_string());
    }
    if opts.remove_links {
        args.push("--link".to_string());
    }
    args.push(id.to_string());
    args
}

fn logs_args(id: &str, opts: &LogsOptions) -> Vec<String> {
    let mut args = vec!["logs".to_string()];
    if opts.follow {
        args.push("--follow".to_string());
    }
    if opts.timestamps {
        args.push("--timestamps".to_string());
    }
    if opts.details {
        args.push("--details".to_string());
    }
    args.push(id.to_string());
    args
}

fn parse_wait(stdout: &[u8]) -> Result<i64> {
    let text = String::from_utf8_lossy(stdout);
    let line = text.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    line.parse::<i64>()
        .map_err(|_| RuntimeError::Parse(format!("unexpected wait output '{}'", line)))
}

fn parse_inspect(id: &str, stdout: &[u8]) -> Result<ContainerInspect> {
    let mut entries: Vec<ContainerInspect> = serde_json::from_slice(stdout)?;
    if entries.is_empty() {
        return Err(RuntimeError::NotFound(format!("container {}", id)));
    }
    Ok(entries.swap_remove(0))
}
