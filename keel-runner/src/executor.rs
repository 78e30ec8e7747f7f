//! Step execution
//!
//! Drives a single step container through create, start, tail and wait.

use crate::config::Config;
use crate::convert::to_container_config;
use crate::error::{EngineError, ResourceKind, Result};
use keel_core::{ImageRef, PullPolicy, Spec, State, Step};
use keel_runtime::{ByteStream, LogsOptions, PullOptions, RuntimeClient, auth, stdcopy};
use std::io;
use std::sync::Arc;
use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Whether the image must be pulled before the first create attempt
///
/// `Always` pulls unconditionally, `Default` only refreshes `latest` images
/// and otherwise relies on the pull-on-miss retry.
pub fn should_pull_first(policy: PullPolicy, is_latest: bool) -> bool {
    match policy {
        PullPolicy::Always => true,
        PullPolicy::Default => is_latest,
        PullPolicy::Never => false,
    }
}

/// Runs step containers against a runtime client
pub struct StepExecutor {
    client: Arc<dyn RuntimeClient>,
    config: Config,
}

impl StepExecutor {
    pub fn new(client: Arc<dyn RuntimeClient>, config: Config) -> Self {
        Self { client, config }
    }

    /// Creates the step container, pulling its image as the policy requires
    ///
    /// A create that fails because the image is missing is followed by one
    /// pull and exactly one more create, unless the policy is `Never`.
    pub async fn create(&self, spec: &Spec, step: &Step) -> Result<()> {
        let image = ImageRef::parse(&step.image).map_err(|source| EngineError::InvalidImage {
            step: step.name.clone(),
            source,
        })?;
        let reference = image.to_string();

        let pull_opts = PullOptions {
            registry_auth: step
                .auth
                .as_ref()
                .map(|creds| auth::encode(&creds.username, &creds.password)),
        };

        if should_pull_first(step.pull, image.is_latest()) {
            self.pull(&reference, &pull_opts).await?;
        }

        let config = to_container_config(spec, step);

        let err = match self.client.container_create(&config).await {
            Ok(()) => {
                debug!("Created container {} from {}", step.id, reference);
                return Ok(());
            }
            Err(err) => err,
        };

        if !err.is_image_not_found() {
            return Err(EngineError::ResourceCreation {
                resource: ResourceKind::Container,
                name: step.id.clone(),
                source: err,
            });
        }

        if step.pull == PullPolicy::Never {
            return Err(EngineError::ImageNotFound {
                step: step.name.clone(),
                image: reference,
                source: err,
            });
        }

        info!("Image {} not found locally, pulling", reference);
        self.pull(&reference, &pull_opts).await?;

        match self.client.container_create(&config).await {
            Ok(()) => {
                debug!("Created container {} from {}", step.id, reference);
                Ok(())
            }
            Err(err) if err.is_image_not_found() => Err(EngineError::ImageNotFound {
                step: step.name.clone(),
                image: reference,
                source: err,
            }),
            Err(err) => Err(EngineError::ResourceCreation {
                resource: ResourceKind::Container,
                name: step.id.clone(),
                source: err,
            }),
        }
    }

    /// Pulls an image and drains its progress output
    async fn pull(&self, reference: &str, opts: &PullOptions) -> Result<()> {
        info!("Pulling image {}", reference);
        let mut progress = self
            .client
            .image_pull(reference, opts)
            .await
            .map_err(|source| EngineError::Pull {
                image: reference.to_string(),
                source,
            })?;

        if let Err(err) = tokio::io::copy(&mut progress, &mut tokio::io::sink()).await {
            warn!("Failed to read pull output for {}: {}", reference, err);
        }
        Ok(())
    }

    pub async fn start(&self, step: &Step) -> Result<()> {
        self.client
            .container_start(&step.id)
            .await
            .map_err(|source| EngineError::Start {
                step: step.name.clone(),
                source,
            })?;
        info!("Started step {} ({})", step.name, step.id);
        Ok(())
    }

    /// Opens the combined, followed log stream of the step container
    pub async fn tail(&self, step: &Step) -> Result<ByteStream> {
        let opts = LogsOptions {
            follow: true,
            stdout: true,
            stderr: true,
            timestamps: false,
            details: false,
        };
        self.client
            .container_logs(&step.id, &opts)
            .await
            .map_err(|source| EngineError::StreamUnavailable {
                step: step.name.clone(),
                source,
            })
    }

    /// Waits for the step container to exit and reads its final state
    ///
    /// A failed wait call is not fatal: the container is inspected either
    /// way. While inspection still reports the container as running, waits
    /// again after `wait_retry_delay`.
    pub async fn wait(&self, step: &Step, cancel: &CancellationToken) -> Result<State> {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(EngineError::Cancelled { step: step.name.clone() });
                }
                res = self.client.container_wait(&step.id) => match res {
                    Ok(code) => debug!("Container {} exited with {}", step.id, code),
                    Err(err) => debug!("Waiting on container {} failed: {}", step.id, err),
                },
            }

            let inspect = self
                .client
                .container_inspect(&step.id)
                .await
                .map_err(|source| EngineError::Inspect {
                    step: step.name.clone(),
                    source,
                })?;

            if !inspect.state.running {
                return Ok(State {
                    exited: true,
                    exit_code: inspect.state.exit_code,
                    oom_killed: inspect.state.oom_killed,
                });
            }

            debug!("Container {} still running, waiting again", step.id);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(EngineError::Cancelled { step: step.name.clone() });
                }
                _ = tokio::time::sleep(self.config.wait_retry_delay) => {}
            }
        }
    }

    /// Runs a step to completion, copying its output into `output`
    ///
    /// The log copy runs alongside the wait. Once the step exited the copy
    /// gets up to `log_drain_timeout` to finish; copy failures are logged
    /// and never fail the step.
    pub async fn run(
        &self,
        spec: &Spec,
        step: &Step,
        output: &mut (dyn AsyncWrite + Send + Unpin),
        cancel: &CancellationToken,
    ) -> Result<State> {
        self.create(spec, step).await?;
        self.start(step).await?;
        let logs = self.tail(step).await?;

        let copy = stdcopy::copy_combined(logs, output);
        tokio::pin!(copy);
        let wait = self.wait(step, cancel);
        tokio::pin!(wait);

        let mut copied = false;
        let state = loop {
            tokio::select! {
                res = &mut copy, if !copied => {
                    log_copy_result(step, res);
                    copied = true;
                }
                res = &mut wait => break res?,
            }
        };

        if !copied {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!("Step {} cancelled while draining logs, detaching", step.name);
                }
                res = tokio::time::timeout(self.config.log_drain_timeout, &mut copy) => {
                    match res {
                        Ok(res) => log_copy_result(step, res),
                        Err(_) => warn!(
                            "Log stream of step {} still open {:?} after exit, detaching",
                            step.name, self.config.log_drain_timeout
                        ),
                    }
                }
            }
        }

        info!(
            "Step {} finished: exit code {}{}",
            step.name,
            state.exit_code,
            if state.oom_killed { " (OOM killed)" } else { "" }
        );
        Ok(state)
    }
}

fn log_copy_result(step: &Step, res: io::Result<u64>) {
    match res {
        Ok(bytes) => debug!("Copied {} log bytes from step {}", bytes, step.name),
        Err(err) => warn!("Log copy for step {} failed: {}", step.name, err),
    }
}
