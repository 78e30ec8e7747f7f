//! Orchestration engine
//!
//! Public contract of the step engine: `setup` once per pipeline, `run` once
//! per step, `destroy` once at the end regardless of step outcomes.

use crate::config::Config;
use crate::environment::{CleanupReport, EnvironmentManager};
use crate::error::Result;
use crate::executor::StepExecutor;
use async_trait::async_trait;
use keel_core::{Spec, State, Step};
use keel_runtime::{PodmanClient, RuntimeClient};
use std::sync::Arc;
use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;

/// Pipeline step engine
#[async_trait]
pub trait Engine: Send + Sync {
    /// Creates the volumes and network shared by the pipeline steps
    async fn setup(&self, spec: &Spec) -> Result<()>;

    /// Removes every resource the pipeline may have created
    ///
    /// Never fails; cleanup failures are listed in the report.
    async fn destroy(&self, spec: &Spec) -> CleanupReport;

    /// Runs one step and returns its terminal state
    ///
    /// The step output is written to `output`. An error means the step
    /// produced no state and must be treated as failed.
    async fn run(
        &self,
        spec: &Spec,
        step: &Step,
        output: &mut (dyn AsyncWrite + Send + Unpin),
        cancel: &CancellationToken,
    ) -> Result<State>;
}

/// Engine running steps as containers on a [`RuntimeClient`]
pub struct ContainerEngine {
    environment: EnvironmentManager,
    executor: StepExecutor,
}

impl ContainerEngine {
    pub fn new(client: Arc<dyn RuntimeClient>, config: Config) -> Self {
        Self {
            environment: EnvironmentManager::new(client.clone(), config.kill_signal.clone()),
            executor: StepExecutor::new(client, config),
        }
    }

    /// Creates an engine driving the runtime CLI named in the environment
    ///
    /// See [`Config::from_env`] for the variables read.
    pub fn from_env() -> anyhow::Result<Self> {
        let config = Config::from_env();
        config.validate()?;

        let client = PodmanClient::new(config.runtime_binary.clone());
        Ok(Self::new(Arc::new(client), config))
    }
}

#[async_trait]
impl Engine for ContainerEngine {
    async fn setup(&self, spec: &Spec) -> Result<()> {
        self.environment.setup(spec).await
    }

    async fn destroy(&self, spec: &Spec) -> CleanupReport {
        self.environment.destroy(spec).await
    }

    async fn run(
        &self,
        spec: &Spec,
        step: &Step,
        output: &mut (dyn AsyncWrite + Send + Unpin),
        cancel: &CancellationToken,
    ) -> Result<State> {
        self.executor.run(spec, step, output, cancel).await
    }
}
