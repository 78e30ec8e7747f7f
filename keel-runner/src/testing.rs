//! Recording runtime fake for engine tests

use async_trait::async_trait;
use keel_runtime::stdcopy::{self, StreamKind};
use keel_runtime::{
    ByteStream, ContainerConfig, ContainerInspect, ContainerState, LogsOptions, NetworkCreate,
    PullOptions, RemoveOptions, Result, RuntimeClient, RuntimeError, VolumeCreate,
};
use std::collections::{HashSet, VecDeque};
use std::io::Cursor;
use std::sync::Mutex;
use tokio::io::DuplexStream;

/// Runtime operation, used to inject failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    VolumeCreate,
    VolumeRemove,
    NetworkCreate,
    NetworkRemove,
    Pull,
    Create,
    Start,
    Kill,
    Remove,
    Wait,
    Inspect,
    Logs,
}

/// A recorded runtime call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    VolumeCreate(String),
    VolumeRemove(String),
    NetworkCreate { name: String, driver: String },
    NetworkRemove(String),
    Pull { image: String, auth: Option<String> },
    Create(String),
    Start(String),
    Kill(String),
    Remove(String),
    Wait(String),
    Inspect(String),
    Logs(String),
}

/// In-memory runtime recording every call
pub struct FakeRuntime {
    calls: Mutex<Vec<Call>>,
    failing: HashSet<Op>,
    image_local: Mutex<bool>,
    pull_fetches_image: bool,
    inspections: Mutex<VecDeque<ContainerState>>,
    logs: Vec<(StreamKind, Vec<u8>)>,
    hang_logs: bool,
    open_log_writers: Mutex<Vec<DuplexStream>>,
    wait_forever: bool,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failing: HashSet::new(),
            image_local: Mutex::new(true),
            pull_fetches_image: true,
            inspections: Mutex::new(VecDeque::new()),
            logs: Vec::new(),
            hang_logs: false,
            open_log_writers: Mutex::new(Vec::new()),
            wait_forever: false,
        }
    }

    /// Makes every call of `op` fail
    pub fn failing(mut self, op: Op) -> Self {
        self.failing.insert(op);
        self
    }

    /// Image is not present until pulled
    pub fn without_image(self) -> Self {
        *self.image_local.lock().unwrap() = false;
        self
    }

    /// Pulls succeed but never make the image available
    pub fn with_unusable_pulls(mut self) -> Self {
        self.pull_fetches_image = false;
        self
    }

    /// Container states returned by successive inspections; once drained,
    /// inspections report a clean exit
    pub fn with_inspections(self, states: Vec<ContainerState>) -> Self {
        *self.inspections.lock().unwrap() = states.into();
        self
    }

    /// Multiplexed log output returned by the log stream
    pub fn with_logs(mut self, frames: &[(StreamKind, &[u8])]) -> Self {
        self.logs = frames
            .iter()
            .map(|(stream, payload)| (*stream, payload.to_vec()))
            .collect();
        self
    }

    /// Log stream that never reaches end of stream
    pub fn with_hanging_logs(mut self) -> Self {
        self.hang_logs = true;
        self
    }

    /// Container wait never returns
    pub fn with_endless_wait(mut self) -> Self {
        self.wait_forever = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: Call, op: Op) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        if self.failing.contains(&op) {
            return Err(RuntimeError::Command {
                program: "fake".to_string(),
                args: format!("{:?}", op),
                exit_code: Some(125),
                stderr: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RuntimeClient for FakeRuntime {
    async fn volume_create(&self, req: &VolumeCreate) -> Result<()> {
        self.record(Call::VolumeCreate(req.name.clone()), Op::VolumeCreate)
    }

    async fn volume_remove(&self, name: &str, _force: bool) -> Result<()> {
        self.record(Call::VolumeRemove(name.to_string()), Op::VolumeRemove)
    }

    async fn network_create(&self, req: &NetworkCreate) -> Result<()> {
        self.record(
            Call::NetworkCreate {
                name: req.name.clone(),
                driver: req.driver.clone(),
            },
            Op::NetworkCreate,
        )
    }

    async fn network_remove(&self, name: &str) -> Result<()> {
        self.record(Call::NetworkRemove(name.to_string()), Op::NetworkRemove)
    }

    async fn image_pull(&self, image: &str, opts: &PullOptions) -> Result<ByteStream> {
        self.record(
            Call::Pull {
                image: image.to_string(),
                auth: opts.registry_auth.clone(),
            },
            Op::Pull,
        )?;
        if self.pull_fetches_image {
            *self.image_local.lock().unwrap() = true;
        }
        Ok(Box::new(Cursor::new(b"Pulling fs layer\nDone\n".to_vec())))
    }

    async fn container_create(&self, config: &ContainerConfig) -> Result<()> {
        self.record(Call::Create(config.name.clone()), Op::Create)?;
        if !*self.image_local.lock().unwrap() {
            return Err(RuntimeError::ImageNotFound(format!(
                "{}: image not known",
                config.image
            )));
        }
        Ok(())
    }

    async fn container_start(&self, id: &str) -> Result<()> {
        self.record(Call::Start(id.to_string()), Op::Start)
    }

    async fn container_kill(&self, id: &str, _signal: &str) -> Result<()> {
        self.record(Call::Kill(id.to_string()), Op::Kill)
    }

    async fn container_remove(&self, id: &str, _opts: &RemoveOptions) -> Result<()> {
        self.record(Call::Remove(id.to_string()), Op::Remove)
    }

    async fn container_wait(&self, id: &str) -> Result<i64> {
        self.record(Call::Wait(id.to_string()), Op::Wait)?;
        if self.wait_forever {
            std::future::pending::<()>().await;
        }
        Ok(0)
    }

    async fn container_inspect(&self, id: &str) -> Result<ContainerInspect> {
        self.record(Call::Inspect(id.to_string()), Op::Inspect)?;
        let state = self
            .inspections
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ContainerState {
                status: "exited".to_string(),
                ..Default::default()
            });
        Ok(ContainerInspect {
            id: id.to_string(),
            name: id.to_string(),
            state,
        })
    }

    async fn container_logs(&self, id: &str, _opts: &LogsOptions) -> Result<ByteStream> {
        self.record(Call::Logs(id.to_string()), Op::Logs)?;
        if self.hang_logs {
            let (reader, mut writer) = tokio::io::duplex(1024);
            stdcopy::write_frame(&mut writer, StreamKind::Stdout, b"still going\n").await?;
            self.open_log_writers.lock().unwrap().push(writer);
            return Ok(Box::new(reader));
        }
        let mut buf: Vec<u8> = Vec::new();
        for (stream, payload) in &self.logs {
            stdcopy::write_frame(&mut buf, *stream, payload).await?;
        }
        Ok(Box::new(Cursor::new(buf)))
    }
}

/// Convenience for building an inspected state
pub fn exited(exit_code: i64, oom_killed: bool) -> ContainerState {
    ContainerState {
        status: "exited".to_string(),
        running: false,
        exit_code,
        oom_killed,
    }
}

pub fn running() -> ContainerState {
    ContainerState {
        status: "running".to_string(),
        running: true,
        ..Default::default()
    }
}
