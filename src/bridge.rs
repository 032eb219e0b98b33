//! The isolation transport: running one benchmark per freshly spawned child process.
//!
//! Isolated mode needs a deterministic 1:1 fragment-to-runtime mapping, guaranteed
//! shutdown, and error surfacing equivalent to the local path. This module supplies
//! that with the current executable re-invoked in a hidden worker mode, talking
//! newline-delimited JSON over its stdio.
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    process::{Child, Command},
    time::timeout,
};

use crate::{
    error::Error,
    executor::RunOutcome,
    fragment::CodeFragment,
    sampler::SampleOptions,
    squeeze::SqueezeOptions,
};

/// The hidden CLI flag that switches the re-exec'd child into worker mode.
pub const ISOLATION_WORKER_FLAG: &str = "--isolation-worker";

const CONTROL_TIMEOUT: Duration = Duration::from_secs(10);

/// The single request an isolated runtime instance accepts: run one fragment once.
#[derive(Debug, Serialize, Deserialize)]
pub struct IsolatedRequest {
    pub fragment: CodeFragment,
    pub concurrency: u32,
    pub sample_options: SampleOptions,
    pub squeeze_options: Option<SqueezeOptions>,
}

#[derive(Debug, Serialize, Deserialize)]
enum IsolatedResponse {
    Ok(RunOutcome),
    Err(String),
}

/// One freshly started, single-use runtime instance.
#[async_trait]
pub trait RuntimeHandle: Send {
    /// Executes one fragment remotely, bounded by a fixed control-plane timeout.
    async fn run(
        &mut self,
        fragment: &CodeFragment,
        concurrency: u32,
        sample_options: &SampleOptions,
        squeeze_options: Option<&SqueezeOptions>,
    ) -> Result<RunOutcome, Error>;

    /// Shuts the remote runtime down. Always safe to call more than once.
    async fn shutdown(&mut self);
}

/// Prepares isolated runtime instances for a benchmark.
#[async_trait]
pub trait IsolationBridge: Send + Sync {
    /// Starts `n` fresh runtime instances, one per code fragment to be isolated.
    async fn prepare(&self, n: usize) -> Result<Vec<Box<dyn RuntimeHandle>>, Error>;
}

/// The concrete bridge: spawns the current executable in `--isolation-worker` mode.
pub struct ChildProcessBridge;

impl ChildProcessBridge {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ChildProcessBridge {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IsolationBridge for ChildProcessBridge {
    async fn prepare(&self, n: usize) -> Result<Vec<Box<dyn RuntimeHandle>>, Error> {
        let exe = std::env::current_exe()
            .map_err(|e| Error::IsolationStartFailed(format!("cannot resolve current executable: {e}")))?;

        let mut handles: Vec<Box<dyn RuntimeHandle>> = Vec::with_capacity(n);
        for _ in 0..n {
            let mut command = Command::new(&exe);
            command
                .arg(ISOLATION_WORKER_FLAG)
                .kill_on_drop(true)
                .stdin(std::process::Stdio::piped())
                .stdout(std::process::Stdio::piped())
                .stderr(std::process::Stdio::inherit());

            let child = command
                .spawn()
                .map_err(|e| Error::IsolationStartFailed(format!("failed to spawn isolation worker: {e}")))?;

            handles.push(Box::new(ChildRuntimeHandle { child: Some(child) }));
        }
        Ok(handles)
    }
}

struct ChildRuntimeHandle {
    child: Option<Child>,
}

#[async_trait]
impl RuntimeHandle for ChildRuntimeHandle {
    async fn run(
        &mut self,
        fragment: &CodeFragment,
        concurrency: u32,
        sample_options: &SampleOptions,
        squeeze_options: Option<&SqueezeOptions>,
    ) -> Result<RunOutcome, Error> {
        let child = self
            .child
            .as_mut()
            .ok_or_else(|| Error::IsolationStartFailed("runtime already shut down".into()))?;

        let request = IsolatedRequest {
            fragment: fragment.clone(),
            concurrency,
            sample_options: sample_options.clone(),
            squeeze_options: squeeze_options.cloned(),
        };
        let mut line = serde_json::to_string(&request).map_err(|e| Error::Other(e.into()))?;
        line.push('\n');

        let stdin = child
            .stdin
            .as_mut()
            .ok_or_else(|| Error::IsolationStartFailed("worker stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .as_mut()
            .ok_or_else(|| Error::IsolationStartFailed("worker stdout unavailable".into()))?;

        let round_trip = async {
            stdin.write_all(line.as_bytes()).await?;
            stdin.flush().await?;
            let mut reader = BufReader::new(stdout);
            let mut response_line = String::new();
            reader.read_line(&mut response_line).await?;
            Ok::<_, std::io::Error>(response_line)
        };

        let response_line = timeout(CONTROL_TIMEOUT, round_trip)
            .await
            .map_err(|_| Error::IsolationTimeout(CONTROL_TIMEOUT))?
            .map_err(|e| Error::IsolationStartFailed(format!("worker I/O failed: {e}")))?;

        let response: IsolatedResponse = serde_json::from_str(response_line.trim())
            .map_err(|e| Error::IsolationStartFailed(format!("malformed worker response: {e}")))?;

        match response {
            IsolatedResponse::Ok(outcome) => Ok(outcome),
            IsolatedResponse::Err(msg) => Err(Error::IsolationStartFailed(msg)),
        }
    }

    async fn shutdown(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = timeout(CONTROL_TIMEOUT, child.wait()).await;
            let _ = child.kill().await;
        }
    }
}

/// The isolation-worker side: reads exactly one [`IsolatedRequest`] from stdin, runs
/// it locally, writes exactly one [`IsolatedResponse`] to stdout, then returns.
///
/// This is invoked from `main` when `--isolation-worker` is present; it never routes
/// back through [`ChildProcessBridge`], since isolation is not recursive: no runtime
/// is reused, and a worker never spawns a worker of its own.
pub async fn run_isolation_worker() -> Result<(), Error> {
    use tokio::io::{AsyncBufReadExt as _, stdin};

    let mut reader = BufReader::new(stdin());
    let mut line = String::new();
    reader
        .read_line(&mut line)
        .await
        .map_err(|e| Error::IsolationStartFailed(format!("failed to read request: {e}")))?;

    let request: IsolatedRequest = serde_json::from_str(line.trim())
        .map_err(|e| Error::IsolationStartFailed(format!("malformed request: {e}")))?;

    let result = crate::executor::run_local(
        &request.fragment,
        request.concurrency,
        &request.sample_options,
        request.squeeze_options.as_ref(),
    )
    .await;

    let response = match result {
        Ok(outcome) => IsolatedResponse::Ok(outcome),
        Err(e) => IsolatedResponse::Err(e.to_string()),
    };
    let mut out = serde_json::to_string(&response).map_err(|e| Error::Other(e.into()))?;
    out.push('\n');
    tokio::io::stdout().write_all(out.as_bytes()).await.map_err(|e| Error::Other(e.into()))?;
    tokio::io::stdout().flush().await.map_err(|e| Error::Other(e.into()))?;
    Ok(())
}
