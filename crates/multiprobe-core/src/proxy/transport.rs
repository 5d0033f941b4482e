//! Worker transports.
//!
//! A facade talks to its worker through a [`WorkerChannels`] pair and controls
//! its lifetime through a [`WorkerHandle`]. Two workers are provided:
//! - [`ChildWorker`]: a separate OS process speaking over stdin/stdout.
//! - [`LocalWorker`]: a tokio task in this process, over an in-memory pipe.

use crate::config::{ProbeSettings, ProxyConfig};
use crate::target::TargetApi;
use crate::worker;
use crate::{ProxyError, Result};
use async_trait::async_trait;
use std::ffi::OsStr;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Inbound (commands) and outbound (acknowledgements) channel ends held by
/// the facade.
pub struct WorkerChannels {
    pub(crate) inbound: Box<dyn AsyncWrite + Send + Unpin>,
    pub(crate) outbound: Box<dyn AsyncRead + Send + Unpin>,
}

impl WorkerChannels {
    pub fn new<W, R>(inbound: W, outbound: R) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            inbound: Box::new(inbound),
            outbound: Box::new(outbound),
        }
    }
}

impl std::fmt::Debug for WorkerChannels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerChannels").finish_non_exhaustive()
    }
}

/// Lifetime control over a running worker.
#[async_trait]
pub trait WorkerHandle: Send {
    /// Stop the worker abruptly. Work in flight is abandoned.
    async fn kill(&mut self) -> Result<()>;

    /// Wait until the worker has fully exited.
    async fn wait(&mut self) -> Result<()>;

    /// OS process id, when the worker is a separate process.
    fn pid(&self) -> Option<u32> {
        None
    }
}

/// Worker running as a child process.
#[derive(Debug)]
pub struct ChildWorker {
    child: Child,
    pid: Option<u32>,
}

impl ChildWorker {
    /// Spawn `program` with the settings as command-line flags.
    ///
    /// The child's stdin carries commands and its stdout acknowledgements;
    /// stderr is inherited so worker logs stay visible.
    pub fn spawn(program: impl AsRef<OsStr>, settings: &ProbeSettings) -> Result<(Self, WorkerChannels)> {
        let program = program.as_ref();
        let spawn_error = |message: String| ProxyError::Spawn {
            program: program.to_string_lossy().into_owned(),
            message,
        };

        let mut child = Command::new(program)
            .args(settings.to_worker_args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error(e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| spawn_error("stdin was not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_error("stdout was not captured".to_string()))?;

        let pid = child.id();
        info!("Spawned worker {} (PID {:?})", program.to_string_lossy(), pid);

        Ok((Self { child, pid }, WorkerChannels::new(stdin, BufReader::new(stdout))))
    }
}

#[async_trait]
impl WorkerHandle for ChildWorker {
    async fn kill(&mut self) -> Result<()> {
        debug!("Killing worker process {:?}", self.pid);
        self.child.start_kill().map_err(|e| {
            warn!("Failed to kill worker process {:?}: {}", self.pid, e);
            ProxyError::from(e)
        })
    }

    async fn wait(&mut self) -> Result<()> {
        let status = self.child.wait().await?;
        debug!("Worker process {:?} exited with {}", self.pid, status);
        Ok(())
    }

    fn pid(&self) -> Option<u32> {
        self.pid
    }
}

/// Worker running as a task inside this process.
///
/// Suitable for targets that tolerate living in the caller's process, and for
/// tests. Operations run inline on the task, so long-running operations hold
/// a runtime thread.
#[derive(Debug)]
pub struct LocalWorker {
    task: Option<JoinHandle<Result<()>>>,
}

impl LocalWorker {
    pub fn spawn<T: TargetApi>(settings: ProbeSettings) -> (Self, WorkerChannels) {
        let (facade_end, worker_end) = tokio::io::duplex(ProxyConfig::LOCAL_PIPE_CAPACITY);
        let (worker_read, worker_write) = tokio::io::split(worker_end);
        let task = tokio::spawn(worker::run::<T, _, _>(settings, worker_read, worker_write));

        let (facade_read, facade_write) = tokio::io::split(facade_end);
        (
            Self { task: Some(task) },
            WorkerChannels::new(facade_write, facade_read),
        )
    }
}

#[async_trait]
impl WorkerHandle for LocalWorker {
    async fn kill(&mut self) -> Result<()> {
        if let Some(task) = &self.task {
            task.abort();
        }
        Ok(())
    }

    async fn wait(&mut self) -> Result<()> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };
        match task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                debug!("Local worker ended with error: {}", e);
                Ok(())
            }
            Err(e) if e.is_cancelled() => Ok(()),
            Err(e) => Err(ProxyError::WorkerLost {
                message: format!("local worker panicked: {}", e),
            }),
        }
    }
}

impl Drop for LocalWorker {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
