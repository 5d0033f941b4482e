//! Caller-facing proxy for a worker-owned Target API.
//!
//! [`ProbeProxy`] forwards any declared operation to its worker and returns
//! the result, or the worker's error with its kind and message intact.
//!
//! # Thread Safety
//!
//! One execution lock per proxy guards both channels, so exactly one command
//! is in flight at a time and acknowledgements match commands by order alone.
//! Callers wait at most [`ProxyConfig::EXEC_LOCK_TIMEOUT`] for the lock; the
//! wait for an acknowledgement itself is unbounded.

pub mod transport;

pub use transport::{ChildWorker, LocalWorker, WorkerChannels, WorkerHandle};

use crate::config::{ProbeSettings, ProxyConfig};
use crate::envelope::{Acknowledgement, Command};
use crate::lock::BoundedWaitGuard;
use crate::protocol::{recv, send};
use crate::target::{OperationSet, TargetApi};
use crate::{ProxyError, Result};
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Proxy that drives one Target API instance living in a worker.
pub struct ProbeProxy {
    operations: OperationSet,
    /// Execution lock; `None` once the channels are closed.
    exec_lock: Arc<Mutex<Option<WorkerChannels>>>,
    worker: Mutex<Option<Box<dyn WorkerHandle>>>,
    terminated: AtomicBool,
    lock_timeout: Duration,
}

impl ProbeProxy {
    /// Start `program` as the worker process for `T` and wait for it to
    /// construct the Target API.
    pub async fn spawn<T: TargetApi>(program: impl AsRef<OsStr>, settings: &ProbeSettings) -> Result<Self> {
        let (worker, channels) = ChildWorker::spawn(program, settings)?;
        Self::from_transport(T::registry().names(), channels, Box::new(worker))
            .await_startup()
            .await
    }

    /// Run the worker for `T` as a task inside this process.
    pub async fn local<T: TargetApi>(settings: &ProbeSettings) -> Result<Self> {
        let (worker, channels) = LocalWorker::spawn::<T>(settings.clone());
        Self::from_transport(T::registry().names(), channels, Box::new(worker))
            .await_startup()
            .await
    }

    /// Assemble a proxy over an existing channel pair. No startup
    /// acknowledgement is awaited.
    pub fn from_transport(
        operations: OperationSet,
        channels: WorkerChannels,
        worker: Box<dyn WorkerHandle>,
    ) -> Self {
        Self {
            operations,
            exec_lock: Arc::new(Mutex::new(Some(channels))),
            worker: Mutex::new(Some(worker)),
            terminated: AtomicBool::new(false),
            lock_timeout: ProxyConfig::EXEC_LOCK_TIMEOUT,
        }
    }

    /// Override the execution lock timeout.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    async fn await_startup(self) -> Result<Self> {
        let startup = {
            let mut slot = self.exec_lock.lock().await;
            match slot.as_mut() {
                Some(channels) => recv::<_, Acknowledgement>(&mut channels.outbound).await,
                None => Ok(None),
            }
        };

        let failure = match startup {
            Ok(Some(ack)) => match ack.into_outcome() {
                Ok(_) => None,
                Err((remote, trace)) => {
                    error!("Worker failed to start:\n{}", trace);
                    Some(ProxyError::Remote(remote))
                }
            },
            Ok(None) => Some(ProxyError::WorkerLost {
                message: "worker exited before acknowledging startup".to_string(),
            }),
            Err(e) => Some(e),
        };

        match failure {
            None => {
                debug!("Worker acknowledged startup");
                Ok(self)
            }
            Some(err) => {
                if let Err(e) = self.terminate().await {
                    warn!("Failed to tear down worker after startup failure: {}", e);
                }
                Err(err)
            }
        }
    }

    /// Operations this proxy forwards.
    pub fn operations(&self) -> &OperationSet {
        &self.operations
    }

    /// Resolve an operation by name.
    ///
    /// Fails with [`ProxyError::UnknownOperation`] when the Target API does
    /// not declare `name`; nothing is sent in that case.
    pub fn operation(&self, name: &str) -> Result<RemoteOperation<'_>> {
        if !self.operations.contains(name) {
            return Err(ProxyError::UnknownOperation {
                name: name.to_string(),
            });
        }
        Ok(RemoteOperation {
            proxy: self,
            name: name.to_string(),
            args: Vec::new(),
            kwargs: Map::new(),
        })
    }

    /// Run `name` in the worker and wait for its acknowledgement.
    ///
    /// Returns `Ok(None)` for operations that produce no value.
    ///
    /// The exchange runs on its own task holding the execution lock, so
    /// dropping this future stops the wait but not the exchange: the
    /// acknowledgement is still consumed before the next command goes out.
    pub async fn execute(
        &self,
        name: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<Option<Value>> {
        if !self.is_alive() {
            return Err(ProxyError::Unavailable);
        }
        if !self.operations.contains(name) {
            return Err(ProxyError::UnknownOperation {
                name: name.to_string(),
            });
        }

        let command = Command::new(name, args, kwargs);
        let guard = BoundedWaitGuard::acquire(&self.exec_lock, self.lock_timeout).await;
        let Some(mut slot) = guard.into_owned() else {
            return Err(ProxyError::AcquisitionTimeout(self.lock_timeout));
        };
        if slot.is_none() {
            return Err(if self.is_alive() {
                ProxyError::WorkerLost {
                    message: "worker channel was closed by an earlier failure".to_string(),
                }
            } else {
                ProxyError::Unavailable
            });
        }

        let exchange = tokio::spawn(async move {
            let Some(channels) = slot.as_mut() else {
                return Err(ProxyError::Unavailable);
            };
            let outcome = Self::round_trip(channels, &command).await;
            if matches!(outcome, Err(ProxyError::WorkerLost { .. })) {
                // Framing is out of step once a round trip breaks.
                slot.take();
            }
            outcome
        });
        let ack = exchange.await.map_err(|e| ProxyError::WorkerLost {
            message: format!("command exchange failed: {}", e),
        })??;

        match ack.into_outcome() {
            Ok(result) => Ok(result),
            Err((remote, trace)) => {
                error!("Remote operation '{}' failed:\n{}", name, trace);
                Err(ProxyError::Remote(remote))
            }
        }
    }

    async fn round_trip(channels: &mut WorkerChannels, command: &Command) -> Result<Acknowledgement> {
        debug!("Sending '{}' to worker", command.operation());
        send(&mut channels.inbound, command)
            .await
            .map_err(|e| ProxyError::WorkerLost {
                message: format!("failed to send command: {}", e),
            })?;

        match recv(&mut channels.outbound).await {
            Ok(Some(ack)) => Ok(ack),
            Ok(None) => Err(ProxyError::WorkerLost {
                message: format!(
                    "worker closed its channel while running '{}'",
                    command.operation()
                ),
            }),
            Err(e @ ProxyError::Json { .. }) => Err(e),
            Err(e) => Err(ProxyError::WorkerLost {
                message: e.to_string(),
            }),
        }
    }

    /// Whether the proxy still accepts calls. Never blocks.
    pub fn is_alive(&self) -> bool {
        !self.terminated.load(Ordering::SeqCst)
    }

    /// OS process id of the worker, if it is a separate process.
    pub async fn worker_pid(&self) -> Option<u32> {
        self.worker.lock().await.as_ref().and_then(|w| w.pid())
    }

    /// Kill the worker and close both channels. Calling it again is a no-op.
    ///
    /// Order: kill the worker, close the channels, wait for the worker to
    /// exit, then mark the proxy dead. A call in flight fails with
    /// [`ProxyError::WorkerLost`].
    pub async fn terminate(&self) -> Result<()> {
        let Some(mut handle) = self.worker.lock().await.take() else {
            return Ok(());
        };

        info!("Terminating worker (PID {:?})", handle.pid());
        if let Err(e) = handle.kill().await {
            warn!("Failed to kill worker: {}", e);
        }

        // Any in-flight call observes EOF once the worker is gone and
        // releases the lock.
        self.exec_lock.lock().await.take();

        let waited = handle.wait().await;
        self.terminated.store(true, Ordering::SeqCst);
        waited
    }

    /// Run `body` between an implicit `open` and `close`, then terminate.
    ///
    /// `close` and `terminate` run whatever `body` returns. The first error
    /// wins: the body's, then `close`'s, then `terminate`'s.
    pub async fn scoped<F, R>(self, body: F) -> Result<R>
    where
        F: for<'p> FnOnce(&'p ProbeProxy) -> BoxFuture<'p, Result<R>>,
    {
        if let Err(e) = self.execute("open", Vec::new(), Map::new()).await {
            if let Err(te) = self.terminate().await {
                warn!("Failed to terminate after open error: {}", te);
            }
            return Err(e);
        }

        let outcome = body(&self).await;
        let closed = self.execute("close", Vec::new(), Map::new()).await;
        let terminated = self.terminate().await;

        let value = outcome?;
        closed?;
        terminated?;
        Ok(value)
    }
}

impl std::fmt::Debug for ProbeProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeProxy")
            .field("operations", &self.operations.len())
            .field("alive", &self.is_alive())
            .field("lock_timeout", &self.lock_timeout)
            .finish()
    }
}

/// A resolved operation, collecting arguments before the call.
#[derive(Debug)]
pub struct RemoteOperation<'a> {
    proxy: &'a ProbeProxy,
    name: String,
    args: Vec<Value>,
    kwargs: Map<String, Value>,
}

impl<'a> RemoteOperation<'a> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a positional argument.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Set a keyword argument.
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(name.into(), value.into());
        self
    }

    pub async fn call(self) -> Result<Option<Value>> {
        self.proxy.execute(&self.name, self.args, self.kwargs).await
    }

    /// Call and decode the result. A void result decodes from JSON `null`.
    pub async fn call_as<R: DeserializeOwned>(self) -> Result<R> {
        let name = self.name.clone();
        let value = self.call().await?.unwrap_or(Value::Null);
        serde_json::from_value(value).map_err(|e| ProxyError::Json {
            message: format!("unexpected result type from '{}': {}", name, e),
            source: Some(e),
        })
    }
}

/// Path of the worker binary installed next to the current executable.
pub fn sibling_worker_path() -> Result<PathBuf> {
    let exe = std::env::current_exe()?;
    let dir = exe.parent().ok_or_else(|| ProxyError::Spawn {
        program: ProxyConfig::WORKER_BINARY.to_string(),
        message: format!("{} has no parent directory", exe.display()),
    })?;
    Ok(dir.join(format!(
        "{}{}",
        ProxyConfig::WORKER_BINARY,
        std::env::consts::EXE_SUFFIX
    )))
}
