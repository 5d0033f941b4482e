//! Multiprobe - cross-process command proxy for single-instance probe APIs.
//!
//! A debug-probe driver library may only be loaded once per process. This
//! crate moves each live Target API instance into its own worker process and
//! hands the caller a [`ProbeProxy`] that forwards named operations to it, so
//! several probes can be driven from one program.
//!
//! # Example
//!
//! ```rust,ignore
//! use multiprobe::{DeviceFamily, ProbeProxy, ProbeSettings, SimulatedProbe};
//!
//! #[tokio::main]
//! async fn main() -> multiprobe::Result<()> {
//!     let settings = ProbeSettings::new(DeviceFamily::Nrf52);
//!     let probe = ProbeProxy::spawn::<SimulatedProbe>("multiprobe-worker", &settings).await?;
//!
//!     probe.operation("open")?.call().await?;
//!     let snrs: Vec<u32> = probe.operation("enum_emu_snr")?.call_as().await?;
//!     println!("Found {} emulators", snrs.len());
//!
//!     probe.terminate().await
//! }
//! ```

pub mod config;
pub mod envelope;
pub mod error;
pub mod lock;
pub mod protocol;
pub mod proxy;
pub mod target;
pub mod worker;

// Re-export commonly used types
pub use config::{DeviceFamily, ProbeSettings, ProxyConfig};
pub use envelope::{Acknowledgement, Command};
pub use error::{ErrorKind, ProxyError, RemoteError, Result};
pub use lock::BoundedWaitGuard;
pub use proxy::{
    sibling_worker_path, ChildWorker, LocalWorker, ProbeProxy, RemoteOperation, WorkerChannels,
    WorkerHandle,
};
pub use target::{Arguments, OperationRegistry, OperationSet, SimulatedProbe, TargetApi};
