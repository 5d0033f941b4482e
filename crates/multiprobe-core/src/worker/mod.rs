//! Worker loop.
//!
//! The worker owns the one live Target API instance. It builds the instance,
//! reports the outcome as a startup acknowledgement, then serves commands one
//! at a time until its inbound channel closes or it is killed.
//!
//! # Lifecycle
//!
//! ```text
//! create(settings) ──► ack (void | error)
//!        │
//!        └─► loop: recv Command ─► invoke ─► send Acknowledgement
//! ```
//!
//! Operation failures and panics are packaged into the acknowledgement and
//! never end the loop. There is no stop command: the facade kills the worker.

pub mod trace;

use crate::config::ProbeSettings;
use crate::envelope::{Acknowledgement, Command};
use crate::error::{ErrorKind, RemoteError};
use crate::protocol::{encode, recv, send, write_frame};
use crate::target::{OperationRegistry, TargetApi};
use crate::{ProxyError, Result};
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tracing::{debug, info, warn};

/// Run one command against `api` and package the outcome.
pub fn execute_command<T>(
    api: &mut T,
    registry: &OperationRegistry<T>,
    command: &Command,
) -> Acknowledgement {
    let outcome = trace::catch_panic(|| registry.invoke(api, command.operation(), command.arguments()));

    match outcome {
        Ok(Ok(result)) => Acknowledgement::success(result),
        Ok(Err(error)) => {
            let trace = trace::render(command, &error, None);
            Acknowledgement::failure(error, trace)
        }
        Err((payload, report)) => {
            let error = RemoteError::from_panic(payload.as_ref());
            let trace = trace::render(command, &error, report.as_ref());
            Acknowledgement::failure(error, trace)
        }
    }
}

/// Serve commands until the inbound channel closes.
pub async fn serve<T, R, W>(
    api: &mut T,
    registry: &OperationRegistry<T>,
    reader: &mut R,
    writer: &mut W,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        let command: Command = match recv(reader).await? {
            Some(command) => command,
            None => {
                info!("Command channel closed, worker exiting");
                return Ok(());
            }
        };

        debug!("Executing '{}'", command.operation());
        let ack = execute_command(api, registry, &command);
        if let Some(error) = ack.error() {
            debug!("'{}' failed: {}", command.operation(), error);
        }
        let frame = encode_acknowledgement(&command, &ack)?;
        write_frame(writer, &frame).await?;
    }
}

/// Encode `ack`, replacing it with a failure when it cannot be framed.
fn encode_acknowledgement(command: &Command, ack: &Acknowledgement) -> Result<Vec<u8>> {
    match encode(ack) {
        Ok(frame) => Ok(frame),
        Err(e) => {
            warn!("Acknowledgement for '{}' cannot be sent: {}", command.operation(), e);
            let error = RemoteError::new(
                ErrorKind::Other,
                format!("result of '{}' could not be sent: {}", command.operation(), e),
            );
            let trace = trace::render(command, &error, None);
            encode(&Acknowledgement::failure(error.clone(), trace))
                .or_else(|_| encode(&Acknowledgement::failure(error, String::new())))
        }
    }
}

/// Build the Target API, acknowledge startup, then serve.
pub async fn run<T, R, W>(settings: ProbeSettings, mut reader: R, mut writer: W) -> Result<()>
where
    T: TargetApi,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    trace::install_panic_capture();

    let created = match trace::catch_panic(|| T::create(&settings)) {
        Ok(created) => created,
        Err((payload, _)) => Err(RemoteError::from_panic(payload.as_ref())),
    };

    let mut api = match created {
        Ok(api) => api,
        Err(error) => {
            warn!("Target API construction failed: {}", error);
            let startup = Command::new("create", vec![], Default::default());
            let trace = trace::render(&startup, &error, None);
            send(&mut writer, &Acknowledgement::failure(error.clone(), trace)).await?;
            return Err(ProxyError::Remote(error));
        }
    };

    let registry = T::registry();
    info!(
        "Worker ready for {} with {} operations",
        settings.device_family,
        registry.len()
    );
    send(&mut writer, &Acknowledgement::void()).await?;

    serve(&mut api, &registry, &mut reader, &mut writer).await
}

/// Run the worker over this process's stdin and stdout.
pub async fn run_stdio<T: TargetApi>(settings: ProbeSettings) -> Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    run::<T, _, _>(settings, stdin, stdout).await
}
