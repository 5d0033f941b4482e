//! Multiprobe worker - hosts one probe API instance for a proxy.
//!
//! Commands arrive as length-prefixed frames on stdin and acknowledgements
//! leave on stdout, so nothing else may be written to stdout. Logs go to
//! stderr or to the file given with `--log-file`.

use anyhow::Result;
use clap::Parser;
use multiprobe::{DeviceFamily, ProbeSettings, SimulatedProbe};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{info, info_span, Instrument, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "multiprobe-worker")]
#[command(about = "Worker process hosting one probe API instance")]
struct Args {
    /// Device family the probe API starts with (name or number)
    #[arg(long, default_value = "UNKNOWN")]
    family: DeviceFamily,

    /// Path to the probe driver library
    #[arg(long)]
    library_path: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    log: bool,

    /// Prefix attached to every log line of this worker
    #[arg(long)]
    log_prefix: Option<String>,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Args {
    fn settings(&self) -> ProbeSettings {
        ProbeSettings {
            device_family: self.family,
            library_path: self.library_path.clone(),
            log: self.log,
            log_prefix: self.log_prefix.clone(),
            log_file_path: self.log_file.clone(),
        }
    }
}

fn init_logging(settings: &ProbeSettings) -> Result<()> {
    let level = if settings.logging_requested() {
        Level::DEBUG
    } else {
        Level::WARN
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    match &settings.log_file_path {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            FmtSubscriber::builder()
                .with_env_filter(filter)
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(false)
                .compact()
                .init();
        }
        None => {
            FmtSubscriber::builder()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact()
                .init();
        }
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings = args.settings();

    init_logging(&settings)?;

    let span = match &settings.log_prefix {
        Some(prefix) => info_span!("worker", prefix = %prefix),
        None => info_span!("worker"),
    };

    async {
        info!(
            "Starting worker for {} (PID {})",
            settings.device_family,
            std::process::id()
        );
        multiprobe::worker::run_stdio::<SimulatedProbe>(settings.clone()).await
    }
    .instrument(span)
    .await?;

    Ok(())
}
