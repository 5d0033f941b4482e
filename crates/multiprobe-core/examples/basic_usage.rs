//! Basic usage example - drive two simulated probes side by side
//!
//! Usage:
//!   cargo build --package multiprobe-worker
//!   cargo run --package multiprobe --example basic_usage -- target/debug/multiprobe-worker

use multiprobe::{sibling_worker_path, DeviceFamily, ProbeProxy, ProbeSettings, Result, SimulatedProbe};
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<()> {
    // Get worker path from args or look next to this executable
    let worker = match std::env::args().nth(1) {
        Some(path) => PathBuf::from(path),
        None => sibling_worker_path()?,
    };

    println!("Starting workers from: {}", worker.display());

    let nrf52 = ProbeProxy::spawn::<SimulatedProbe>(&worker, &ProbeSettings::new(DeviceFamily::Nrf52)).await?;
    let nrf91 = ProbeProxy::spawn::<SimulatedProbe>(&worker, &ProbeSettings::new(DeviceFamily::Nrf91)).await?;

    for (label, probe) in [("nrf52", &nrf52), ("nrf91", &nrf91)] {
        probe.operation("open")?.call().await?;
        let snrs: Vec<u32> = probe.operation("enum_emu_snr")?.call_as().await?;
        println!("{}: worker PID {:?}, emulators {:?}", label, probe.worker_pid().await, snrs);

        probe.operation("connect_to_emu_without_snr")?.call().await?;
        probe.operation("connect_to_device")?.call().await?;
        let word: u32 = probe.operation("read_u32")?.arg(0x1000_1000u32).call_as().await?;
        println!("{}: UICR[0] = {:#010x}", label, word);
    }

    nrf52.terminate().await?;
    nrf91.terminate().await?;
    Ok(())
}
