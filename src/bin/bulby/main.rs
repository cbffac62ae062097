//! `bulby` command line client and daemon.

mod config;

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use bulby::interrupt::{CancelToken, install_handler};
use bulby::sequencer::{DeviceLink, Sequencer, Termination};
use bulby::serial::{BAUD_RATE, SerialLink, resolve_device};
use bulby::time::ThreadPacer;
use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt::time::UtcTime;

use crate::config::{Cli, Command};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_level.into());

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("bulby: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(level: LevelFilter) {
    let subscriber = tracing_subscriber::fmt()
        .with_timer(UtcTime::rfc_3339())
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn run(cli: Cli) -> Result<()> {
    #[cfg(unix)]
    let socket = cli.bus_socket();
    #[cfg(not(unix))]
    let socket = std::path::PathBuf::new();

    if let Command::Daemon { device } = &cli.command {
        return run_daemon(device, &socket);
    }
    let Some(plan) = cli.command.plan() else {
        return Ok(());
    };

    // Validate before touching the device.
    let sequence = plan.to_sequence().context("invalid animation")?;

    // Signals keep their default action until the link is up, so a client
    // stuck waiting for a busy daemon can still be interrupted.
    let cancel = if plan.is_sequenced() {
        CancelToken::watching_signals()
    } else {
        CancelToken::new()
    };
    let link = open_link(cli.serial.as_deref(), &socket, &cancel)?;
    if plan.is_sequenced() {
        install_handler().context("failed to install signal handler")?;
    }
    let mut sequencer = Sequencer::new(link, ThreadPacer::new(cancel.clone()), cancel);

    let outcome = match &sequence {
        Some(sequence) => sequencer.run(sequence),
        None => sequencer.handle_plan(plan),
    };
    let close = sequencer.close();

    match outcome.context("animation failed")? {
        Termination::Interrupted => tracing::info!("interrupted"),
        Termination::Completed | Termination::Failed => {}
    }
    close.context("failed to close device link")?;
    Ok(())
}

fn open_link(
    serial: Option<&str>,
    socket: &Path,
    cancel: &CancelToken,
) -> Result<Box<dyn DeviceLink>> {
    match serial {
        Some(pattern) => {
            let device = resolve_device(pattern);
            let link = SerialLink::open(&device, BAUD_RATE)
                .with_context(|| format!("failed to open serial device {device}"))?;
            Ok(Box::new(link))
        }
        None => open_bus(socket, cancel),
    }
}

#[cfg(unix)]
fn open_bus(socket: &Path, cancel: &CancelToken) -> Result<Box<dyn DeviceLink>> {
    let link = bulby::bus::BusLink::connect(socket, cancel)
        .context("daemon not reachable (start `bulby daemon` or pass --serial)")?;
    Ok(Box::new(link))
}

#[cfg(not(unix))]
fn open_bus(_socket: &Path, _cancel: &CancelToken) -> Result<Box<dyn DeviceLink>> {
    anyhow::bail!("the bus is only available on unix, pass --serial")
}

#[cfg(unix)]
fn run_daemon(device: &str, socket: &Path) -> Result<()> {
    use bulby::bus::{BusListener, BusService};

    let cancel = install_handler().context("failed to install signal handler")?;
    let device = resolve_device(device);
    let link = SerialLink::open(&device, BAUD_RATE)
        .with_context(|| format!("failed to open serial device {device}"))?;
    let listener = BusListener::bind(socket)
        .with_context(|| format!("failed to bind bus socket {}", socket.display()))?;

    let mut service = BusService::new(Sequencer::new(
        link,
        ThreadPacer::new(cancel.clone()),
        cancel,
    ));
    let served = service.serve(&listener);
    let shutdown = service.shutdown();
    drop(listener);

    served.context("bus service failed")?;
    shutdown.context("failed to reset device on shutdown")?;
    tracing::info!("daemon stopped");
    Ok(())
}

#[cfg(not(unix))]
fn run_daemon(_device: &str, _socket: &Path) -> Result<()> {
    anyhow::bail!("the daemon is only available on unix")
}
