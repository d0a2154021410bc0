// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use miditake::config::{Overrides, Settings};
use miditake::midi::{print_ports, IncomingMessage, MidiInput};
use miditake::recording::FileTakeSink;
use miditake::session::{Session, SessionController};
use miditake::timing::ClockTempoEstimator;

/// Unattended MIDI capture: every burst of playing becomes a .mid file
#[derive(Parser, Debug)]
#[command(name = "miditake", version, about)]
struct Cli {
    /// MIDI input port to connect to (prompted when omitted)
    #[arg(short, long)]
    port: Option<usize>,

    /// Seconds of silence that end a take
    #[arg(short, long = "idle-timeout", value_name = "SECONDS")]
    idle_timeout: Option<u64>,

    /// Write every note on this channel (0-15)
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(0..16))]
    channel: Option<u8>,

    /// Treat input as drums: fixed-length hits on channel 10
    #[arg(short, long)]
    drum_mode: bool,

    /// Directory for take files
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Allowed clock jitter as a fraction of the median pulse interval
    #[arg(long = "jitter-weight")]
    jitter_weight: Option<f64>,

    /// Tempo to use until MIDI clock is received
    #[arg(long)]
    tempo: Option<f64>,

    /// YAML or TOML configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// List MIDI input ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            device_port: self.port,
            idle_timeout_seconds: self.idle_timeout,
            channel: self.channel,
            drum_mode: self.drum_mode.then_some(true),
            output_path: self.output.clone(),
            clock_jitter_weight: self.jitter_weight,
            default_tempo: self.tempo,
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .init();
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    settings.apply(cli.overrides());
    settings.validate().context("Invalid configuration")?;
    Ok(settings)
}

/// Ask for a port number on stdin until one parses
fn prompt_port() -> Result<usize> {
    let stdin = io::stdin();
    loop {
        print_ports()?;
        print!("Select MIDI input port: ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            bail!("No MIDI input port selected");
        }
        match line.trim().parse::<usize>() {
            Ok(port) => return Ok(port),
            Err(_) => warn!("Invalid port number: {:?}", line.trim()),
        }
    }
}

/// Connect to the configured port, falling back to prompting.
///
/// Connection failures are retried; an unavailable backend is fatal.
fn connect(
    configured: Option<usize>,
    sender: UnboundedSender<IncomingMessage>,
) -> Result<MidiInput> {
    let mut next = configured;
    loop {
        let port = match next.take() {
            Some(port) => port,
            None => prompt_port()?,
        };
        match MidiInput::open(port, sender.clone()) {
            Ok(input) => return Ok(input),
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => warn!("{}", e),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if cli.list_ports {
        print_ports()?;
        return Ok(());
    }

    let settings = load_settings(&cli)?;

    let mut controller = SessionController::new(ClockTempoEstimator::new(
        settings.default_tempo,
        settings.clock_jitter_weight,
    ));
    let (sender, receiver) = mpsc::unbounded_channel();

    controller.begin_connect();
    let mut input = connect(settings.device_port, sender)?;
    controller.connected();

    let sink = Arc::new(FileTakeSink::new(
        settings.output_path.clone(),
        settings.serialise_settings(),
    ));
    info!(
        "Capturing from {} into {:?}",
        input.port_name(),
        sink.output_dir()
    );

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let session = Session::new(controller, sink, settings.idle_timeout());
    let summary = runtime.block_on(session.run(receiver, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    }));

    input.close();
    info!(
        "Captured {} events, wrote {} takes ({} failed)",
        summary.events_captured, summary.takes_written, summary.takes_failed
    );
    Ok(())
}
