// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! MIDI device client built on midir.
//!
//! midir delivers messages on its own callback thread with absolute
//! microsecond timestamps. The client turns those into per-message deltas
//! and forwards every parsed message into the session channel.

use midir::{Ignore, MidiInputConnection};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use super::{DeviceError, IncomingMessage, MidiMessage};

const CLIENT_NAME: &str = "miditake";

/// Converts absolute device timestamps into deltas since the previous message.
#[derive(Debug, Clone, Default)]
pub struct DeltaClock {
    last_stamp: Option<u64>,
}

impl DeltaClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delta in microseconds; the first message after (re)opening has delta 0.
    pub fn delta(&mut self, stamp: u64) -> i64 {
        let delta = match self.last_stamp {
            Some(last) => stamp.saturating_sub(last) as i64,
            None => 0,
        };
        self.last_stamp = Some(stamp);
        delta
    }
}

fn backend() -> Result<midir::MidiInput, DeviceError> {
    let mut midi_in = midir::MidiInput::new(CLIENT_NAME)
        .map_err(|e| DeviceError::BackendUnavailable(e.to_string()))?;
    // Keep timing clock: the tempo estimator depends on it
    midi_in.ignore(Ignore::SysexAndActiveSense);
    Ok(midi_in)
}

/// MIDI input connected to a single device port
pub struct MidiInput {
    connection: Option<MidiInputConnection<DeltaClock>>,
    port_name: String,
}

impl MidiInput {
    /// Open the input at `port` and forward every message into `sender`.
    pub fn open(port: usize, sender: UnboundedSender<IncomingMessage>) -> Result<Self, DeviceError> {
        let midi_in = backend()?;
        let ports = midi_in.ports();
        let input_port = ports.get(port).ok_or(DeviceError::PortNotFound {
            port,
            available: ports.len(),
        })?;
        let port_name = midi_in
            .port_name(input_port)
            .unwrap_or_else(|_| format!("Unknown {}", port));

        let connection = midi_in
            .connect(
                input_port,
                "miditake-input",
                move |stamp, data, clock: &mut DeltaClock| {
                    let delta_us = clock.delta(stamp);
                    match MidiMessage::parse(data) {
                        Some(message) => {
                            if sender.send(IncomingMessage::new(delta_us, message)).is_err() {
                                debug!("session closed, dropping MIDI message");
                            }
                        }
                        None => warn!("ignoring empty MIDI packet"),
                    }
                },
                DeltaClock::new(),
            )
            .map_err(|e| DeviceError::Connect(e.to_string()))?;

        info!("Connected to MIDI input {}: {}", port, port_name);
        Ok(Self {
            connection: Some(connection),
            port_name,
        })
    }

    /// Display name of the connected port
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Whether the connection is still open
    pub fn is_open(&self) -> bool {
        self.connection.is_some()
    }

    /// Close the connection; further messages are no longer delivered.
    pub fn close(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close();
            info!("Closed MIDI input: {}", self.port_name);
        }
    }
}

impl Drop for MidiInput {
    fn drop(&mut self) {
        self.close();
    }
}

/// List all available MIDI input ports
pub fn list_ports() -> Result<Vec<(usize, String)>, DeviceError> {
    let midi_in = backend()?;
    let result = midi_in
        .ports()
        .iter()
        .enumerate()
        .map(|(i, port)| {
            let name = midi_in
                .port_name(port)
                .unwrap_or_else(|_| format!("Unknown {}", i));
            (i, name)
        })
        .collect();
    Ok(result)
}

/// Print all available MIDI input ports to stdout
pub fn print_ports() -> Result<(), DeviceError> {
    let ports = list_ports()?;
    if ports.is_empty() {
        println!("No MIDI inputs found.");
    } else {
        println!("Available MIDI inputs:");
        for (i, name) in ports {
            println!("  {}: {}", i, name);
        }
    }
    Ok(())
}
