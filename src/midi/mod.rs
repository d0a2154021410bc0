// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! MIDI input layer.
//!
//! This module parses raw MIDI bytes into typed messages and provides the
//! device client that delivers them, with per-message time deltas, to the
//! capture session.

pub mod input;

use thiserror::Error;

pub use input::{list_ports, print_ports, MidiInput};

/// Errors raised while talking to the MIDI backend.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The native MIDI backend could not be initialised at all.
    #[error("MIDI backend unavailable: {0}")]
    BackendUnavailable(String),
    /// The requested port index does not exist.
    #[error("MIDI input port {port} not found ({available} available)")]
    PortNotFound { port: usize, available: usize },
    /// The port exists but the connection attempt failed.
    #[error("failed to connect to MIDI input: {0}")]
    Connect(String),
}

impl DeviceError {
    /// Whether retrying (with another port) cannot help.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DeviceError::BackendUnavailable(_))
    }
}

/// MIDI message constants
pub mod messages {
    // Channel Voice Messages (upper nibble, lower nibble is channel 0-15)
    pub const NOTE_OFF: u8 = 0x80;
    pub const NOTE_ON: u8 = 0x90;
    pub const POLY_AFTERTOUCH: u8 = 0xA0;
    pub const CONTROL_CHANGE: u8 = 0xB0;
    pub const PROGRAM_CHANGE: u8 = 0xC0;
    pub const CHANNEL_AFTERTOUCH: u8 = 0xD0;
    pub const PITCH_BEND: u8 = 0xE0;

    // System Real-Time Messages
    pub const TIMING_CLOCK: u8 = 0xF8;
    pub const START: u8 = 0xFA;
    pub const CONTINUE: u8 = 0xFB;
    pub const STOP: u8 = 0xFC;
}

/// Parsed MIDI message types
#[derive(Debug, Clone, PartialEq)]
pub enum MidiMessage {
    /// Note On: channel (0-15), note (0-127), velocity (0-127).
    ///
    /// Velocity 0 is kept as a Note On here; drum pads use it as an implicit
    /// release and the take serializer needs to see it.
    NoteOn { channel: u8, note: u8, velocity: u8 },
    /// Note Off: channel (0-15), note (0-127), velocity (0-127)
    NoteOff { channel: u8, note: u8, velocity: u8 },
    /// Control Change: channel (0-15), controller (0-127), value (0-127)
    ControlChange { channel: u8, controller: u8, value: u8 },
    /// Program Change: channel (0-15), program (0-127)
    ProgramChange { channel: u8, program: u8 },
    /// Pitch Bend: channel (0-15), value (-8192 to 8191)
    PitchBend { channel: u8, value: i16 },
    /// Channel Aftertouch: channel (0-15), pressure (0-127)
    ChannelAftertouch { channel: u8, pressure: u8 },
    /// Poly Aftertouch: channel (0-15), note (0-127), pressure (0-127)
    PolyAftertouch { channel: u8, note: u8, pressure: u8 },
    /// MIDI Clock tick
    TimingClock,
    /// Start playback
    Start,
    /// Continue playback
    Continue,
    /// Stop playback
    Stop,
    /// Any other system message (MTC quarter frame, song position, sysex,
    /// active sensing, ...), by status byte
    System(u8),
    /// Unknown/unparsed message
    Unknown(Vec<u8>),
}

impl MidiMessage {
    /// Parse raw MIDI bytes into a MidiMessage
    pub fn parse(data: &[u8]) -> Option<Self> {
        let (&status, rest) = data.split_first()?;

        // System Real-Time messages (single byte)
        match status {
            messages::TIMING_CLOCK => return Some(MidiMessage::TimingClock),
            messages::START => return Some(MidiMessage::Start),
            messages::CONTINUE => return Some(MidiMessage::Continue),
            messages::STOP => return Some(MidiMessage::Stop),
            0xF0..=0xFF => return Some(MidiMessage::System(status)),
            _ => {}
        }

        let msg_type = status & 0xF0;
        let channel = status & 0x0F;

        match (msg_type, rest) {
            (messages::NOTE_OFF, [note, velocity, ..]) => Some(MidiMessage::NoteOff {
                channel,
                note: note & 0x7F,
                velocity: velocity & 0x7F,
            }),
            (messages::NOTE_ON, [note, velocity, ..]) => Some(MidiMessage::NoteOn {
                channel,
                note: note & 0x7F,
                velocity: velocity & 0x7F,
            }),
            (messages::CONTROL_CHANGE, [controller, value, ..]) => {
                Some(MidiMessage::ControlChange {
                    channel,
                    controller: controller & 0x7F,
                    value: value & 0x7F,
                })
            }
            (messages::PROGRAM_CHANGE, [program, ..]) => Some(MidiMessage::ProgramChange {
                channel,
                program: program & 0x7F,
            }),
            (messages::PITCH_BEND, [lsb, msb, ..]) => {
                let value = (((*msb as i16) << 7) | *lsb as i16) - 8192;
                Some(MidiMessage::PitchBend { channel, value })
            }
            (messages::CHANNEL_AFTERTOUCH, [pressure, ..]) => {
                Some(MidiMessage::ChannelAftertouch {
                    channel,
                    pressure: pressure & 0x7F,
                })
            }
            (messages::POLY_AFTERTOUCH, [note, pressure, ..]) => {
                Some(MidiMessage::PolyAftertouch {
                    channel,
                    note: note & 0x7F,
                    pressure: pressure & 0x7F,
                })
            }
            _ => Some(MidiMessage::Unknown(data.to_vec())),
        }
    }

    /// Check if this is a clock-related message
    pub fn is_clock_message(&self) -> bool {
        matches!(
            self,
            MidiMessage::TimingClock
                | MidiMessage::Start
                | MidiMessage::Continue
                | MidiMessage::Stop
        )
    }

    /// Clock and other system messages; none of these are part of a take
    pub fn is_system_message(&self) -> bool {
        self.is_clock_message() || matches!(self, MidiMessage::System(_))
    }

    /// The two data bytes of a channel voice message, zero filled
    pub fn data_bytes(&self) -> Option<[u8; 2]> {
        let bytes = match *self {
            MidiMessage::NoteOn { note, velocity, .. }
            | MidiMessage::NoteOff { note, velocity, .. } => [note, velocity],
            MidiMessage::ControlChange {
                controller, value, ..
            } => [controller, value],
            MidiMessage::ProgramChange { program, .. } => [program, 0],
            MidiMessage::PitchBend { value, .. } => {
                let raw = (value + 8192).clamp(0, 0x3FFF) as u16;
                [(raw & 0x7F) as u8, (raw >> 7) as u8]
            }
            MidiMessage::ChannelAftertouch { pressure, .. } => [pressure, 0],
            MidiMessage::PolyAftertouch { note, pressure, .. } => [note, pressure],
            _ => return None,
        };
        Some(bytes)
    }

    /// Channel (0-15) of a channel voice message
    pub fn channel(&self) -> Option<u8> {
        match self {
            MidiMessage::NoteOn { channel, .. }
            | MidiMessage::NoteOff { channel, .. }
            | MidiMessage::ControlChange { channel, .. }
            | MidiMessage::ProgramChange { channel, .. }
            | MidiMessage::PitchBend { channel, .. }
            | MidiMessage::ChannelAftertouch { channel, .. }
            | MidiMessage::PolyAftertouch { channel, .. } => Some(*channel),
            _ => None,
        }
    }
}

/// A message as delivered by the device client.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    /// Microseconds since the previous message from the same device.
    pub delta_us: i64,
    pub message: MidiMessage,
}

impl IncomingMessage {
    pub fn new(delta_us: i64, message: MidiMessage) -> Self {
        Self { delta_us, message }
    }
}
