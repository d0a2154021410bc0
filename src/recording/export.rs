// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Standard MIDI file encoding.
//!
//! Takes are written as Type 1 files with two tracks: a metadata track
//! (time signature, tempo, name) and the collected events track.

use std::io::{self, Write};

/// MIDI file format type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiFileFormat {
    /// Type 0: Single track with all channels
    Type0,
    /// Type 1: Multiple simultaneous tracks
    Type1,
}

impl MidiFileFormat {
    fn code(self) -> u16 {
        match self {
            MidiFileFormat::Type0 => 0,
            MidiFileFormat::Type1 => 1,
        }
    }
}

/// A track event at an absolute tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiExportEvent {
    /// Absolute tick
    pub tick: u64,
    /// Event data
    pub data: Vec<u8>,
}

impl MidiExportEvent {
    pub fn note_on(tick: u64, channel: u8, note: u8, velocity: u8) -> Self {
        Self {
            tick,
            data: vec![0x90 | (channel & 0x0F), note & 0x7F, velocity & 0x7F],
        }
    }

    pub fn note_off(tick: u64, channel: u8, note: u8) -> Self {
        Self {
            tick,
            data: vec![0x80 | (channel & 0x0F), note & 0x7F, 0],
        }
    }

    pub fn tempo(tick: u64, micros_per_quarter: u32) -> Self {
        Self {
            tick,
            data: vec![
                0xFF,
                0x51,
                0x03,
                ((micros_per_quarter >> 16) & 0xFF) as u8,
                ((micros_per_quarter >> 8) & 0xFF) as u8,
                (micros_per_quarter & 0xFF) as u8,
            ],
        }
    }

    pub fn time_signature(tick: u64, numerator: u8, denominator: u8) -> Self {
        // Denominator is expressed as power of 2
        let denom_power = denominator.max(1).trailing_zeros() as u8;
        Self {
            tick,
            data: vec![
                0xFF, 0x58, 0x04,
                numerator,
                denom_power,
                24, // MIDI clocks per metronome click
                8,  // 32nd notes per MIDI quarter note
            ],
        }
    }

    pub fn track_name(tick: u64, name: &str) -> Self {
        let bytes = name.as_bytes();
        let mut data = vec![0xFF, 0x03];
        write_variable_length(&mut data, bytes.len() as u32);
        data.extend_from_slice(bytes);
        Self { tick, data }
    }

    fn end_of_track(tick: u64) -> Self {
        Self {
            tick,
            data: vec![0xFF, 0x2F, 0x00],
        }
    }

    pub fn is_note_on(&self) -> bool {
        self.data.first().is_some_and(|status| status & 0xF0 == 0x90)
    }

    pub fn is_note_off(&self) -> bool {
        self.data.first().is_some_and(|status| status & 0xF0 == 0x80)
    }
}

/// A complete file ready to be written
#[derive(Debug, Clone)]
pub struct MidiFile {
    format: MidiFileFormat,
    ppqn: u16,
    tracks: Vec<Vec<MidiExportEvent>>,
    /// Minimum end-of-track tick per track
    track_ends: Vec<u64>,
}

impl MidiFile {
    pub fn new(format: MidiFileFormat, ppqn: u16) -> Self {
        Self {
            format,
            ppqn: ppqn.max(1),
            tracks: Vec::new(),
            track_ends: Vec::new(),
        }
    }

    /// Add a track. Events must already be in tick order.
    pub fn add_track(&mut self, events: Vec<MidiExportEvent>) {
        self.add_track_ending_at(events, 0);
    }

    /// Add a track whose end-of-track is no earlier than `end_tick`, so
    /// trailing silence survives.
    pub fn add_track_ending_at(&mut self, events: Vec<MidiExportEvent>, end_tick: u64) {
        self.tracks.push(events);
        self.track_ends.push(end_tick);
    }

    pub fn format(&self) -> MidiFileFormat {
        self.format
    }

    pub fn ppqn(&self) -> u16 {
        self.ppqn
    }

    pub fn tracks(&self) -> &[Vec<MidiExportEvent>] {
        &self.tracks
    }

    /// Write MIDI data to writer
    pub fn write<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.write_header(writer)?;
        for (events, &end_tick) in self.tracks.iter().zip(&self.track_ends) {
            write_track(writer, events, end_tick)?;
        }
        Ok(())
    }

    /// Encode to bytes
    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.write(&mut buffer)?;
        Ok(buffer)
    }

    /// Write MIDI file header chunk
    fn write_header<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        // MThd
        writer.write_all(b"MThd")?;
        // Chunk length (always 6)
        writer.write_all(&[0, 0, 0, 6])?;
        writer.write_all(&self.format.code().to_be_bytes())?;
        writer.write_all(&(self.tracks.len() as u16).to_be_bytes())?;
        writer.write_all(&self.ppqn.to_be_bytes())?;
        Ok(())
    }
}

/// Write a track chunk
fn write_track<W: Write>(
    writer: &mut W,
    events: &[MidiExportEvent],
    end_tick: u64,
) -> io::Result<()> {
    let mut track_data = Vec::new();
    let mut last_tick = 0u64;

    for event in events {
        let delta = event.tick.saturating_sub(last_tick);
        write_variable_length(&mut track_data, delta.min(0x0FFF_FFFF) as u32);
        track_data.extend_from_slice(&event.data);
        last_tick = last_tick.max(event.tick);
    }

    // End of track
    let end_event = MidiExportEvent::end_of_track(last_tick.max(end_tick));
    let delta = end_event.tick - last_tick;
    write_variable_length(&mut track_data, delta.min(0x0FFF_FFFF) as u32);
    track_data.extend_from_slice(&end_event.data);

    writer.write_all(b"MTrk")?;
    writer.write_all(&(track_data.len() as u32).to_be_bytes())?;
    writer.write_all(&track_data)?;

    Ok(())
}

/// Append a variable-length quantity
fn write_variable_length(buffer: &mut Vec<u8>, mut value: u32) {
    let mut bytes = Vec::with_capacity(4);

    bytes.push((value & 0x7F) as u8);
    value >>= 7;

    while value > 0 {
        bytes.push((value & 0x7F) as u8 | 0x80);
        value >>= 7;
    }

    bytes.reverse();
    buffer.extend_from_slice(&bytes);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_length() {
        let mut buffer = Vec::new();

        write_variable_length(&mut buffer, 0);
        assert_eq!(buffer, vec![0x00]);

        buffer.clear();
        write_variable_length(&mut buffer, 127);
        assert_eq!(buffer, vec![0x7F]);

        buffer.clear();
        write_variable_length(&mut buffer, 128);
        assert_eq!(buffer, vec![0x81, 0x00]);

        buffer.clear();
        write_variable_length(&mut buffer, 16383);
        assert_eq!(buffer, vec![0xFF, 0x7F]);
    }

    #[test]
    fn test_tempo_event() {
        let event = MidiExportEvent::tempo(0, 500_000);
        assert_eq!(event.data, vec![0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20]);
    }

    #[test]
    fn test_time_signature_event() {
        let event = MidiExportEvent::time_signature(0, 4, 4);
        assert_eq!(event.data, vec![0xFF, 0x58, 0x04, 4, 2, 24, 8]);
    }

    #[test]
    fn test_track_name_event() {
        let event = MidiExportEvent::track_name(0, "Metadata");
        assert_eq!(&event.data[..3], &[0xFF, 0x03, 8]);
        assert_eq!(&event.data[3..], b"Metadata");
    }

    #[test]
    fn test_header_and_track_chunks() {
        let mut file = MidiFile::new(MidiFileFormat::Type1, 96);
        file.add_track(vec![MidiExportEvent::track_name(0, "A")]);
        file.add_track(vec![
            MidiExportEvent::note_on(0, 0, 60, 100),
            MidiExportEvent::note_off(96, 0, 60),
        ]);

        let bytes = file.to_bytes().unwrap();
        assert_eq!(&bytes[0..4], b"MThd");
        assert_eq!(&bytes[8..10], &1u16.to_be_bytes()); // Format 1
        assert_eq!(&bytes[10..12], &2u16.to_be_bytes()); // 2 tracks
        assert_eq!(&bytes[12..14], &96u16.to_be_bytes()); // PPQN
        assert_eq!(&bytes[14..18], b"MTrk");

        // Second track: 0 on, 96 off (VLQ 0x60), end of track
        let second = &bytes[14 + 8 + 9..];
        assert_eq!(&second[0..4], b"MTrk");
        assert_eq!(
            &second[8..],
            &[0x00, 0x90, 60, 100, 0x60, 0x80, 60, 0, 0x00, 0xFF, 0x2F, 0x00]
        );
    }

    #[test]
    fn test_end_of_track_keeps_trailing_silence() {
        let mut file = MidiFile::new(MidiFileFormat::Type0, 96);
        file.add_track_ending_at(vec![MidiExportEvent::note_on(0, 9, 36, 100)], 384);

        let bytes = file.to_bytes().unwrap();
        // 0 on, then end of track after 384 ticks (VLQ 0x83 0x00)
        assert_eq!(&bytes[22..], &[0x00, 0x99, 36, 100, 0x83, 0x00, 0xFF, 0x2F, 0x00]);
    }

    #[test]
    fn test_to_bytes_matches_written_file() {
        let mut file = MidiFile::new(MidiFileFormat::Type1, 96);
        file.add_track(vec![MidiExportEvent::tempo(0, 500_000)]);
        file.add_track_ending_at(vec![MidiExportEvent::note_on(0, 0, 60, 90)], 96);

        let mut written = tempfile::tempfile().unwrap();
        file.write(&mut written).unwrap();
        let mut on_disk = Vec::new();
        io::Seek::rewind(&mut written).unwrap();
        io::Read::read_to_end(&mut written, &mut on_disk).unwrap();

        assert_eq!(file.to_bytes().unwrap(), on_disk);
    }

    #[test]
    fn test_note_classification() {
        assert!(MidiExportEvent::note_on(0, 3, 60, 1).is_note_on());
        assert!(MidiExportEvent::note_off(0, 3, 60).is_note_off());
        assert!(!MidiExportEvent::tempo(0, 1).is_note_on());
    }
}
