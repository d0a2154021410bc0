// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Cursor-based track writer.
//!
//! Notes are written at the cursor with a sounding length; the cursor only
//! moves on an explicit advance. Note-offs are scheduled from the length, so
//! overlapping notes need no bookkeeping here.

use super::export::MidiExportEvent;

/// One step written by the take serializer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOp {
    /// A note starting at the cursor, sounding for `length` ticks
    Note {
        channel: u8,
        note: u8,
        velocity: u8,
        length: u64,
    },
    /// Move the cursor forward
    Advance(u64),
}

#[derive(Debug, Clone, Default)]
pub struct TrackWriter {
    cursor: u64,
    ops: Vec<TrackOp>,
    events: Vec<MidiExportEvent>,
}

impl TrackWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current position in ticks
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn write_note(&mut self, channel: u8, note: u8, velocity: u8, length: u64) {
        self.ops.push(TrackOp::Note {
            channel,
            note,
            velocity,
            length,
        });
        self.events
            .push(MidiExportEvent::note_on(self.cursor, channel, note, velocity));
        self.events
            .push(MidiExportEvent::note_off(self.cursor + length, channel, note));
    }

    /// Advance the cursor. Zero-length advances are not recorded.
    pub fn advance(&mut self, ticks: u64) {
        if ticks == 0 {
            return;
        }
        self.ops.push(TrackOp::Advance(ticks));
        self.cursor += ticks;
    }

    /// Everything written so far, in write order
    pub fn ops(&self) -> &[TrackOp] {
        &self.ops
    }

    /// Events sorted by tick.
    ///
    /// The sort is stable, so at equal ticks a note-off scheduled by an
    /// earlier note stays ahead of a later note-on.
    pub fn events(&self) -> Vec<MidiExportEvent> {
        let mut events = self.events.clone();
        events.sort_by_key(|e| e.tick);
        events
    }

    /// Tick of the last note-off or cursor position, whichever is later
    pub fn end_tick(&self) -> u64 {
        self.events
            .iter()
            .map(|e| e.tick)
            .max()
            .unwrap_or(0)
            .max(self.cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlapping_notes_are_scheduled() {
        let mut track = TrackWriter::new();
        track.write_note(0, 60, 100, 96);
        track.advance(48);
        track.write_note(0, 64, 90, 96);
        track.advance(48);

        let ticks: Vec<(u64, bool)> = track
            .events()
            .iter()
            .map(|e| (e.tick, e.is_note_on()))
            .collect();
        assert_eq!(ticks, vec![(0, true), (48, true), (96, false), (144, false)]);
        assert_eq!(track.cursor(), 96);
        assert_eq!(track.end_tick(), 144);
    }

    #[test]
    fn test_repeated_note_releases_before_retrigger() {
        let mut track = TrackWriter::new();
        track.write_note(0, 60, 100, 24);
        track.advance(24);
        track.write_note(0, 60, 100, 24);

        let events = track.events();
        assert!(events[1].is_note_off() && events[1].tick == 24);
        assert!(events[2].is_note_on() && events[2].tick == 24);
    }

    #[test]
    fn test_zero_advance_is_dropped() {
        let mut track = TrackWriter::new();
        track.advance(0);
        assert!(track.ops().is_empty());
        track.advance(5);
        assert_eq!(track.ops(), &[TrackOp::Advance(5)]);
    }
}
