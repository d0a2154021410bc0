// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Take serialization.
//!
//! Converts the arrival-ordered events of a take into a note/advance stream.
//! Events carry the time since their predecessor, so each step of the
//! algorithm moves the cursor to the next event that starts a note; note-offs
//! move it themselves. A note whose note-off is not next in line keeps
//! sounding while later events are written, and its note-off's advance is
//! parked under the note-off's sequence id until that event is reached.
//!
//! Ticks are always derived from the absolute position in the source
//! timeline, so rounding never accumulates across a take.

use std::collections::{HashMap, VecDeque};

use tracing::{debug, warn};

use super::export::{MidiExportEvent, MidiFile, MidiFileFormat};
use super::track::{TrackOp, TrackWriter};
use super::SerialiseError;
use crate::capture::{CapturedEvent, EventKind};
use crate::timing::{TickScale, PPQ_SERIALISED};

/// General MIDI percussion channel (channel 10, zero indexed)
pub const DRUM_CHANNEL: u8 = 9;

/// Sounding length of a drum hit: a sixteenth note
pub const DRUM_NOTE_TICKS: u64 = PPQ_SERIALISED as u64 / 4;

/// Spacing after the last drum hit of a take: a whole note
pub const WHOLE_NOTE_TICKS: u64 = PPQ_SERIALISED as u64 * 4;

/// Shortest written note; anything briefer would be silent
pub const MIN_NOTE_TICKS: u64 = 1;

pub const METADATA_TRACK_NAME: &str = "Metadata";
pub const EVENTS_TRACK_NAME: &str = "CollectedEvents";

/// Output channel rules applied while serializing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SerialiseSettings {
    /// Write every note on this channel (0-15)
    pub channel_override: Option<u8>,
    /// Write every note on the drum channel with drum timing
    pub drum_mode: bool,
}

impl SerialiseSettings {
    pub fn output_channel(&self, event_channel: u8) -> u8 {
        if self.drum_mode {
            DRUM_CHANNEL
        } else {
            self.channel_override.unwrap_or(event_channel) & 0x0F
        }
    }
}

/// Result of serializing one take
#[derive(Debug, Clone)]
pub struct SerialisedTake {
    scale: TickScale,
    track: TrackWriter,
    /// Note-ons that found no note-off in the take
    pub unmatched_note_ons: usize,
    /// Note-offs that no note-on claimed
    pub unmatched_note_offs: usize,
    /// Deferred advances never consumed
    pub leftover_deferred: usize,
}

impl SerialisedTake {
    pub fn ops(&self) -> &[TrackOp] {
        self.track.ops()
    }

    pub fn scale(&self) -> TickScale {
        self.scale
    }

    pub fn notes_written(&self) -> usize {
        self.ops()
            .iter()
            .filter(|op| matches!(op, TrackOp::Note { .. }))
            .count()
    }

    /// Sum of all advances, in ticks
    pub fn total_ticks(&self) -> u64 {
        self.ops()
            .iter()
            .map(|op| match op {
                TrackOp::Advance(ticks) => *ticks,
                TrackOp::Note { .. } => 0,
            })
            .sum()
    }

    /// Build the two-track file: metadata, then the collected events
    pub fn to_midi_file(&self) -> MidiFile {
        let mut file = MidiFile::new(MidiFileFormat::Type1, PPQ_SERIALISED);
        file.add_track(vec![
            MidiExportEvent::time_signature(0, 4, 4),
            MidiExportEvent::tempo(0, self.scale.micros_per_quarter()),
            MidiExportEvent::track_name(0, METADATA_TRACK_NAME),
        ]);

        let mut events = vec![MidiExportEvent::track_name(0, EVENTS_TRACK_NAME)];
        events.extend(self.track.events());
        file.add_track_ending_at(events, self.track.end_tick());
        file
    }
}

/// Serializes takes with fixed channel settings
#[derive(Debug, Clone, Copy, Default)]
pub struct TakeSerialiser {
    settings: SerialiseSettings,
}

impl TakeSerialiser {
    pub fn new(settings: SerialiseSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> SerialiseSettings {
        self.settings
    }

    /// Serialize a take at `bpm`
    pub fn serialise(
        &self,
        events: &[CapturedEvent],
        bpm: f64,
    ) -> Result<SerialisedTake, SerialiseError> {
        let scale = TickScale::new(bpm).ok_or(SerialiseError::InvalidTempo(bpm))?;
        let queue = self.note_queue(events);
        let outstanding = queue
            .iter()
            .filter(|e| e.is_note_off() && !self.is_drum(e))
            .copied()
            .collect();

        let mut state = TakeState {
            settings: self.settings,
            scale,
            queue,
            outstanding,
            deferred: HashMap::new(),
            position_us: 0,
            track: TrackWriter::new(),
            unmatched_note_ons: 0,
            unmatched_note_offs: 0,
        };
        while let Some(event) = state.queue.pop_front() {
            state.process(event);
        }

        let take = SerialisedTake {
            scale,
            unmatched_note_ons: state.unmatched_note_ons,
            unmatched_note_offs: state.unmatched_note_offs,
            leftover_deferred: state.deferred.len(),
            track: state.track,
        };
        if take.leftover_deferred > 0 {
            warn!(
                "{} held notes still deferred after serialization",
                take.leftover_deferred
            );
        }
        if take.unmatched_note_ons > 0 {
            warn!("{} note-ons had no matching note-off", take.unmatched_note_ons);
        }
        if take.unmatched_note_offs > 0 {
            debug!("{} note-offs had no matching note-on", take.unmatched_note_offs);
        }
        Ok(take)
    }

    fn is_drum(&self, event: &CapturedEvent) -> bool {
        self.settings.output_channel(event.channel) == DRUM_CHANNEL
    }

    /// Note events only, with skipped events' time folded into the next note
    /// event. Zero-velocity note-ons become note-offs except on the drum
    /// channel, where the drum rules need to see them.
    fn note_queue(&self, events: &[CapturedEvent]) -> VecDeque<CapturedEvent> {
        let mut queue = VecDeque::with_capacity(events.len());
        let mut carried = 0i64;
        for event in events {
            match event.kind {
                EventKind::Other => {
                    debug!("not writing event #{}", event.sequence_id);
                    carried += event.time.max(0);
                }
                EventKind::NoteOn | EventKind::NoteOff => {
                    let mut event = *event;
                    event.time = event.time.max(0) + carried;
                    carried = 0;
                    if event.is_note_on() && event.velocity == 0 && !self.is_drum(&event) {
                        event.kind = EventKind::NoteOff;
                    }
                    queue.push_back(event);
                }
            }
        }
        queue
    }
}

struct TakeState {
    settings: SerialiseSettings,
    scale: TickScale,
    queue: VecDeque<CapturedEvent>,
    /// Note-offs not yet paired or reached, in arrival order
    outstanding: Vec<CapturedEvent>,
    /// Advance owed by a note-off, keyed by its sequence id
    deferred: HashMap<u64, i64>,
    /// Source time reached by the cursor, from the start of the take
    position_us: i64,
    track: TrackWriter,
    unmatched_note_ons: usize,
    unmatched_note_offs: usize,
}

/// Whether an event starts a sounding note (as opposed to releasing one)
fn starts_note(event: &CapturedEvent) -> bool {
    event.is_note_on() && event.velocity > 0
}

impl TakeState {
    fn process(&mut self, event: CapturedEvent) {
        let channel = self.settings.output_channel(event.channel);
        match event.kind {
            EventKind::NoteOn if channel == DRUM_CHANNEL && event.velocity == 0 => {
                self.process_release(event)
            }
            EventKind::NoteOn if channel == DRUM_CHANNEL => self.process_drum_hit(event),
            EventKind::NoteOn => self.process_note_on(event, channel),
            EventKind::NoteOff => self.process_release(event),
            EventKind::Other => debug!("unhandled event #{}", event.sequence_id),
        }
    }

    fn advance_us(&mut self, micros: i64) {
        self.position_us += micros.max(0);
        let target = self.scale.to_ticks(self.position_us);
        self.track.advance(target.saturating_sub(self.track.cursor()));
    }

    /// Ticks from the cursor to a point `micros` ahead of it
    fn length_to(&self, micros: i64) -> u64 {
        let end = self.scale.to_ticks(self.position_us + micros.max(0));
        end.saturating_sub(self.track.cursor()).max(MIN_NOTE_TICKS)
    }

    /// Time to the next event if it starts a note, else zero
    fn next_note_on_gap(&self) -> i64 {
        match self.queue.front() {
            Some(next) if starts_note(next) => next.time,
            _ => 0,
        }
    }

    fn process_drum_hit(&mut self, event: CapturedEvent) {
        // Pads often send a zero-velocity note-on as the release
        let mut carried = 0;
        if let Some(next) = self.queue.front() {
            if next.is_note_on() && next.velocity == 0 && next.note == event.note {
                carried = next.time;
                self.queue.pop_front();
            }
        }

        let length_us = match self.queue.front() {
            None => self.scale.to_micros(WHOLE_NOTE_TICKS),
            Some(next) if starts_note(next) => carried + next.time,
            Some(_) => carried,
        };

        self.track
            .write_note(DRUM_CHANNEL, event.note, event.velocity, DRUM_NOTE_TICKS);
        self.advance_us(length_us);
    }

    fn process_note_on(&mut self, event: CapturedEvent, channel: u8) {
        // FIFO pairing per note number
        let paired = self
            .outstanding
            .iter()
            .position(|off| off.note == event.note)
            .map(|index| self.outstanding.remove(index));

        let sounding_us = match paired {
            Some(off) => {
                let mut total = 0;
                for queued in &self.queue {
                    total += queued.time;
                    if queued.sequence_id == off.sequence_id {
                        break;
                    }
                }
                total
            }
            None => {
                // Held past the end of the take: sound until the last event
                self.unmatched_note_ons += 1;
                self.queue.iter().map(|e| e.time).sum()
            }
        };

        let length = self.length_to(sounding_us);
        self.track.write_note(channel, event.note, event.velocity, length);

        match paired {
            Some(off) if self.queue.front().map(|e| e.sequence_id) == Some(off.sequence_id) => {
                self.queue.pop_front();
                let gap = self.next_note_on_gap();
                self.advance_us(sounding_us + gap);
            }
            _ => {
                let gap = self.next_note_on_gap();
                self.advance_us(gap);

                if let Some(off) = paired {
                    let between: i64 = self
                        .queue
                        .iter()
                        .take_while(|e| e.sequence_id != off.sequence_id)
                        .map(|e| e.time)
                        .sum();
                    self.deferred.insert(off.sequence_id, sounding_us - between);
                }
            }
        }
    }

    fn process_release(&mut self, event: CapturedEvent) {
        let own = match self.deferred.remove(&event.sequence_id) {
            Some(held) => held,
            None => {
                if let Some(index) = self
                    .outstanding
                    .iter()
                    .position(|off| off.sequence_id == event.sequence_id)
                {
                    self.outstanding.remove(index);
                    self.unmatched_note_offs += 1;
                }
                event.time
            }
        };
        let gap = self.next_note_on_gap();
        self.advance_us(own + gap);
    }
}
