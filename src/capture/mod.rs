// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Captured MIDI events and the take buffer.

pub mod log;

pub use log::EventLog;

use chrono::{DateTime, Local};

use crate::midi::MidiMessage;

/// Kind of a captured event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    NoteOn,
    NoteOff,
    /// Any other channel message (CC, pitch bend, ...). Stored, never written.
    Other,
}

/// One channel message captured during a take.
///
/// `time` is the microseconds elapsed since the previous captured event of
/// the same take, not an absolute timestamp. Two events with identical
/// fields are still distinct: `sequence_id` is their identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapturedEvent {
    pub sequence_id: u64,
    pub time: i64,
    pub kind: EventKind,
    pub note: u8,
    pub velocity: u8,
    pub channel: u8,
}

impl CapturedEvent {
    pub fn note_on(sequence_id: u64, time: i64, channel: u8, note: u8, velocity: u8) -> Self {
        Self {
            sequence_id,
            time,
            kind: EventKind::NoteOn,
            note: note & 0x7F,
            velocity: velocity & 0x7F,
            channel: channel & 0x0F,
        }
    }

    pub fn note_off(sequence_id: u64, time: i64, channel: u8, note: u8) -> Self {
        Self {
            sequence_id,
            time,
            kind: EventKind::NoteOff,
            note: note & 0x7F,
            velocity: 0,
            channel: channel & 0x0F,
        }
    }

    /// Build an event from a parsed message. Returns `None` for clock and
    /// other system messages.
    ///
    /// Events that are not notes keep their data bytes in `note` and
    /// `velocity`, so logs show e.g. which controller moved.
    pub fn from_message(sequence_id: u64, time: i64, message: &MidiMessage) -> Option<Self> {
        if message.is_system_message() {
            return None;
        }
        let event = match *message {
            MidiMessage::NoteOn {
                channel,
                note,
                velocity,
            } => Self::note_on(sequence_id, time, channel, note, velocity),
            MidiMessage::NoteOff {
                channel,
                note,
                velocity,
            } => Self {
                velocity: velocity & 0x7F,
                ..Self::note_off(sequence_id, time, channel, note)
            },
            _ => {
                let [data1, data2] = message.data_bytes().unwrap_or_default();
                Self {
                    sequence_id,
                    time,
                    kind: EventKind::Other,
                    note: data1,
                    velocity: data2,
                    channel: message.channel().unwrap_or(0),
                }
            }
        };
        Some(event)
    }

    pub fn is_note_on(&self) -> bool {
        self.kind == EventKind::NoteOn
    }

    pub fn is_note_off(&self) -> bool {
        self.kind == EventKind::NoteOff
    }
}

/// A finished take, handed from the session to the serializer.
#[derive(Debug, Clone)]
pub struct Take {
    /// Events in arrival order
    pub events: Vec<CapturedEvent>,
    /// Tempo estimate at flush time, used for the whole file
    pub bpm: f64,
    /// When the idle timeout closed the take
    pub ended_at: DateTime<Local>,
}

impl Take {
    pub fn new(events: Vec<CapturedEvent>, bpm: f64, ended_at: DateTime<Local>) -> Self {
        Self {
            events,
            bpm,
            ended_at,
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_message_note_events() {
        let on = CapturedEvent::from_message(
            1,
            0,
            &MidiMessage::NoteOn {
                channel: 2,
                note: 60,
                velocity: 100,
            },
        )
        .unwrap();
        assert_eq!(on.kind, EventKind::NoteOn);
        assert_eq!((on.channel, on.note, on.velocity), (2, 60, 100));

        let off = CapturedEvent::from_message(
            2,
            480,
            &MidiMessage::NoteOff {
                channel: 2,
                note: 60,
                velocity: 64,
            },
        )
        .unwrap();
        assert_eq!(off.kind, EventKind::NoteOff);
        assert_eq!(off.time, 480);
        assert_eq!(off.velocity, 64);
    }

    #[test]
    fn test_from_message_clock_is_not_captured() {
        assert!(CapturedEvent::from_message(1, 0, &MidiMessage::TimingClock).is_none());
        assert!(CapturedEvent::from_message(1, 0, &MidiMessage::Start).is_none());
    }

    #[test]
    fn test_from_message_system_common_is_not_captured() {
        let quarter_frame = MidiMessage::parse(&[0xF1, 0x10]).unwrap();
        assert!(CapturedEvent::from_message(1, 0, &quarter_frame).is_none());
        let song_position = MidiMessage::parse(&[0xF2, 0x00, 0x08]).unwrap();
        assert!(CapturedEvent::from_message(2, 0, &song_position).is_none());
    }

    #[test]
    fn test_from_message_other() {
        let cc = CapturedEvent::from_message(
            7,
            10,
            &MidiMessage::ControlChange {
                channel: 4,
                controller: 64,
                value: 127,
            },
        )
        .unwrap();
        assert_eq!(cc.kind, EventKind::Other);
        assert_eq!(cc.channel, 4);
        assert_eq!((cc.note, cc.velocity), (64, 127));

        let bend = CapturedEvent::from_message(8, 0, &MidiMessage::PitchBend {
            channel: 1,
            value: 0,
        })
        .unwrap();
        assert_eq!(bend.kind, EventKind::Other);
        assert_eq!((bend.channel, bend.note, bend.velocity), (1, 0x00, 0x40));
    }

    #[test]
    fn test_identical_events_differ_by_sequence_id() {
        let a = CapturedEvent::note_off(1, 100, 0, 60);
        let b = CapturedEvent::note_off(2, 100, 0, 60);
        assert_ne!(a, b);
        assert_eq!((a.time, a.note, a.channel), (b.time, b.note, b.channel));
    }
}
