// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Conversion between captured microseconds and written file ticks.

/// Ticks per quarter note in written files
pub const PPQ_SERIALISED: u16 = 96;

/// Largest value the three data bytes of a tempo meta event can hold
pub const MAX_MICROS_PER_QUARTER: u32 = 0xFF_FFFF;

const MICROS_PER_MINUTE: f64 = 60_000_000.0;

/// Microsecond to tick conversion for one tempo.
///
/// Built per flush from the take's BPM; never shared between takes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickScale {
    bpm: f64,
    micros_per_tick: i64,
}

impl TickScale {
    /// Returns `None` for tempos that cannot be represented: non-finite,
    /// so fast that a tick would be shorter than a microsecond, or so slow
    /// that a quarter note overflows the tempo meta event (below ~3.58 BPM).
    pub fn new(bpm: f64) -> Option<Self> {
        if !bpm.is_finite() || bpm <= 0.0 {
            return None;
        }
        if (MICROS_PER_MINUTE / bpm).round() > MAX_MICROS_PER_QUARTER as f64 {
            return None;
        }
        let micros_per_tick = (MICROS_PER_MINUTE / bpm / PPQ_SERIALISED as f64).round() as i64;
        (micros_per_tick > 0).then_some(Self {
            bpm,
            micros_per_tick,
        })
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn micros_per_tick(&self) -> i64 {
        self.micros_per_tick
    }

    /// Microseconds per quarter note, as written in the tempo meta event
    pub fn micros_per_quarter(&self) -> u32 {
        (MICROS_PER_MINUTE / self.bpm).round() as u32
    }

    /// Nearest whole tick for a duration; negative durations count as zero
    pub fn to_ticks(&self, micros: i64) -> u64 {
        let micros = micros.max(0);
        ((micros + self.micros_per_tick / 2) / self.micros_per_tick) as u64
    }

    /// Duration of a whole number of ticks
    pub fn to_micros(&self, ticks: u64) -> i64 {
        ticks as i64 * self.micros_per_tick
    }
}
