// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Tempo estimation from incoming MIDI clock.
//!
//! Two stages: a rolling window of the last 24 inter-pulse intervals, guarded
//! by a median filter, produces a candidate BPM per pulse; a small hysteresis
//! buffer of candidates then decides when the published tempo moves. Nothing
//! is published until both stages have filled.

use std::collections::VecDeque;

use tracing::{debug, info, trace};

/// Pulses Per Quarter Note sent by MIDI clock sources
pub const PPQ_DEVICE: usize = 24;

/// Pulses closer together than this are treated as spurious duplicates
pub const MIN_PULSE_INTERVAL_US: f64 = 1000.0;

/// Default allowed deviation from the window median, as a fraction of it
pub const DEFAULT_JITTER_WEIGHT: f64 = 0.25;

const MICROS_PER_MINUTE: f64 = 60_000_000.0;
const MIN_SMOOTHING_SAMPLES: usize = 2;
const MAX_SMOOTHING_SAMPLES: usize = 15;
const SMOOTHING_BPM_PER_SAMPLE: f64 = 50.0;
const HYSTERESIS_DIVISOR: f64 = 180.0;
const MIN_TEMPO_CHANGE_BPM: f64 = 0.35;
/// Slowest tempo worth committing; much slower overflows the tempo meta event
const MIN_TEMPO_BPM: f64 = 4.0;

/// Median of a set of values; `None` when empty.
pub fn median<I: IntoIterator<Item = f64>>(values: I) -> Option<f64> {
    let mut sorted: Vec<f64> = values.into_iter().collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);
    let mid = (sorted.len() - 1) / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid] + sorted[mid + 1]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

fn mean<'a, I: IntoIterator<Item = &'a f64>>(values: I) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Round to the nearest half BPM
pub fn round_to_half(bpm: f64) -> f64 {
    (bpm * 2.0).round() / 2.0
}

/// BPM for a given interval between clock pulses
pub fn bpm_from_pulse_interval(interval_us: f64) -> f64 {
    MICROS_PER_MINUTE / PPQ_DEVICE as f64 / interval_us
}

/// Interval between clock pulses at a given BPM
pub fn pulse_interval_us(bpm: f64) -> f64 {
    MICROS_PER_MINUTE / PPQ_DEVICE as f64 / bpm
}

/// Online BPM estimator fed by MIDI clock pulses.
///
/// Never fails: implausible pulses are dropped silently.
#[derive(Debug, Clone)]
pub struct ClockTempoEstimator {
    /// Recent inter-pulse intervals in microseconds
    window: VecDeque<f64>,
    /// Candidate BPM values awaiting commit
    smoothing: VecDeque<f64>,
    /// Time accumulated since the last accepted pulse
    since_last_pulse_us: i64,
    /// Whether a pulse has been seen since the last reset
    has_reference: bool,
    current_bpm: f64,
    jitter_weight: f64,
}

impl ClockTempoEstimator {
    /// Create an estimator reporting `initial_bpm` until clock says otherwise
    pub fn new(initial_bpm: f64, jitter_weight: f64) -> Self {
        Self {
            window: VecDeque::with_capacity(PPQ_DEVICE + 1),
            smoothing: VecDeque::with_capacity(MAX_SMOOTHING_SAMPLES + 1),
            since_last_pulse_us: 0,
            has_reference: false,
            current_bpm: initial_bpm,
            jitter_weight,
        }
    }

    /// Current tempo estimate in BPM
    pub fn tempo(&self) -> f64 {
        self.current_bpm
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    pub fn smoothing_len(&self) -> usize {
        self.smoothing.len()
    }

    /// Forget all in-flight samples. The committed tempo is kept.
    pub fn reset(&mut self) {
        self.window.clear();
        self.smoothing.clear();
        self.since_last_pulse_us = 0;
        self.has_reference = false;
        trace!("tempo estimator reset");
    }

    /// Account for time carried by a non-clock message.
    pub fn advance(&mut self, delta_us: i64) {
        self.since_last_pulse_us = self.since_last_pulse_us.saturating_add(delta_us.max(0));
    }

    /// Feed one clock pulse. Returns the new tempo when it changes.
    pub fn pulse(&mut self, delta_us: i64) -> Option<f64> {
        let elapsed = self.since_last_pulse_us.saturating_add(delta_us.max(0));

        if !self.has_reference {
            self.has_reference = true;
            self.since_last_pulse_us = 0;
            return None;
        }

        let interval = elapsed as f64;
        if interval < MIN_PULSE_INTERVAL_US {
            // Keep the time so the next real pulse measures the full interval
            self.since_last_pulse_us = elapsed;
            return None;
        }
        self.since_last_pulse_us = 0;

        if self.window.len() == PPQ_DEVICE {
            if let Some(median) = median(self.window.iter().copied()) {
                if (interval - median).abs() > median * self.jitter_weight {
                    debug!(
                        "clock interval {:.0}us deviates from median {:.0}us, restarting window",
                        interval, median
                    );
                    self.window.clear();
                    return None;
                }
            }
        }

        self.window.push_back(interval);
        if self.window.len() > PPQ_DEVICE {
            self.window.pop_front();
        }
        if self.window.len() < PPQ_DEVICE {
            return None;
        }

        let midpoints: Vec<f64> = self
            .window
            .iter()
            .zip(self.window.iter().skip(1))
            .map(|(a, b)| (a + b) / 2.0)
            .collect();
        let avg_interval = mean(&midpoints)?;
        self.smooth(bpm_from_pulse_interval(avg_interval))
    }

    fn smooth(&mut self, candidate: f64) -> Option<f64> {
        if let Some(avg) = mean(&self.smoothing) {
            if (candidate - avg).abs() > avg / HYSTERESIS_DIVISOR {
                trace!("tempo candidate {:.2} left hysteresis band around {:.2}", candidate, avg);
                self.smoothing.clear();
            }
        }
        self.smoothing.push_back(candidate);

        let avg = mean(&self.smoothing)?;
        let target = ((avg / SMOOTHING_BPM_PER_SAMPLE) as usize)
            .clamp(MIN_SMOOTHING_SAMPLES, MAX_SMOOTHING_SAMPLES);
        while self.smoothing.len() > target {
            self.smoothing.pop_front();
        }
        if self.smoothing.len() < target {
            return None;
        }

        let avg = mean(&self.smoothing)?;
        if (avg - self.current_bpm).abs() >= MIN_TEMPO_CHANGE_BPM && avg >= MIN_TEMPO_BPM {
            let rounded = round_to_half(avg);
            if rounded != self.current_bpm {
                info!("Tempo {:.1} -> {:.1} BPM", self.current_bpm, rounded);
                self.current_bpm = rounded;
                return Some(rounded);
            }
        }
        None
    }
}

impl Default for ClockTempoEstimator {
    fn default() -> Self {
        Self::new(120.0, DEFAULT_JITTER_WEIGHT)
    }
}
