// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Timing module.
//!
//! Tempo estimation from incoming MIDI clock, and the conversion from
//! captured microseconds to written file ticks.

pub mod tempo;
pub mod ticks;

pub use tempo::{ClockTempoEstimator, DEFAULT_JITTER_WEIGHT, PPQ_DEVICE};
pub use ticks::{TickScale, PPQ_SERIALISED};
