// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! miditake - unattended MIDI capture.
//!
//! Listens on one MIDI input, tracks tempo from incoming clock, and writes
//! every burst of playing delimited by silence to its own Standard MIDI File.

pub mod capture;
pub mod config;
pub mod midi;
pub mod recording;
pub mod session;
pub mod timing;
