// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Ordered buffer of the events captured during the current take.
//!
//! The log is owned by the session loop; both the message path and the
//! idle-timer path reach it through that single owner, so no locking is
//! needed here.

use tracing::debug;

use super::CapturedEvent;

/// Append-only event buffer, drained once per take.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Vec<CapturedEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event at the tail. No reordering, no deduplication.
    pub fn add(&mut self, event: CapturedEvent) {
        debug!(
            "captured #{} {:?} ch{} note {} vel {} +{}us",
            event.sequence_id, event.kind, event.channel, event.note, event.velocity, event.time
        );
        self.events.push(event);
    }

    /// Take every buffered event, leaving the log empty.
    pub fn collect_and_clear(&mut self) -> Vec<CapturedEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
