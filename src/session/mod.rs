// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Capture session.
//!
//! The `SessionController` is the single owner of the event log and the
//! tempo estimator. The async session loop feeds it incoming messages and
//! idle-timer elapses, and hands every finished take to a `TakeSink` on the
//! blocking pool so file output never stalls message intake.

pub mod idle;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, trace};

pub use idle::{IdleTimer, TimerCommand};

use crate::capture::{CapturedEvent, EventLog, Take};
use crate::midi::{IncomingMessage, MidiMessage};
use crate::recording::{SerialiseError, TakeSink};
use crate::timing::ClockTempoEstimator;

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    /// Connected, no take in progress
    Idle,
    /// Capturing a take
    Active,
    /// Handing a take off to the serializer
    Flushing,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Idle => "idle",
            SessionState::Active => "active",
            SessionState::Flushing => "flushing",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Session state machine
#[derive(Debug)]
pub struct SessionController {
    state: SessionState,
    log: EventLog,
    estimator: ClockTempoEstimator,
    next_sequence_id: u64,
    /// Microseconds since the last captured event, including clock deltas
    since_last_event_us: i64,
    events_captured: u64,
}

impl SessionController {
    pub fn new(estimator: ClockTempoEstimator) -> Self {
        Self {
            state: SessionState::Disconnected,
            log: EventLog::new(),
            estimator,
            next_sequence_id: 1,
            since_last_event_us: 0,
            events_captured: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Current tempo estimate
    pub fn tempo(&self) -> f64 {
        self.estimator.tempo()
    }

    pub fn estimator(&self) -> &ClockTempoEstimator {
        &self.estimator
    }

    /// Events buffered for the current take
    pub fn pending_events(&self) -> usize {
        self.log.len()
    }

    /// Events captured since the controller was created
    pub fn events_captured(&self) -> u64 {
        self.events_captured
    }

    pub fn begin_connect(&mut self) {
        self.transition(SessionState::Connecting);
    }

    pub fn connected(&mut self) {
        self.transition(SessionState::Idle);
    }

    pub fn disconnected(&mut self) {
        self.transition(SessionState::Disconnected);
    }

    /// Route one incoming message.
    ///
    /// Returns true when the message was captured and the idle timer must be
    /// (re)armed. Clock messages only update the tempo estimate; other system
    /// messages (MTC, song position, ...) are passed over.
    pub fn handle_message(&mut self, incoming: IncomingMessage) -> bool {
        let IncomingMessage { delta_us, message } = incoming;
        let delta_us = delta_us.max(0);

        if message.is_system_message() {
            self.handle_system(delta_us, &message);
            return false;
        }

        let time = if self.state == SessionState::Active {
            self.estimator.advance(delta_us);
            let time = self.since_last_event_us.saturating_add(delta_us);
            self.since_last_event_us = 0;
            time
        } else {
            // New take: stale clock samples from before the silence are useless
            self.estimator.reset();
            self.since_last_event_us = 0;
            0
        };

        let sequence_id = self.next_sequence_id;
        let Some(event) = CapturedEvent::from_message(sequence_id, time, &message) else {
            return false;
        };
        self.next_sequence_id += 1;
        self.events_captured += 1;
        self.log.add(event);

        if self.state != SessionState::Active {
            info!("Take started");
            self.transition(SessionState::Active);
        }
        true
    }

    fn handle_system(&mut self, delta_us: i64, message: &MidiMessage) {
        if self.state == SessionState::Active {
            self.since_last_event_us = self.since_last_event_us.saturating_add(delta_us);
        }
        match message {
            MidiMessage::TimingClock => {
                if let Some(bpm) = self.estimator.pulse(delta_us) {
                    debug!("tempo now {} BPM", bpm);
                }
            }
            MidiMessage::Start => self.estimator.reset(),
            _ => self.estimator.advance(delta_us),
        }
    }

    /// The idle timeout passed without new events
    pub fn on_idle_elapsed(&mut self) -> Option<Take> {
        trace!("idle timeout with {} pending events", self.log.len());
        self.flush()
    }

    /// Close the current take, if any. Returns `None` for an empty log.
    pub fn flush(&mut self) -> Option<Take> {
        if !self.log.has_events() {
            if self.state == SessionState::Active {
                self.transition(SessionState::Idle);
            }
            return None;
        }

        self.transition(SessionState::Flushing);
        let events = self.log.collect_and_clear();
        let take = Take::new(events, self.estimator.tempo(), Local::now());
        self.since_last_event_us = 0;
        self.transition(SessionState::Idle);
        Some(take)
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            trace!("session {} -> {}", self.state, next);
            self.state = next;
        }
    }
}

/// Totals reported when a session loop exits
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub events_captured: u64,
    pub takes_written: usize,
    pub takes_failed: usize,
}

impl SessionSummary {
    fn record(&mut self, result: Result<Result<std::path::PathBuf, SerialiseError>, JoinError>) {
        match result {
            Ok(Ok(path)) => {
                self.takes_written += 1;
                debug!("take written to {:?}", path);
            }
            Ok(Err(e)) => {
                self.takes_failed += 1;
                error!("Failed to write take: {}", e);
            }
            Err(e) => {
                self.takes_failed += 1;
                error!("Take writer task failed: {}", e);
            }
        }
    }
}

/// Async driver around a `SessionController`
pub struct Session {
    controller: SessionController,
    sink: Arc<dyn TakeSink>,
    idle_timeout: Duration,
}

impl Session {
    pub fn new(controller: SessionController, sink: Arc<dyn TakeSink>, idle_timeout: Duration) -> Self {
        Self {
            controller,
            sink,
            idle_timeout,
        }
    }

    /// Run until `shutdown` resolves or the message channel closes.
    ///
    /// A take still buffered at exit is flushed, and all writes are awaited
    /// before returning.
    pub async fn run<F>(self, mut messages: UnboundedReceiver<IncomingMessage>, shutdown: F) -> SessionSummary
    where
        F: Future<Output = ()>,
    {
        let Session {
            mut controller,
            sink,
            idle_timeout,
        } = self;

        let (elapsed_tx, mut elapsed_rx) = mpsc::unbounded_channel();
        let mut timer = IdleTimer::spawn(idle_timeout, elapsed_tx);
        let mut flushes = JoinSet::new();
        let mut summary = SessionSummary::default();

        if controller.state() != SessionState::Idle {
            controller.connected();
        }
        info!("Listening, idle timeout {:?}", idle_timeout);

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                message = messages.recv() => match message {
                    Some(message) => {
                        if controller.handle_message(message) {
                            timer.reset();
                        }
                    }
                    None => {
                        info!("MIDI input closed");
                        break;
                    }
                },
                Some(generation) = elapsed_rx.recv() => {
                    if timer.fired(generation) {
                        if let Some(take) = controller.on_idle_elapsed() {
                            spawn_flush(&mut flushes, &sink, take);
                        }
                    }
                }
                Some(result) = flushes.join_next(), if !flushes.is_empty() => {
                    summary.record(result);
                }
            }
        }

        timer.stop();
        if let Some(take) = controller.flush() {
            info!("Flushing pending take before exit");
            spawn_flush(&mut flushes, &sink, take);
        }
        while let Some(result) = flushes.join_next().await {
            summary.record(result);
        }
        timer.shutdown().await;
        controller.disconnected();

        summary.events_captured = controller.events_captured();
        summary
    }
}

fn spawn_flush(
    flushes: &mut JoinSet<Result<std::path::PathBuf, SerialiseError>>,
    sink: &Arc<dyn TakeSink>,
    take: Take,
) {
    info!("Take finished: {} events at {} BPM", take.len(), take.bpm);
    let sink = Arc::clone(sink);
    flushes.spawn_blocking(move || sink.write_take(&take));
}
