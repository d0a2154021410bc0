// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Reset-on-activity idle timer.
//!
//! The timer runs as its own task. The session loop sends it `Reset` on every
//! captured event and gets `Elapsed(generation)` back once the timeout passes
//! without another reset. Each reset carries a new generation, so an elapse
//! that raced with a newer reset is recognised as stale and ignored.

use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::trace;

/// Commands accepted by the timer task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerCommand {
    /// Restart the countdown, tagged with a generation
    Reset(u64),
    /// Disarm without firing
    Stop,
}

/// Handle to a running idle timer task
#[derive(Debug)]
pub struct IdleTimer {
    commands: UnboundedSender<TimerCommand>,
    generation: u64,
    armed: bool,
    handle: JoinHandle<()>,
}

impl IdleTimer {
    /// Spawn the timer task. Elapsed generations are delivered to `elapsed`.
    pub fn spawn(timeout: Duration, elapsed: UnboundedSender<u64>) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_timer(timeout, receiver, elapsed));
        Self {
            commands,
            generation: 0,
            armed: false,
            handle,
        }
    }

    /// Restart the countdown. Returns the new generation.
    pub fn reset(&mut self) -> u64 {
        self.generation += 1;
        self.armed = true;
        let _ = self.commands.send(TimerCommand::Reset(self.generation));
        self.generation
    }

    /// Disarm the timer; any elapse already in flight becomes stale.
    pub fn stop(&mut self) {
        self.generation += 1;
        self.armed = false;
        let _ = self.commands.send(TimerCommand::Stop);
    }

    /// Consume an elapse notification. True only for the latest reset.
    pub fn fired(&mut self, generation: u64) -> bool {
        if self.armed && generation == self.generation {
            self.armed = false;
            true
        } else {
            trace!(
                "ignoring stale idle elapse {} (current {})",
                generation,
                self.generation
            );
            false
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Stop the task and wait for it to exit
    pub async fn shutdown(self) {
        let IdleTimer {
            commands, handle, ..
        } = self;
        drop(commands);
        let _ = handle.await;
    }
}

async fn run_timer(
    timeout: Duration,
    mut commands: UnboundedReceiver<TimerCommand>,
    elapsed: UnboundedSender<u64>,
) {
    let mut deadline: Option<(Instant, u64)> = None;

    loop {
        let wake_at = deadline.map(|(at, _)| at);
        let expiry = async move {
            match wake_at {
                Some(at) => sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            command = commands.recv() => match command {
                Some(TimerCommand::Reset(generation)) => {
                    deadline = Some((Instant::now() + timeout, generation));
                }
                Some(TimerCommand::Stop) => deadline = None,
                None => break,
            },
            _ = expiry => {
                if let Some((_, generation)) = deadline.take() {
                    if elapsed.send(generation).is_err() {
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_timeout() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = IdleTimer::spawn(Duration::from_secs(5), tx);

        let start = Instant::now();
        let generation = timer.reset();
        let fired = rx.recv().await.unwrap();

        assert_eq!(fired, generation);
        assert!(start.elapsed() >= Duration::from_secs(5));
        assert!(timer.fired(fired));
        assert!(!timer.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_postpones_elapse() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = IdleTimer::spawn(Duration::from_secs(5), tx);

        let start = Instant::now();
        timer.reset();
        tokio::time::sleep(Duration::from_secs(3)).await;
        let latest = timer.reset();

        let fired = rx.recv().await.unwrap();
        assert_eq!(fired, latest);
        assert!(start.elapsed() >= Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_disarms() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = IdleTimer::spawn(Duration::from_secs(1), tx);

        timer.reset();
        timer.stop();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stale_generation_is_ignored() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut timer = IdleTimer::spawn(Duration::from_secs(60), tx);

        let old = timer.reset();
        let new = timer.reset();
        assert!(!timer.fired(old));
        assert!(timer.fired(new));
        // Only the first notification for a generation counts
        assert!(!timer.fired(new));
        timer.shutdown().await;
    }
}
