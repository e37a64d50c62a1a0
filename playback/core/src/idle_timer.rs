//! Idle Timer
//!
//! Single-shot deferred signal armed while the character is idle. Expiry is
//! delivered as [`ControllerSignal::IdleExpired`] on the controller's signal
//! channel, tagged with the generation that armed it. Every `arm` and every
//! effective `disarm` bumps the generation, so an expiry that was already
//! queued when the timer was re-armed or disarmed is recognised as stale.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::controller::ControllerSignal;

/// Cancellable single-shot idle timer
pub struct IdleTimer {
    timeout: Duration,
    signals: mpsc::UnboundedSender<ControllerSignal>,
    generation: u64,
    task: Option<JoinHandle<()>>,
}

impl IdleTimer {
    /// Create a disarmed timer
    #[must_use]
    pub fn new(timeout: Duration, signals: mpsc::UnboundedSender<ControllerSignal>) -> Self {
        Self {
            timeout,
            signals,
            generation: 0,
            task: None,
        }
    }

    /// Configured timeout
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Start (or restart) the countdown
    pub fn arm(&mut self) {
        self.cancel();
        self.generation += 1;

        let generation = self.generation;
        let timeout = self.timeout;
        let signals = self.signals.clone();
        self.task = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = signals.send(ControllerSignal::IdleExpired { generation });
        }));
        tracing::trace!(generation, ?timeout, "Idle timer armed");
    }

    /// Stop the countdown; a no-op when already disarmed
    pub fn disarm(&mut self) {
        if self.cancel() {
            self.generation += 1;
            tracing::trace!(generation = self.generation, "Idle timer disarmed");
        }
    }

    /// Whether a countdown is pending or its expiry not yet consumed
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.task.is_some()
    }

    /// Accept an expiry signal if it belongs to the current arming
    ///
    /// Returns `true` once per arming; the timer is disarmed afterwards.
    pub fn take_expiry(&mut self, generation: u64) -> bool {
        if self.task.is_none() || generation != self.generation {
            return false;
        }
        self.task = None;
        true
    }

    fn cancel(&mut self) -> bool {
        match self.task.take() {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }
}

impl Drop for IdleTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timer(timeout_ms: u64) -> (IdleTimer, mpsc::UnboundedReceiver<ControllerSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (IdleTimer::new(Duration::from_millis(timeout_ms), tx), rx)
    }

    fn generation_of(signal: ControllerSignal) -> u64 {
        match signal {
            ControllerSignal::IdleExpired { generation } => generation,
            other => panic!("unexpected signal: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_timeout() {
        let (mut timer, mut rx) = timer(3000);
        timer.arm();
        assert!(timer.is_armed());

        let start = tokio::time::Instant::now();
        let generation = generation_of(rx.recv().await.unwrap());
        assert_eq!(start.elapsed(), Duration::from_millis(3000));

        assert!(timer.take_expiry(generation));
        assert!(!timer.is_armed());
        // Consumed once only
        assert!(!timer.take_expiry(generation));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarm_is_idempotent() {
        let (mut timer, mut rx) = timer(100);
        timer.disarm();
        timer.disarm();
        assert!(!timer.is_armed());

        timer.arm();
        timer.disarm();
        timer.disarm();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_makes_previous_expiry_stale() {
        let (mut timer, mut rx) = timer(100);
        timer.arm();
        let first = generation_of(rx.recv().await.unwrap());

        // Expiry queued but not consumed; a user interaction re-arms
        timer.arm();
        assert!(!timer.take_expiry(first));

        let second = generation_of(rx.recv().await.unwrap());
        assert!(timer.take_expiry(second));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_restarts_countdown() {
        let (mut timer, mut rx) = timer(1000);
        timer.arm();
        tokio::time::sleep(Duration::from_millis(800)).await;
        timer.arm();

        let start = tokio::time::Instant::now();
        rx.recv().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_millis(1000));
    }
}
