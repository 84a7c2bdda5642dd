//! Adaptive Poller: tracks the Dispatcher's current backoff delay.
//!
//! Lives entirely on the Dispatcher's own task — no `Mutex`, no external
//! locking required. A claim that returns rows resets the delay to
//! `fastest`; an empty claim multiplies it toward `slowest`.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Poller {
    fastest: Duration,
    slowest: Duration,
    backoff_rate: f64,
    current: Duration,
}

impl Poller {
    pub fn new(fastest: Duration, slowest: Duration, backoff_rate: f64) -> Self {
        Self {
            fastest,
            slowest,
            backoff_rate,
            current: fastest,
        }
    }

    pub fn current_delay(&self) -> Duration {
        self.current
    }

    /// A claim_batch call found at least one row: go back to the fastest rate.
    pub fn on_jobs_found(&mut self) {
        self.current = self.fastest;
    }

    /// A claim_batch call found nothing: back off, capped at `slowest`.
    /// Returns the new delay.
    pub fn on_empty_poll(&mut self) -> Duration {
        let scaled = self.current.mul_f64(self.backoff_rate);
        self.current = scaled.min(self.slowest);
        self.current
    }
}
