//! Adaptive pacing between service calls.
//!
//! A small control loop on the delay
//! inserted between consecutive batches: every batch that completes without a
//! rate limit shaves a fixed step off the delay, while every rate-limit signal
//! doubles it. Each client owns its own `PacingState`; nothing is shared
//! across pipelines.

use std::time::Duration;

/// Per-client pacing state.
#[derive(Debug, Clone)]
pub struct PacingState {
    delay: Duration,
    floor: Duration,
    ceiling: Duration,
    step: Duration,
    started: bool,
}

impl Default for PacingState {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(2),
            Duration::ZERO,
            Duration::from_secs(30),
        )
    }
}

impl PacingState {
    /// Create a pacing state starting at `initial`, clamped to
    /// `[floor, ceiling]` as batches succeed or get throttled.
    pub fn new(initial: Duration, floor: Duration, ceiling: Duration) -> Self {
        let ceiling = ceiling.max(floor);
        Self {
            delay: initial.clamp(floor, ceiling),
            floor,
            ceiling,
            step: Duration::from_millis(500),
            started: false,
        }
    }

    /// Pacing state that never sleeps; used by tests and dry runs.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO, Duration::ZERO)
    }

    /// Current delay to apply before the next batch.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Delay to sleep before the next batch. The very first batch a client
    /// sends is never delayed; every batch after that pays the current delay,
    /// including the first batch of a later call on the same client.
    pub fn next_delay(&mut self) -> Duration {
        if !self.started {
            self.started = true;
            Duration::ZERO
        } else {
            self.delay
        }
    }

    /// A batch completed without throttling; ease off additively.
    pub fn record_success(&mut self) {
        self.delay = self.delay.saturating_sub(self.step).max(self.floor);
    }

    /// The service signalled a rate limit; back off multiplicatively.
    pub fn record_rate_limit(&mut self) {
        let doubled = self
            .delay
            .checked_mul(2)
            .unwrap_or(self.ceiling)
            .max(self.step);
        self.delay = doubled.min(self.ceiling);
    }
}
