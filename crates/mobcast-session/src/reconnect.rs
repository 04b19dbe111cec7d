//! Reconnection pacing.
//!
//! Nothing here sleeps. The session advances these timers by the `dt`
//! of each tick, so retry pacing follows the consumer's scheduler.

use std::time::Duration;

use crate::ReconnectConfig;

/// A one-shot timer advanced by explicit time steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    remaining: Duration,
}

impl Countdown {
    pub fn new(period: Duration) -> Self {
        Self { remaining: period }
    }

    /// Subtracts `dt`; returns `true` once the timer has run out.
    pub fn advance(&mut self, dt: Duration) -> bool {
        self.remaining = self.remaining.saturating_sub(dt);
        self.remaining.is_zero()
    }

    pub fn reset(&mut self, period: Duration) {
        self.remaining = period;
    }

    pub fn remaining(&self) -> Duration {
        self.remaining
    }
}

/// Snapshot of a reconnection window, for progress indicators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectProgress {
    /// Attempts started so far in this window.
    pub attempt: u32,
    pub max_attempts: u32,
    pub elapsed: Duration,
    pub timeout: Duration,
}

/// What the session should do after advancing the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectStep {
    Wait,
    /// Open a fresh connection; carries the attempt number (from 1).
    Attempt(u32),
    /// The window is exhausted.
    GiveUp,
}

/// Counters for one reconnection window.
///
/// ```text
///   0 ─── interval/2 ─── interval ─── interval ─── ...
///         attempt 1      attempt 2    attempt 3
/// ```
///
/// Every timer expiry counts. Once the count reaches `max_attempts`, or
/// the window has lasted `timeout`, the controller gives up.
#[derive(Debug, Clone)]
pub struct ReconnectController {
    config: ReconnectConfig,
    attempts: u32,
    elapsed: Duration,
    timer: Countdown,
}

impl ReconnectController {
    pub fn new(config: ReconnectConfig) -> Self {
        let timer = Countdown::new(config.interval() / 2);
        Self {
            config,
            attempts: 0,
            elapsed: Duration::ZERO,
            timer,
        }
    }

    pub fn advance(&mut self, dt: Duration) -> ReconnectStep {
        self.elapsed += dt;
        if self.elapsed >= self.config.timeout() {
            return ReconnectStep::GiveUp;
        }
        if !self.timer.advance(dt) {
            return ReconnectStep::Wait;
        }
        self.attempts += 1;
        if self.attempts >= self.config.max_attempts {
            return ReconnectStep::GiveUp;
        }
        self.timer.reset(self.config.interval());
        ReconnectStep::Attempt(self.attempts)
    }

    pub fn progress(&self) -> ReconnectProgress {
        ReconnectProgress {
            attempt: self.attempts,
            max_attempts: self.config.max_attempts,
            elapsed: self.elapsed,
            timeout: self.config.timeout(),
        }
    }
}
