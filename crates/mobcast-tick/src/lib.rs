//! Fixed-cadence ticker for driving a controller session.
//!
//! The session has no timers of its own; retry pacing, keepalive,
//! debounce and event delivery all advance when the consumer calls
//! `Session::tick(dt)`. A [`Ticker`] produces that cadence on the
//! consumer's task and reports the time that actually passed, so the
//! session clock follows the wall clock even when a tick runs late.
//!
//! # Integration
//!
//! ```ignore
//! let mut ticker = Ticker::new(TickConfig::default());
//! loop {
//!     tokio::select! {
//!         Some(line) = lines.next_line() => { /* send input */ }
//!         tick = ticker.wait_for_tick() => session.tick(tick.dt).await,
//!     }
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use serde::Deserialize;
use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What to do when the consumer falls behind the cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case", tag = "policy")]
pub enum MissedTickPolicy {
    /// Forget the missed ticks and schedule the next one from now.
    #[default]
    Skip,
    /// Fire up to `max_burst` ticks back to back to regain the cadence,
    /// then fall back to `Skip`.
    Burst { max_burst: u32 },
    /// Keep the original schedule; the next deadline is one period after
    /// the missed one.
    Delay,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TickConfig {
    /// Ticks per second.
    pub rate_hz: u32,
    pub missed: MissedTickPolicy,
    /// Random delay (0..n ms) added before the first tick.
    pub initial_jitter_ms: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            rate_hz: 30,
            missed: MissedTickPolicy::default(),
            initial_jitter_ms: 0,
        }
    }
}

impl TickConfig {
    pub const MIN_RATE_HZ: u32 = 1;
    pub const MAX_RATE_HZ: u32 = 240;

    pub fn with_rate(rate_hz: u32) -> Self {
        Self {
            rate_hz,
            ..Default::default()
        }
    }

    /// Clamps `rate_hz` into `MIN_RATE_HZ..=MAX_RATE_HZ`.
    pub fn validated(mut self) -> Self {
        let clamped = self.rate_hz.clamp(Self::MIN_RATE_HZ, Self::MAX_RATE_HZ);
        if clamped != self.rate_hz {
            warn!(
                rate = self.rate_hz,
                min = Self::MIN_RATE_HZ,
                max = Self::MAX_RATE_HZ,
                "rate_hz out of range, clamping"
            );
            self.rate_hz = clamped;
        }
        self
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.rate_hz.max(1)))
    }
}

// ---------------------------------------------------------------------------
// Tick
// ---------------------------------------------------------------------------

/// One tick, as returned by [`Ticker::wait_for_tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// Starts at 1.
    pub seq: u64,
    /// Time since the previous tick (or since the ticker started or
    /// resumed). Pass this to `Session::tick`.
    pub dt: Duration,
    /// Fired more than a tenth of a period after its deadline.
    pub late: bool,
    /// Periods dropped to recover from lateness.
    pub skipped: u64,
}

// ---------------------------------------------------------------------------
// Ticker
// ---------------------------------------------------------------------------

pub struct Ticker {
    config: TickConfig,
    period: Duration,
    seq: u64,
    next: Instant,
    last: Instant,
    paused: bool,
    skipped_total: u64,
}

impl Ticker {
    pub fn new(config: TickConfig) -> Self {
        let config = config.validated();
        let period = config.period();
        let jitter = if config.initial_jitter_ms > 0 {
            Duration::from_millis(rand::rng().random_range(0..config.initial_jitter_ms))
        } else {
            Duration::ZERO
        };
        let now = Instant::now();
        debug!(
            rate_hz = config.rate_hz,
            period_ms = period.as_secs_f64() * 1000.0,
            missed = ?config.missed,
            "ticker created"
        );
        Self {
            config,
            period,
            seq: 0,
            next: now + period + jitter,
            last: now,
            paused: false,
            skipped_total: 0,
        }
    }

    pub fn with_rate(rate_hz: u32) -> Self {
        Self::new(TickConfig::with_rate(rate_hz))
    }

    /// Waits for the next tick. Pends forever while paused, so it is
    /// safe to use as a `select!` branch.
    pub async fn wait_for_tick(&mut self) -> Tick {
        if self.paused {
            std::future::pending::<()>().await;
        }

        let deadline = self.next;
        time::sleep_until(deadline).await;

        let now = Instant::now();
        let late_by = now.saturating_duration_since(deadline);
        let late = late_by > self.period / 10;
        let behind = (late_by.as_nanos() / self.period.as_nanos()) as u64;
        let mut skipped = 0;

        self.next = match self.config.missed {
            MissedTickPolicy::Skip => {
                skipped = behind;
                now + self.period
            }
            MissedTickPolicy::Burst { max_burst } if behind <= u64::from(max_burst) => {
                deadline + self.period
            }
            MissedTickPolicy::Burst { .. } => {
                skipped = behind;
                now + self.period
            }
            MissedTickPolicy::Delay => deadline + self.period,
        };
        if skipped > 0 {
            warn!(
                seq = self.seq + 1,
                skipped,
                late_ms = late_by.as_secs_f64() * 1000.0,
                "ticker fell behind, skipping ahead"
            );
        }

        self.seq += 1;
        self.skipped_total += skipped;
        let dt = now.saturating_duration_since(self.last);
        self.last = now;
        trace!(seq = self.seq, late, "tick");

        Tick {
            seq: self.seq,
            dt,
            late,
            skipped,
        }
    }

    /// Stops ticking until [`resume`](Self::resume). Idempotent.
    pub fn pause(&mut self) {
        if !self.paused {
            self.paused = true;
            debug!(seq = self.seq, "ticker paused");
        }
    }

    /// Restarts the cadence one period from now. Time spent paused is not
    /// reported in the next tick's `dt`.
    pub fn resume(&mut self) {
        if self.paused {
            self.paused = false;
            let now = Instant::now();
            self.next = now + self.period;
            self.last = now;
            debug!(seq = self.seq, "ticker resumed");
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Ticks fired so far.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn rate_hz(&self) -> u32 {
        self.config.rate_hz
    }

    pub fn skipped_total(&self) -> u64 {
        self.skipped_total
    }
}
