//! # Server Tick Pacing
//!
//! Runs [`ReplicationServer::tick`](super::ReplicationServer::tick) at a
//! fixed rate.
//!
//! ```text
//! elapsed wall time ──> owed ──(one period per tick)──> tick()
//!                        │
//!                        └── more than MAX_CATCH_UP periods owed:
//!                            the excess is written off as skipped
//! ```
//!
//! A slow tick is counted late and the next ones run back to back until the
//! server has caught up. A stall longer than the catch-up window (a paused
//! debugger, a suspended laptop) does not turn into a burst of snapshots.

use std::time::{Duration, Instant};

use crate::config::{ServerConfig, DEFAULT_TICK_RATE};

/// Ticks the loop will run back to back to catch up.
pub const MAX_CATCH_UP: u32 = 5;

/// Timing of the ticks run so far.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickStats {
    /// Ticks measured.
    pub total_ticks: u64,
    /// Ticks that ran longer than one period.
    pub late_ticks: u64,
    /// Ticks written off after a stall.
    pub skipped_ticks: u64,
    /// Shortest tick, in microseconds.
    pub min_tick_us: u64,
    /// Longest tick, in microseconds.
    pub max_tick_us: u64,
    /// Exponential moving average, in microseconds.
    pub avg_tick_us: u64,
}

/// Fixed-rate pacing for the server tick.
pub struct TickLoop {
    period: Duration,
    last_poll: Instant,
    /// Wall time not yet paid for with ticks.
    owed: Duration,
    ticks_run: u64,
    stats: TickStats,
}

fn as_micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

impl TickLoop {
    /// Paces ticks at `tick_rate` per second.
    ///
    /// # Panics
    ///
    /// Panics if `tick_rate` is zero.
    #[must_use]
    pub fn new(tick_rate: u32) -> Self {
        assert!(tick_rate > 0, "tick rate must be positive");
        let period = Duration::from_secs(1) / tick_rate;
        Self {
            period,
            last_poll: Instant::now(),
            owed: Duration::ZERO,
            ticks_run: 0,
            stats: TickStats {
                min_tick_us: u64::MAX,
                ..TickStats::default()
            },
        }
    }

    /// Paces ticks at the server's configured rate.
    #[must_use]
    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(config.tick_rate)
    }

    /// Whether a tick is due. Keep ticking while this returns true.
    #[must_use]
    pub fn should_tick(&mut self) -> bool {
        let now = Instant::now();
        self.owed += now.duration_since(self.last_poll);
        self.last_poll = now;

        let window = self.period * MAX_CATCH_UP;
        if self.owed > window {
            let excess = self.owed - window;
            let skipped = excess.as_nanos() / self.period.as_nanos();
            if skipped > 0 {
                let skipped = u64::try_from(skipped).unwrap_or(u64::MAX);
                self.stats.skipped_ticks = self.stats.skipped_ticks.saturating_add(skipped);
                tracing::warn!(skipped, "server stalled, skipping ticks");
            }
            self.owed = window;
        }

        self.owed >= self.period
    }

    /// Pays one period for the tick about to run and returns its start time.
    #[must_use]
    pub fn begin_tick(&mut self) -> Instant {
        self.owed = self.owed.saturating_sub(self.period);
        self.ticks_run += 1;
        Instant::now()
    }

    /// Records how long the tick that began at `start` took.
    pub fn end_tick(&mut self, start: Instant) {
        let elapsed = start.elapsed();
        let us = as_micros(elapsed);
        let stats = &mut self.stats;

        stats.avg_tick_us = if stats.total_ticks == 0 {
            us
        } else {
            (stats.avg_tick_us * 7 + us) / 8
        };
        stats.total_ticks += 1;
        stats.min_tick_us = stats.min_tick_us.min(us);
        stats.max_tick_us = stats.max_tick_us.max(us);

        if elapsed > self.period {
            stats.late_ticks += 1;
            tracing::debug!(tick = self.ticks_run, us, "tick overran its period");
        }
    }

    /// Time until the next tick is due; zero if one is due now.
    #[must_use]
    pub fn time_until_next_tick(&self) -> Duration {
        self.period.saturating_sub(self.owed + self.last_poll.elapsed())
    }

    /// Blocks until the next tick is due.
    ///
    /// Sleeps through most of the wait and spins the last half millisecond.
    pub fn wait_for_next_tick(&self) {
        let remaining = self.time_until_next_tick();
        if remaining.is_zero() {
            return;
        }
        let deadline = Instant::now() + remaining;
        let spin = Duration::from_micros(500);
        if remaining > spin {
            std::thread::sleep(remaining - spin);
        }
        while Instant::now() < deadline {
            std::hint::spin_loop();
        }
    }

    /// Ticks begun so far.
    #[must_use]
    pub const fn tick_count(&self) -> u64 {
        self.ticks_run
    }

    /// Length of one tick.
    #[must_use]
    pub const fn period(&self) -> Duration {
        self.period
    }

    /// Timing so far.
    #[must_use]
    pub const fn stats(&self) -> &TickStats {
        &self.stats
    }
}

impl Default for TickLoop {
    fn default() -> Self {
        Self::new(DEFAULT_TICK_RATE)
    }
}
