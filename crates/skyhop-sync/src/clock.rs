//! Fixed-rate tick scheduling.
//!
//! A peer runs two clocks off one variable frame delta: the physics clock
//! and the network (snapshot) clock. Both accumulate real elapsed time and
//! yield whole ticks.

use std::time::Duration;

/// Fixed-rate tick scheduler.
#[derive(Debug, Clone)]
pub struct TickSchedule {
    accumulator: Duration,
    tick_duration: Duration,
    total_ticks: u64,
}

impl TickSchedule {
    /// Creates a schedule running at `hz` ticks per second. A rate of zero
    /// is treated as one tick per second.
    pub fn with_tick_rate(hz: u32) -> Self {
        let hz = hz.max(1);
        Self {
            accumulator: Duration::ZERO,
            tick_duration: Duration::from_nanos(1_000_000_000 / hz as u64),
            total_ticks: 0,
        }
    }

    /// Accumulates elapsed time and returns the number of ticks to process.
    pub fn accumulate(&mut self, dt: Duration) -> u32 {
        self.accumulator += dt;
        let mut ticks = 0u32;
        while self.accumulator >= self.tick_duration {
            self.accumulator -= self.tick_duration;
            self.total_ticks += 1;
            ticks += 1;
        }
        ticks
    }

    /// Total ticks produced since creation.
    pub fn total_ticks(&self) -> u64 {
        self.total_ticks
    }

    /// Duration of one tick.
    pub fn tick_duration(&self) -> Duration {
        self.tick_duration
    }
}
