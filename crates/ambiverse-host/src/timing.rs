//! Tick timing.
//!
//! Fixed timestep accumulator for the runtime, with optional wall-clock
//! pacing.

use std::time::{Duration, Instant};

/// Maximum fixed steps run for one wall-clock frame.
const MAX_STEPS_PER_FRAME: u32 = 10;

/// Fixed timestep clock.
#[derive(Debug)]
pub struct TickClock {
    /// Fixed timestep in seconds
    fixed_dt: f64,
    /// Wall-clock budget per tick
    tick_budget: Duration,
    /// Unconsumed time
    accumulator: f64,
    /// Largest wall delta accepted at once
    max_dt: f64,
    /// Start of the previous frame
    last_frame: Instant,
}

impl TickClock {
    /// Create a clock ticking `tick_rate` times per second.
    #[must_use]
    pub fn new(tick_rate: u32) -> Self {
        let tick_rate = tick_rate.max(1);
        let fixed_dt = 1.0 / f64::from(tick_rate);
        Self {
            fixed_dt,
            tick_budget: Duration::from_secs_f64(fixed_dt),
            accumulator: 0.0,
            max_dt: 0.25_f64.max(fixed_dt),
            last_frame: Instant::now(),
        }
    }

    /// Fixed timestep in seconds.
    #[must_use]
    pub fn fixed_dt(&self) -> f64 {
        self.fixed_dt
    }

    /// Wall time since the previous call, clamped to `max_dt`.
    pub fn delta_time(&mut self) -> f64 {
        let now = Instant::now();
        let dt = (now - self.last_frame).as_secs_f64();
        self.last_frame = now;
        dt.min(self.max_dt)
    }

    /// Accumulate time and return how many fixed steps are due.
    pub fn accumulate(&mut self, dt: f64) -> u32 {
        self.accumulator += dt.max(0.0);
        let mut count = 0;

        while self.accumulator >= self.fixed_dt && count < MAX_STEPS_PER_FRAME {
            self.accumulator -= self.fixed_dt;
            count += 1;
        }

        // Still behind: drop the backlog rather than spiral
        if self.accumulator > self.fixed_dt * 2.0 {
            self.accumulator = 0.0;
        }

        count
    }

    /// Sleep for whatever is left of the current tick's budget.
    pub fn sleep_remainder(&self) {
        let elapsed = self.last_frame.elapsed();
        if elapsed < self.tick_budget {
            std::thread::sleep(self.tick_budget - elapsed);
        }
    }

    /// Reset after a pause.
    pub fn reset(&mut self) {
        self.last_frame = Instant::now();
        self.accumulator = 0.0;
    }
}

impl Default for TickClock {
    fn default() -> Self {
        Self::new(30)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_dt() {
        let clock = TickClock::new(50);
        assert!((clock.fixed_dt() - 0.02).abs() < 1e-12);
        assert!((TickClock::new(0).fixed_dt() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_accumulate_whole_steps() {
        let mut clock = TickClock::new(10);
        assert_eq!(clock.accumulate(0.05), 0);
        assert_eq!(clock.accumulate(0.06), 1);
        assert_eq!(clock.accumulate(0.25), 2);
    }

    #[test]
    fn test_accumulate_caps_backlog() {
        let mut clock = TickClock::new(100);
        assert_eq!(clock.accumulate(5.0), MAX_STEPS_PER_FRAME);
        // Backlog dropped
        assert_eq!(clock.accumulate(0.0), 0);
    }

    #[test]
    fn test_negative_delta_ignored() {
        let mut clock = TickClock::new(10);
        assert_eq!(clock.accumulate(-1.0), 0);
        assert_eq!(clock.accumulate(0.1), 1);
    }

    #[test]
    fn test_delta_time_clamped() {
        let mut clock = TickClock::new(10);
        clock.reset();
        let dt = clock.delta_time();
        assert!(dt >= 0.0);
        assert!(dt <= 0.25);
    }
}
