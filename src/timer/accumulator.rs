use tracing::debug;

use super::TimerError;

/// Owns the elapsed running time of one overlay instance.
///
/// While running, the current elapsed value is
/// `prev_accumulated_ms + (now - last_start_ms)`; while stopped it is
/// `accumulated_ms` exactly. All instants are monotonic milliseconds from
/// the engine [`Clock`](super::Clock).
///
/// Because a press only commits after the hold-confirmation delay, the
/// caller anchors `start` and `stop` at the original press-start instant
/// rather than the commit instant. That keeps the stored time free of the
/// confirmation delay.
#[derive(Clone, Debug, Default)]
pub struct TimeAccumulator {
    // Accumulated time while stopped, in ms
    accumulated_ms: u64,
    // Accumulated time when the timer was last started
    prev_accumulated_ms: u64,
    // Instant at which the timer was last started
    last_start_ms: u64,
    running: bool,
}

impl TimeAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Start counting from the currently accumulated value.
    ///
    /// `press_start_ms` is the instant the triggering press began.
    pub fn start(&mut self, press_start_ms: u64) -> Result<(), TimerError> {
        if self.running {
            return Err(TimerError::AlreadyRunning);
        }
        self.prev_accumulated_ms = self.accumulated_ms;
        self.last_start_ms = press_start_ms;
        self.running = true;
        debug!(
            "Timer started at {}ms with {}ms accumulated",
            press_start_ms, self.prev_accumulated_ms
        );
        Ok(())
    }

    /// Stop counting, valuing the run as of `at_ms`.
    ///
    /// Passing the press-start instant of the stopping hold yields the
    /// drift-corrected value; passing a current timestamp yields the plain
    /// wall value. Returns the accumulated total.
    pub fn stop(&mut self, at_ms: u64) -> Result<u64, TimerError> {
        if !self.running {
            return Err(TimerError::NotRunning);
        }
        self.accumulated_ms = self
            .prev_accumulated_ms
            .saturating_add(at_ms.saturating_sub(self.last_start_ms));
        self.running = false;
        debug!("Timer stopped at {}ms total", self.accumulated_ms);
        Ok(self.accumulated_ms)
    }

    /// Force a stop with zero accumulated time.
    pub fn reset(&mut self) {
        self.accumulated_ms = 0;
        self.prev_accumulated_ms = 0;
        self.last_start_ms = 0;
        self.running = false;
        debug!("Timer reset");
    }

    /// Current elapsed time. Idempotent, callable at any rate.
    pub fn query(&self, now_ms: u64) -> u64 {
        if self.running {
            self.prev_accumulated_ms
                .saturating_add(now_ms.saturating_sub(self.last_start_ms))
        } else {
            self.accumulated_ms
        }
    }

    /// Elapsed time as of the instant the confirming hold began.
    ///
    /// This is the value recorded into a split: the hold-confirmation
    /// delay between press-start and commit never inflates it. While
    /// stopped it returns the accumulated value unchanged.
    pub fn fixed_elapsed(&self, press_start_ms: u64) -> u64 {
        if self.running {
            self.prev_accumulated_ms
                .saturating_add(press_start_ms.saturating_sub(self.last_start_ms))
        } else {
            self.accumulated_ms
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stopped_query_returns_accumulated_exactly() {
        let acc = TimeAccumulator::new();
        assert_eq!(acc.query(12345), 0);
    }

    #[test]
    fn start_twice_is_an_error() {
        let mut acc = TimeAccumulator::new();
        acc.start(100).unwrap();
        assert!(matches!(acc.start(200), Err(TimerError::AlreadyRunning)));
    }

    #[test]
    fn stop_without_start_is_an_error() {
        let mut acc = TimeAccumulator::new();
        assert!(matches!(acc.stop(100), Err(TimerError::NotRunning)));
    }

    #[test]
    fn query_is_monotonic_while_running() {
        let mut acc = TimeAccumulator::new();
        acc.start(1000).unwrap();
        let mut prev = 0;
        for now in (1000..2000).step_by(33) {
            let q = acc.query(now);
            assert!(q >= prev);
            prev = q;
        }
    }

    #[test]
    fn stop_start_stop_accumulates_additively() {
        let mut acc = TimeAccumulator::new();
        acc.start(1000).unwrap();
        assert_eq!(acc.stop(1500).unwrap(), 500);

        acc.start(3000).unwrap();
        assert_eq!(acc.stop(3250).unwrap(), 750);
        assert_eq!(acc.query(9999), 750);
    }

    #[test]
    fn stop_at_press_start_excludes_the_hold() {
        let mut acc = TimeAccumulator::new();
        // Press began at 1000, commit fired at 1400 after the hold delay.
        acc.start(1000).unwrap();
        // Stopping hold began at 2000, its commit would land at 2400.
        assert_eq!(acc.stop(2000).unwrap(), 1000);
    }

    #[test]
    fn fixed_elapsed_ignores_the_confirmation_delay() {
        let mut acc = TimeAccumulator::new();
        acc.start(1000).unwrap();
        // At commit time (press began 5000, commit at 5400) the recorded
        // value reflects the press instant.
        assert_eq!(acc.fixed_elapsed(5000), 4000);
        assert_eq!(acc.query(5400), 4400);
    }

    #[test]
    fn fixed_elapsed_while_stopped_is_the_accumulated_value() {
        let mut acc = TimeAccumulator::new();
        acc.start(0).unwrap();
        acc.stop(800).unwrap();
        assert_eq!(acc.fixed_elapsed(5000), 800);
    }

    #[test]
    fn reset_zeroes_and_stops() {
        let mut acc = TimeAccumulator::new();
        acc.start(100).unwrap();
        acc.reset();
        assert!(!acc.is_running());
        assert_eq!(acc.query(500), 0);
        // Restartable after reset.
        acc.start(600).unwrap();
        assert_eq!(acc.query(700), 100);
    }
}
