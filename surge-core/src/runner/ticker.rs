use std::time::Duration;

/// Scheduler tick. Every tick converts elapsed time into a whole number of due requests.
pub const DEFAULT_TICK: Duration = Duration::from_millis(10);

/// Fractional carry-over between ticks, so the total issued over a run tracks the integral of
/// the rate rather than drifting by a rounding error per tick.
#[derive(Debug, Default, Clone, Copy)]
pub struct DueAccumulator {
    carry: f64,
}

impl DueAccumulator {
    /// Adds `rate_per_sec * dt` and returns the whole requests now due.
    pub fn advance(&mut self, rate_per_sec: f64, dt: Duration) -> u64 {
        if !rate_per_sec.is_finite() || rate_per_sec <= 0.0 {
            return 0;
        }

        self.carry += rate_per_sec * dt.as_secs_f64();
        // Absorb float noise like 1.9999999999 so an exact integral isn't short by one.
        let due = (self.carry + 1e-9).floor();
        self.carry = (self.carry - due).max(0.0);
        due as u64
    }

    pub fn carry(&self) -> f64 {
        self.carry
    }
}
