use std::time::Duration;

/// Requests per second over `elapsed`, or `None` before any time has passed.
pub fn per_sec(count: u64, elapsed: Duration) -> Option<f64> {
    (!elapsed.is_zero()).then(|| count as f64 / elapsed.as_secs_f64())
}

/// Throughput observed across successive progress windows.
///
/// Mean and sample deviation are kept with Welford's update so the series
/// never stores individual windows.
#[derive(Debug, Default, Clone, Copy)]
pub struct RateSeries {
    windows: u64,
    mean: f64,
    sq_dev: f64,
    peak: f64,
}

impl RateSeries {
    /// Folds in a window that saw `completed` requests over `window`, returning its rate.
    /// Zero-length windows report `0.0` and are not folded in.
    pub fn observe(&mut self, completed: u64, window: Duration) -> f64 {
        let Some(rate) = per_sec(completed, window) else {
            return 0.0;
        };

        self.windows += 1;
        let before = rate - self.mean;
        self.mean += before / self.windows as f64;
        self.sq_dev += before * (rate - self.mean);
        self.peak = self.peak.max(rate);
        rate
    }

    pub fn windows(&self) -> u64 {
        self.windows
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn stdev(&self) -> f64 {
        match self.windows {
            0 | 1 => 0.0,
            n => (self.sq_dev / (n - 1) as f64).sqrt(),
        }
    }

    pub fn peak(&self) -> f64 {
        self.peak
    }
}
