use std::time::Duration;

use hdrhistogram::Histogram;

/// Highest latency kept at full precision; slower requests are clamped to it.
const CEILING: Duration = Duration::from_secs(3600);
const MICROS_PER_MS: f64 = 1000.0;

/// Request latency distribution, recorded at microsecond resolution.
#[derive(Debug, Clone)]
pub struct LatencyHistogram(Histogram<u64>);

impl Default for LatencyHistogram {
    fn default() -> Self {
        let ceiling = CEILING.as_micros() as u64;
        // Three significant digits bound quantile error to 0.1%.
        match Histogram::new_with_bounds(1, ceiling, 3) {
            Ok(h) => Self(h),
            Err(err) => unreachable!("static histogram bounds rejected: {err}"),
        }
    }
}

impl LatencyHistogram {
    pub fn record(&mut self, latency: Duration) {
        let micros = latency.min(CEILING).as_micros() as u64;
        self.0.saturating_record(micros.max(1));
    }

    pub fn merge(&mut self, other: &LatencyHistogram) {
        // Both sides share the same bounds, so adding cannot fail.
        let _ = self.0.add(&other.0);
    }

    pub fn len(&self) -> u64 {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Latency at percentile `p` (0..=100), in milliseconds.
    pub fn percentile_ms(&self, p: f64) -> Option<f64> {
        if self.0.is_empty() || !p.is_finite() {
            return None;
        }
        Some(self.quantile_ms((p / 100.0).clamp(0.0, 1.0)))
    }

    fn quantile_ms(&self, q: f64) -> f64 {
        self.0.value_at_quantile(q) as f64 / MICROS_PER_MS
    }

    pub fn summary(&self) -> LatencySummary {
        let h = &self.0;
        if h.is_empty() {
            return LatencySummary::default();
        }

        LatencySummary {
            count: h.len(),
            min: Some(h.min() as f64 / MICROS_PER_MS),
            max: Some(h.max() as f64 / MICROS_PER_MS),
            mean: Some(h.mean() / MICROS_PER_MS),
            stdev: Some(h.stdev() / MICROS_PER_MS),
            p50: Some(self.quantile_ms(0.50)),
            p75: Some(self.quantile_ms(0.75)),
            p90: Some(self.quantile_ms(0.90)),
            p95: Some(self.quantile_ms(0.95)),
            p99: Some(self.quantile_ms(0.99)),
        }
    }
}

/// Latency statistics in milliseconds. Every field is `None` when nothing was recorded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LatencySummary {
    pub count: u64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub stdev: Option<f64>,
    pub p50: Option<f64>,
    pub p75: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
}
