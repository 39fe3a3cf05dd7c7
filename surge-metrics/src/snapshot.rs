use std::collections::BTreeMap;

use crate::histogram::{LatencyHistogram, LatencySummary};

/// Per-second activity, keyed by the second in which a request was *started*.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowCounts {
    pub started: u64,
    pub failed: u64,
    pub dropped: u64,
}

impl WindowCounts {
    pub(crate) fn merge(&mut self, other: &WindowCounts) {
        self.started = self.started.saturating_add(other.started);
        self.failed = self.failed.saturating_add(other.failed);
        self.dropped = self.dropped.saturating_add(other.dropped);
    }

    /// Scheduling decisions in this window (issued + dropped).
    pub fn scheduled(&self) -> u64 {
        self.started.saturating_add(self.dropped)
    }
}

/// Point-in-time copy of an [`crate::Aggregator`].
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    /// Recorded request outcomes.
    pub count: u64,
    pub error_count: u64,
    /// Requests that were due but could not be dispatched.
    pub dropped: u64,
    pub checks_passed: u64,
    pub checks_failed: u64,
    pub errors_by_kind: BTreeMap<String, u64>,
    pub timeline: BTreeMap<u64, WindowCounts>,
    pub(crate) latency: LatencyHistogram,
}

impl MetricsSnapshot {
    pub(crate) fn empty() -> Self {
        Self {
            count: 0,
            error_count: 0,
            dropped: 0,
            checks_passed: 0,
            checks_failed: 0,
            errors_by_kind: BTreeMap::new(),
            timeline: BTreeMap::new(),
            latency: LatencyHistogram::default(),
        }
    }

    pub fn latency(&self) -> &LatencyHistogram {
        &self.latency
    }

    pub fn latency_summary(&self) -> LatencySummary {
        self.latency.summary()
    }

    /// Latency at percentile `p` (0..=100) in milliseconds.
    pub fn latency_percentile(&self, p: f64) -> Option<f64> {
        self.latency.percentile_ms(p)
    }

    pub fn scheduled(&self) -> u64 {
        self.count.saturating_add(self.dropped)
    }

    /// Failed outcomes over recorded outcomes. With `include_drops`, drops count as failed
    /// requests on both sides of the ratio.
    pub fn error_rate(&self, include_drops: bool) -> Option<f64> {
        let (failed, total) = if include_drops {
            (
                self.error_count.saturating_add(self.dropped),
                self.scheduled(),
            )
        } else {
            (self.error_count, self.count)
        };

        (total > 0).then(|| failed as f64 / total as f64)
    }

    pub fn checks_total(&self) -> u64 {
        self.checks_passed.saturating_add(self.checks_failed)
    }

    pub fn checks_rate(&self) -> Option<f64> {
        let total = self.checks_total();
        (total > 0).then(|| self.checks_passed as f64 / total as f64)
    }

    /// Sums the timeline over `[from_sec, to_sec)`.
    pub fn window(&self, from_sec: u64, to_sec: u64) -> WindowCounts {
        let mut out = WindowCounts::default();
        for (_, w) in self.timeline.range(from_sec..to_sec) {
            out.merge(w);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use crate::{Aggregator, Sample};
    use std::time::Duration;

    #[test]
    fn error_rate_respects_drop_policy() {
        let agg = Aggregator::with_shards(1);
        for i in 0..8 {
            agg.record(Sample {
                offset: Duration::ZERO,
                latency: Duration::from_millis(1),
                failed: i == 0,
                error_kind: None,
                check: None,
            });
        }
        agg.record_drop(Duration::ZERO);
        agg.record_drop(Duration::ZERO);

        let snap = agg.snapshot();
        assert_eq!(snap.error_rate(false), Some(1.0 / 8.0));
        assert_eq!(snap.error_rate(true), Some(3.0 / 10.0));
    }

    #[test]
    fn empty_snapshot_has_no_rates() {
        let snap = Aggregator::with_shards(1).snapshot();
        assert!(snap.error_rate(false).is_none());
        assert!(snap.checks_rate().is_none());
        assert!(snap.latency_percentile(50.0).is_none());
    }

    #[test]
    fn window_sums_half_open_range() {
        let agg = Aggregator::with_shards(2);
        for sec in 0..5u64 {
            agg.record(Sample {
                offset: Duration::from_secs(sec),
                latency: Duration::from_millis(1),
                failed: false,
                error_kind: None,
                check: Some(true),
            });
        }

        let snap = agg.snapshot();
        assert_eq!(snap.window(1, 4).started, 3);
        assert_eq!(snap.window(0, 100).started, 5);
        assert_eq!(snap.checks_rate(), Some(1.0));
    }
}
