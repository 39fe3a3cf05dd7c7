use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use surge_metrics::{LatencySummary, MetricsSnapshot, RateSeries};

/// What happened between two consecutive progress ticks.
#[derive(Debug, Clone, Default)]
pub struct WindowActivity {
    pub completed: u64,
    pub failed: u64,
    pub dropped: u64,
    /// Completed requests per second over the window.
    pub rate: f64,
    pub errors: BTreeMap<String, u64>,
}

impl WindowActivity {
    pub(crate) fn between(prev: &MetricsSnapshot, cur: &MetricsSnapshot) -> Self {
        let errors = cur
            .errors_by_kind
            .iter()
            .filter_map(|(kind, total)| {
                let before = prev.errors_by_kind.get(kind).copied().unwrap_or(0);
                let delta = total.saturating_sub(before);
                (delta > 0).then(|| (kind.clone(), delta))
            })
            .collect();

        Self {
            completed: cur.count.saturating_sub(prev.count),
            failed: cur.error_count.saturating_sub(prev.error_count),
            dropped: cur.dropped.saturating_sub(prev.dropped),
            rate: 0.0,
            errors,
        }
    }

    /// Failed over completed in this window; `0.0` for an idle window.
    pub fn error_rate(&self) -> f64 {
        if self.completed == 0 {
            return 0.0;
        }
        self.failed as f64 / self.completed as f64
    }
}

/// Cumulative counts since the scenario started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunTotals {
    pub requests: u64,
    pub failed: u64,
    pub dropped: u64,
    pub checks_failed: u64,
}

impl From<&MetricsSnapshot> for RunTotals {
    fn from(s: &MetricsSnapshot) -> Self {
        Self {
            requests: s.count,
            failed: s.error_count,
            dropped: s.dropped,
            checks_failed: s.checks_failed,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LiveMetrics {
    pub window: WindowActivity,
    pub totals: RunTotals,
    /// Per-window throughput seen so far.
    pub throughput: RateSeries,
    /// Whole-run latency, in milliseconds.
    pub latency: LatencySummary,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VuProgress {
    pub busy: u64,
    pub idle: u64,
    pub peak_busy: u64,
    pub max: u64,
}

#[derive(Debug, Clone)]
pub struct StageProgress {
    /// 1-based.
    pub stage: usize,
    pub stages: usize,
    pub stage_elapsed: Duration,
    pub stage_remaining: Duration,
    pub start_target: u64,
    pub end_target: u64,
    pub current_target: f64,
}

#[derive(Debug, Clone)]
pub enum ScenarioProgress {
    ConstantArrivalRate {
        rate: u64,
        time_unit: Duration,
        duration: Duration,
    },
    RampingArrivalRate {
        time_unit: Duration,
        total_duration: Duration,
        stage: Option<StageProgress>,
    },
}

/// Emitted by a running scenario once per progress interval.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Starts at 1.
    pub tick: u64,
    pub elapsed: Duration,
    pub scenario: String,
    /// Arrival rate the scheduler is aiming for at `elapsed`, per second.
    pub target_rate: f64,
    pub metrics: LiveMetrics,
    pub vus: VuProgress,
    pub progress: ScenarioProgress,
}

pub type ProgressFn = Arc<dyn Fn(ProgressUpdate) + Send + Sync + 'static>;

#[cfg(test)]
mod tests {
    use super::*;
    use surge_metrics::{Aggregator, Sample};

    fn sample(failed: bool, kind: Option<&'static str>) -> Sample<'static> {
        Sample {
            offset: Duration::ZERO,
            latency: Duration::from_millis(2),
            failed,
            error_kind: kind,
            check: None,
        }
    }

    #[test]
    fn window_only_counts_what_changed() {
        let agg = Aggregator::with_shards(2);
        agg.record(sample(true, Some("timeout")));
        let before = agg.snapshot();

        agg.record(sample(false, None));
        agg.record(sample(true, Some("status_500")));
        agg.record_drop(Duration::ZERO);
        let after = agg.snapshot();

        let w = WindowActivity::between(&before, &after);
        assert_eq!(w.completed, 2);
        assert_eq!(w.failed, 1);
        assert_eq!(w.dropped, 1);
        assert_eq!(w.error_rate(), 0.5);
        assert_eq!(w.errors.len(), 1);
        assert_eq!(w.errors.get("status_500"), Some(&1));

        let totals = RunTotals::from(&after);
        assert_eq!(totals.requests, 3);
        assert_eq!(totals.failed, 2);
    }

    #[test]
    fn idle_window_has_zero_error_rate() {
        assert_eq!(WindowActivity::default().error_rate(), 0.0);
    }
}
