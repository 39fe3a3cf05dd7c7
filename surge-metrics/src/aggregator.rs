use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::histogram::LatencyHistogram;
use crate::snapshot::{MetricsSnapshot, WindowCounts};

/// One observation handed to [`Aggregator::record`].
#[derive(Debug, Clone, Copy)]
pub struct Sample<'a> {
    /// Start of the request, relative to the start of the run.
    pub offset: Duration,
    /// Time from dispatch to outcome, timed-out requests included.
    pub latency: Duration,
    pub failed: bool,
    pub error_kind: Option<&'a str>,
    /// Result of the scenario check, if one is configured.
    pub check: Option<bool>,
}

#[derive(Debug)]
struct Shard {
    count: u64,
    errors: u64,
    dropped: u64,
    checks_passed: u64,
    checks_failed: u64,
    errors_by_kind: HashMap<String, u64>,
    timeline: BTreeMap<u64, WindowCounts>,
    latency: LatencyHistogram,
}

impl Shard {
    fn new() -> Self {
        Self {
            count: 0,
            errors: 0,
            dropped: 0,
            checks_passed: 0,
            checks_failed: 0,
            errors_by_kind: HashMap::new(),
            timeline: BTreeMap::new(),
            latency: LatencyHistogram::default(),
        }
    }
}

/// Thread-safe outcome aggregator.
///
/// Recording takes a single shard lock; shards are picked round-robin so concurrent workers
/// rarely contend. A sample is applied to exactly one shard while that shard is locked, which is
/// what lets [`Aggregator::snapshot`] produce a consistent copy without a run-wide lock.
#[derive(Debug)]
pub struct Aggregator {
    shards: Box<[Mutex<Shard>]>,
    next_shard: AtomicUsize,
}

impl Default for Aggregator {
    fn default() -> Self {
        let parallelism = std::thread::available_parallelism().map_or(4, |n| n.get());
        Self::with_shards(parallelism.saturating_mul(2))
    }
}

impl Aggregator {
    #[must_use]
    pub fn with_shards(shards: usize) -> Self {
        let shards = (0..shards.max(1))
            .map(|_| Mutex::new(Shard::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            shards,
            next_shard: AtomicUsize::new(0),
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    fn shard(&self) -> &Mutex<Shard> {
        let idx = self.next_shard.fetch_add(1, Ordering::Relaxed) % self.shards.len();
        &self.shards[idx]
    }

    pub fn record(&self, sample: Sample<'_>) {
        let second = sample.offset.as_secs();
        let mut shard = self.shard().lock();

        shard.count = shard.count.saturating_add(1);
        if sample.failed {
            shard.errors = shard.errors.saturating_add(1);
        }
        if let Some(kind) = sample.error_kind {
            match shard.errors_by_kind.get_mut(kind) {
                Some(cur) => *cur = cur.saturating_add(1),
                None => {
                    shard.errors_by_kind.insert(kind.to_string(), 1);
                }
            }
        }
        match sample.check {
            Some(true) => shard.checks_passed = shard.checks_passed.saturating_add(1),
            Some(false) => shard.checks_failed = shard.checks_failed.saturating_add(1),
            None => {}
        }
        shard.latency.record(sample.latency);

        let window = shard.timeline.entry(second).or_default();
        window.started = window.started.saturating_add(1);
        if sample.failed {
            window.failed = window.failed.saturating_add(1);
        }
    }

    /// Records a scheduling drop: a request that was due but found no free VU.
    pub fn record_drop(&self, offset: Duration) {
        let mut shard = self.shard().lock();
        shard.dropped = shard.dropped.saturating_add(1);
        let window = shard.timeline.entry(offset.as_secs()).or_default();
        window.dropped = window.dropped.saturating_add(1);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut out = MetricsSnapshot::empty();

        for shard in self.shards.iter() {
            let shard = shard.lock();

            out.count = out.count.saturating_add(shard.count);
            out.error_count = out.error_count.saturating_add(shard.errors);
            out.dropped = out.dropped.saturating_add(shard.dropped);
            out.checks_passed = out.checks_passed.saturating_add(shard.checks_passed);
            out.checks_failed = out.checks_failed.saturating_add(shard.checks_failed);

            for (kind, v) in &shard.errors_by_kind {
                let cur = out.errors_by_kind.entry(kind.clone()).or_insert(0);
                *cur = cur.saturating_add(*v);
            }
            for (second, w) in &shard.timeline {
                out.timeline.entry(*second).or_default().merge(w);
            }

            out.latency.merge(&shard.latency);
        }

        out
    }
}
