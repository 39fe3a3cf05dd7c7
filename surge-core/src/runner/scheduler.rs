use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};

use super::error::Result;
use super::outcome::{OutcomeStatus, RequestOutcome};
use super::pool::{VirtualUser, WorkerPool};
use super::rate::RateFn;
use super::request_metrics::OutcomeRecorder;
use super::signal::Signal;
use super::ticker::DueAccumulator;
use super::transport::{RequestProducer, Transport};

/// Everything a dispatched request needs, shared by all workers of a scenario.
pub struct Dispatch<P: ?Sized, T> {
    pub pool: Arc<WorkerPool>,
    pub recorder: Arc<OutcomeRecorder>,
    pub transport: Arc<T>,
    /// Fired when the drain timeout expires; in-flight requests then report a timeout.
    pub drain_expired: Arc<Signal>,
    pub request_timeout: Duration,
    pub producer: Arc<P>,
}

#[derive(Debug, Default)]
pub struct SchedulerStats {
    issued: AtomicU64,
    dropped: AtomicU64,
    ticks: AtomicU64,
}

impl SchedulerStats {
    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Scheduling decisions so far (issued + dropped).
    pub fn scheduled(&self) -> u64 {
        self.issued().saturating_add(self.dropped())
    }
}

/// Converts a rate function into request dispatches on a fixed tick.
///
/// Issuance never waits on a VU: when the pool is saturated the request is recorded as dropped
/// and the schedule moves on, so slow responses can't bend the arrival curve.
#[derive(Debug, Clone, Copy)]
pub struct ArrivalScheduler {
    tick: Duration,
}

impl ArrivalScheduler {
    pub fn new(tick: Duration) -> Self {
        Self {
            tick: tick.max(Duration::from_millis(1)),
        }
    }

    pub fn start<P, T>(
        self,
        rate_fn: RateFn,
        started: Instant,
        dispatch: Arc<Dispatch<P, T>>,
    ) -> SchedulerHandle
    where
        P: RequestProducer + ?Sized,
        T: Transport,
    {
        let stop = Arc::new(Signal::new());
        let stats = Arc::new(SchedulerStats::default());

        let task = tokio::spawn(tick_loop(
            self.tick,
            rate_fn,
            started,
            dispatch,
            stop.clone(),
            stats.clone(),
        ));

        SchedulerHandle { stop, stats, task }
    }
}

pub struct SchedulerHandle {
    stop: Arc<Signal>,
    stats: Arc<SchedulerStats>,
    task: JoinHandle<JoinSet<()>>,
}

impl SchedulerHandle {
    /// Stops issuing new requests. In-flight requests keep running.
    pub fn stop(&self) {
        self.stop.fire();
    }

    pub fn stats(&self) -> &Arc<SchedulerStats> {
        &self.stats
    }

    /// Waits for the tick loop to exit and hands back the requests still in flight.
    pub async fn join(self) -> Result<JoinSet<()>> {
        Ok(self.task.await?)
    }
}

async fn tick_loop<P, T>(
    tick: Duration,
    rate_fn: RateFn,
    started: Instant,
    dispatch: Arc<Dispatch<P, T>>,
    stop: Arc<Signal>,
    stats: Arc<SchedulerStats>,
) -> JoinSet<()>
where
    P: RequestProducer + ?Sized,
    T: Transport,
{
    let total = rate_fn.total_duration();
    let mut interval = tokio::time::interval_at(started + tick, tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut acc = DueAccumulator::default();
    let mut last = Duration::ZERO;
    let mut inflight = JoinSet::new();

    tracing::debug!(total = ?total, tick = ?tick, "arrival scheduler started");

    loop {
        let stopped = tokio::select! {
            biased;
            _ = stop.wait() => true,
            _ = interval.tick() => false,
        };

        let now = Instant::now();
        let elapsed = now.saturating_duration_since(started).min(total);
        // An early stop abandons the rest of the curve; at the end of the run the final partial
        // tick is still accounted for.
        if stopped && elapsed < total {
            break;
        }

        let dt = elapsed.saturating_sub(last);
        // Midpoint rate keeps linear ramps exact within a tick.
        let due = acc.advance(rate_fn.per_second(last + dt / 2), dt);
        last = elapsed;
        stats.ticks.fetch_add(1, Ordering::Relaxed);

        for _ in 0..due {
            match dispatch.pool.acquire() {
                Some(vu) => {
                    stats.issued.fetch_add(1, Ordering::Relaxed);
                    inflight.spawn(run_worker(dispatch.clone(), vu));
                }
                None => {
                    stats.dropped.fetch_add(1, Ordering::Relaxed);
                    dispatch.recorder.record_drop(now);
                }
            }
        }

        dispatch.pool.retire_idle(now);

        while let Some(res) = inflight.try_join_next() {
            log_worker_exit(res);
        }

        if elapsed >= total {
            break;
        }
    }

    tracing::debug!(
        issued = stats.issued(),
        dropped = stats.dropped(),
        in_flight = inflight.len(),
        "arrival scheduler stopped"
    );
    inflight
}

pub(crate) fn log_worker_exit(res: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(err) = res
        && err.is_panic()
    {
        tracing::warn!(error = %err, "worker task panicked");
    }
}

/// The guard is created before the task is first polled, so even a worker aborted before it
/// ever ran reports an outcome.
fn run_worker<P, T>(
    dispatch: Arc<Dispatch<P, T>>,
    mut vu: VirtualUser,
) -> impl Future<Output = ()> + Send + 'static
where
    P: RequestProducer + ?Sized,
    T: Transport,
{
    let guard = InFlightGuard {
        pool: dispatch.pool.clone(),
        recorder: dispatch.recorder.clone(),
        vu_id: vu.id(),
        started: Instant::now(),
        armed: true,
    };

    async move {
        let outcome = dispatch
            .pool
            .run_once(
                &mut vu,
                &*dispatch.producer,
                &*dispatch.transport,
                dispatch.request_timeout,
                &dispatch.drain_expired,
            )
            .await;

        dispatch.recorder.record(&outcome);
        guard.disarm();
        dispatch.pool.release(vu);
    }
}

/// Records an outcome and frees the busy slot if a worker is aborted or unwinds before it
/// reports, so every dispatched request yields exactly one outcome. An aborted worker counts as
/// timed out.
struct InFlightGuard {
    pool: Arc<WorkerPool>,
    recorder: Arc<OutcomeRecorder>,
    vu_id: u64,
    started: Instant,
    armed: bool,
}

impl InFlightGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let status = if std::thread::panicking() {
            OutcomeStatus::TransportError {
                kind: "worker_panic".to_string(),
            }
        } else {
            OutcomeStatus::Timeout
        };
        self.recorder.record(&RequestOutcome {
            vu_id: self.vu_id,
            start_time: self.started,
            duration: self.started.elapsed(),
            status,
        });
        self.pool.discard();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::transport::{RequestSpec, TransportError, TransportResponse};
    use surge_metrics::Aggregator;

    struct Sleepy(Duration);

    impl Transport for Sleepy {
        fn execute(
            &self,
            _spec: RequestSpec,
        ) -> impl Future<Output = std::result::Result<TransportResponse, TransportError>> + Send
        {
            let delay = self.0;
            async move {
                tokio::time::sleep(delay).await;
                Ok(TransportResponse { status: 200 })
            }
        }
    }

    fn producer() -> RequestSpec {
        RequestSpec::get("http://localhost/")
    }

    fn dispatch(
        pool: WorkerPool,
        delay: Duration,
        started: Instant,
    ) -> Arc<Dispatch<fn() -> RequestSpec, Sleepy>> {
        Arc::new(Dispatch {
            pool: Arc::new(pool),
            recorder: Arc::new(OutcomeRecorder::new(
                Arc::new(Aggregator::with_shards(4)),
                started,
                None,
            )),
            transport: Arc::new(Sleepy(delay)),
            drain_expired: Arc::new(Signal::new()),
            request_timeout: Duration::from_secs(60),
            producer: Arc::new(producer as fn() -> RequestSpec),
        })
    }

    fn pool(pre: u64, max: u64) -> WorkerPool {
        match WorkerPool::new(pre, max, Duration::from_secs(1)) {
            Ok(p) => p,
            Err(err) => panic!("unexpected error: {err}"),
        }
    }

    async fn drain(mut inflight: JoinSet<()>) {
        while let Some(res) = inflight.join_next().await {
            log_worker_exit(res);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn issues_the_integral_of_a_constant_rate() {
        let started = Instant::now();
        let d = dispatch(pool(5, 50), Duration::from_millis(5), started);
        let rate = RateFn::Constant {
            rate: 200,
            time_unit: Duration::from_secs(1),
            duration: Duration::from_secs(5),
        };

        let handle =
            ArrivalScheduler::new(Duration::from_millis(10)).start(rate, started, d.clone());
        let stats = handle.stats().clone();
        let inflight = match handle.join().await {
            Ok(v) => v,
            Err(err) => panic!("join error: {err}"),
        };
        drain(inflight).await;

        assert!(stats.issued().abs_diff(1000) <= 1, "issued={}", stats.issued());
        assert_eq!(stats.dropped(), 0);

        let snap = d.recorder.aggregator().snapshot();
        assert_eq!(snap.count, stats.issued());
        assert_eq!(d.pool.busy(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn saturation_drops_without_slowing_the_schedule() {
        let started = Instant::now();
        let d = dispatch(pool(2, 10), Duration::from_secs(3600), started);
        let rate = RateFn::Constant {
            rate: 100,
            time_unit: Duration::from_secs(1),
            duration: Duration::from_secs(2),
        };

        let handle =
            ArrivalScheduler::new(Duration::from_millis(10)).start(rate, started, d.clone());
        let stats = handle.stats().clone();
        let mut inflight = match handle.join().await {
            Ok(v) => v,
            Err(err) => panic!("join error: {err}"),
        };

        let ran = Instant::now().duration_since(started);
        assert!(ran >= Duration::from_secs(2) && ran < Duration::from_millis(2_020));
        assert_eq!(stats.issued(), 10);
        assert!(stats.scheduled().abs_diff(200) <= 1);
        assert_eq!(d.pool.peak_busy(), 10);

        // Aborted workers still report, through their guards.
        inflight.abort_all();
        drain(inflight).await;

        let snap = d.recorder.aggregator().snapshot();
        assert_eq!(snap.count + snap.dropped, stats.scheduled());
        assert_eq!(snap.errors_by_kind.get("timeout"), Some(&10));
        assert_eq!(snap.latency().len(), 10);
        assert_eq!(d.pool.busy(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_ends_issuance_early() {
        let started = Instant::now();
        let d = dispatch(pool(1, 100), Duration::from_millis(1), started);
        let rate = RateFn::Constant {
            rate: 100,
            time_unit: Duration::from_secs(1),
            duration: Duration::from_secs(60),
        };

        let handle =
            ArrivalScheduler::new(Duration::from_millis(10)).start(rate, started, d.clone());
        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.stop();

        let stats = handle.stats().clone();
        let inflight = match handle.join().await {
            Ok(v) => v,
            Err(err) => panic!("join error: {err}"),
        };
        drain(inflight).await;

        assert!(stats.issued() <= 101, "issued={}", stats.issued());
        assert!(stats.issued() >= 99, "issued={}", stats.issued());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_rate_issues_nothing() {
        let started = Instant::now();
        let d = dispatch(pool(1, 1), Duration::from_millis(1), started);
        let rate = RateFn::Constant {
            rate: 0,
            time_unit: Duration::from_secs(1),
            duration: Duration::from_secs(1),
        };

        let handle = ArrivalScheduler::new(Duration::from_millis(10)).start(rate, started, d);
        let stats = handle.stats().clone();
        let inflight = match handle.join().await {
            Ok(v) => v,
            Err(err) => panic!("join error: {err}"),
        };

        assert!(inflight.is_empty());
        assert_eq!(stats.scheduled(), 0);
        assert!(stats.ticks() >= 100);
    }
}
