use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use super::error::{Error, Result};
use super::outcome::{OutcomeStatus, RequestOutcome};
use super::signal::Signal;
use super::transport::{RequestProducer, Transport};

/// States of a VU that is still owned by the pool. Retirement removes an idle VU from the idle
/// list and drops it under the same lock, so there is no observable retiring state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum VuState {
    Idle,
    Busy,
}

/// Execution slot. Owned either by the pool's idle list or by exactly one in-flight worker.
#[derive(Debug)]
pub struct VirtualUser {
    id: u64,
    iterations: u64,
    idle_since: Instant,
    state: VuState,
}

impl VirtualUser {
    fn new(id: u64) -> Self {
        Self {
            id,
            iterations: 0,
            idle_since: Instant::now(),
            state: VuState::Idle,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    pub fn state(&self) -> VuState {
        self.state
    }
}

/// Elastic set of virtual users bounded by `max`.
///
/// `busy` is the admission counter: a slot is reserved with a CAS before a VU is handed out, so
/// the number of concurrently busy VUs can never exceed `max` regardless of how many tasks race
/// on `acquire`.
#[derive(Debug)]
pub struct WorkerPool {
    pre_allocated: u64,
    max: u64,
    idle_grace: Duration,

    busy: AtomicU64,
    peak_busy: AtomicU64,
    created: AtomicU64,
    retired: AtomicU64,
    next_id: AtomicU64,

    /// Most recently released at the back.
    idle: Mutex<VecDeque<VirtualUser>>,
}

impl WorkerPool {
    pub fn new(pre_allocated: u64, max: u64, idle_grace: Duration) -> Result<Self> {
        if pre_allocated > max {
            return Err(Error::InvalidPreAllocatedVus {
                pre_allocated,
                max,
            });
        }

        let idle = (1..=pre_allocated).map(VirtualUser::new).collect::<VecDeque<_>>();

        Ok(Self {
            pre_allocated,
            max,
            idle_grace,
            busy: AtomicU64::new(0),
            peak_busy: AtomicU64::new(0),
            created: AtomicU64::new(pre_allocated),
            retired: AtomicU64::new(0),
            next_id: AtomicU64::new(pre_allocated.saturating_add(1)),
            idle: Mutex::new(idle),
        })
    }

    pub fn max(&self) -> u64 {
        self.max
    }

    pub fn pre_allocated(&self) -> u64 {
        self.pre_allocated
    }

    pub fn busy(&self) -> u64 {
        self.busy.load(Ordering::Acquire)
    }

    pub fn peak_busy(&self) -> u64 {
        self.peak_busy.load(Ordering::Relaxed)
    }

    pub fn idle(&self) -> u64 {
        self.idle.lock().len() as u64
    }

    pub fn created(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    pub fn retired(&self) -> u64 {
        self.retired.load(Ordering::Relaxed)
    }

    /// Hands out an idle VU, creating one if needed. Never waits: `None` means the pool is
    /// saturated.
    pub fn acquire(&self) -> Option<VirtualUser> {
        let mut cur = self.busy.load(Ordering::Acquire);
        loop {
            if cur >= self.max {
                return None;
            }
            match self.busy.compare_exchange_weak(
                cur,
                cur.saturating_add(1),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(observed) => cur = observed,
            }
        }
        self.bump_peak(cur.saturating_add(1));

        let reused = self.idle.lock().pop_back();
        let mut vu = reused.unwrap_or_else(|| {
            self.created.fetch_add(1, Ordering::Relaxed);
            VirtualUser::new(self.next_id.fetch_add(1, Ordering::Relaxed))
        });
        vu.state = VuState::Busy;
        Some(vu)
    }

    pub fn release(&self, mut vu: VirtualUser) {
        vu.state = VuState::Idle;
        vu.idle_since = Instant::now();

        // Idle list first, so a racing `acquire` reuses this VU instead of creating another.
        self.idle.lock().push_back(vu);
        self.busy.fetch_sub(1, Ordering::AcqRel);
    }

    /// Frees the busy slot of a VU that was lost with its worker.
    pub(crate) fn discard(&self) {
        self.retired.fetch_add(1, Ordering::Relaxed);
        self.busy.fetch_sub(1, Ordering::AcqRel);
    }

    /// Retires VUs that have been idle longer than the grace period, oldest first, while the
    /// pool holds more than `pre_allocated` VUs.
    pub fn retire_idle(&self, now: Instant) -> u64 {
        let mut idle = self.idle.lock();
        let mut retired = 0u64;

        while let Some(oldest) = idle.front() {
            let live = (idle.len() as u64).saturating_add(self.busy());
            if live <= self.pre_allocated
                || now.saturating_duration_since(oldest.idle_since) < self.idle_grace
            {
                break;
            }
            if let Some(vu) = idle.pop_front() {
                tracing::trace!(vu = vu.id, iterations = vu.iterations, "retiring idle vu");
                retired = retired.saturating_add(1);
            }
        }
        drop(idle);

        if retired != 0 {
            self.retired.fetch_add(retired, Ordering::Relaxed);
        }
        retired
    }

    /// Runs exactly one request on `vu`. Always yields an outcome; once `drain_expired` fires the
    /// request is abandoned and reported as a timeout with the time it had been running.
    pub async fn run_once<P, T>(
        &self,
        vu: &mut VirtualUser,
        producer: &P,
        transport: &T,
        deadline: Duration,
        drain_expired: &Signal,
    ) -> RequestOutcome
    where
        P: RequestProducer + ?Sized,
        T: Transport,
    {
        let start_time = Instant::now();

        let status = match std::panic::catch_unwind(AssertUnwindSafe(|| producer.produce())) {
            Ok(spec) => {
                tokio::select! {
                    biased;
                    _ = drain_expired.wait() => OutcomeStatus::Timeout,
                    res = tokio::time::timeout(deadline, transport.execute(spec)) => match res {
                        Ok(Ok(res)) => OutcomeStatus::Response { status: res.status },
                        Ok(Err(err)) => OutcomeStatus::TransportError { kind: err.kind },
                        Err(_) => OutcomeStatus::Timeout,
                    },
                }
            }
            Err(_) => OutcomeStatus::TransportError {
                kind: "producer_panic".to_string(),
            },
        };

        vu.iterations = vu.iterations.saturating_add(1);
        RequestOutcome {
            vu_id: vu.id,
            start_time,
            duration: start_time.elapsed(),
            status,
        }
    }

    fn bump_peak(&self, busy: u64) {
        let mut peak = self.peak_busy.load(Ordering::Relaxed);
        while busy > peak {
            match self.peak_busy.compare_exchange_weak(
                peak,
                busy,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => peak = observed,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::transport::{RequestSpec, TransportError, TransportResponse};
    use std::future::Future;
    use std::sync::Arc;

    fn pool(pre: u64, max: u64) -> WorkerPool {
        match WorkerPool::new(pre, max, Duration::from_secs(1)) {
            Ok(p) => p,
            Err(err) => panic!("unexpected error: {err}"),
        }
    }

    struct Delayed {
        delay: Duration,
        status: u16,
    }

    impl Transport for Delayed {
        fn execute(
            &self,
            _spec: RequestSpec,
        ) -> impl Future<Output = std::result::Result<TransportResponse, TransportError>> + Send {
            let delay = self.delay;
            let status = self.status;
            async move {
                tokio::time::sleep(delay).await;
                Ok(TransportResponse { status })
            }
        }
    }

    fn producer() -> RequestSpec {
        RequestSpec::get("http://localhost/")
    }

    #[test]
    fn rejects_pre_allocated_above_max() {
        assert!(matches!(
            WorkerPool::new(5, 4, Duration::ZERO),
            Err(Error::InvalidPreAllocatedVus { .. })
        ));
    }

    #[test]
    fn acquire_never_exceeds_max() {
        let p = pool(1, 3);
        let held: Vec<_> = (0..3).filter_map(|_| p.acquire()).collect();
        assert_eq!(held.len(), 3);
        assert!(p.acquire().is_none());
        assert_eq!(p.busy(), 3);
        assert_eq!(p.created(), 3);

        for vu in held {
            p.release(vu);
        }
        assert_eq!(p.busy(), 0);
        assert_eq!(p.idle(), 3);
        assert_eq!(p.peak_busy(), 3);
    }

    #[test]
    fn reuses_idle_vus_before_creating() {
        let p = pool(2, 10);
        let a = p.acquire();
        let b = p.acquire();
        assert_eq!(p.created(), 2);
        assert!(matches!(a.as_ref().map(VirtualUser::state), Some(VuState::Busy)));

        for vu in [a, b].into_iter().flatten() {
            p.release(vu);
        }
        let _c = p.acquire();
        assert_eq!(p.created(), 2);
    }

    #[test]
    fn concurrent_acquire_respects_bound() {
        let p = Arc::new(pool(0, 8));
        std::thread::scope(|s| {
            for _ in 0..8 {
                let p = p.clone();
                s.spawn(move || {
                    for _ in 0..5_000 {
                        if let Some(vu) = p.acquire() {
                            assert!(p.busy() <= p.max());
                            p.release(vu);
                        }
                    }
                });
            }
        });

        assert!(p.peak_busy() <= 8);
        assert_eq!(p.busy(), 0);
        assert!(p.created() <= 8);
    }

    #[tokio::test(start_paused = true)]
    async fn retires_idle_vus_above_pre_allocated_after_grace() {
        let p = pool(2, 10);
        let held: Vec<_> = (0..6).filter_map(|_| p.acquire()).collect();
        for vu in held {
            p.release(vu);
        }
        assert_eq!(p.idle(), 6);

        assert_eq!(p.retire_idle(Instant::now()), 0);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(p.retire_idle(Instant::now()), 4);
        assert_eq!(p.idle(), 2);
        assert_eq!(p.retired(), 4);

        // Retired VUs are gone: the survivors are the most recently released, and new demand
        // creates fresh ids.
        let ids: Vec<_> = (0..3).filter_map(|_| p.acquire()).map(|vu| vu.id()).collect();
        assert_eq!(&ids[..2], &[6, 5]);
        assert_eq!(ids[2], 7);
        assert_eq!(p.created(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn run_once_reports_response() {
        let p = pool(1, 1);
        let mut vu = match p.acquire() {
            Some(vu) => vu,
            None => panic!("expected a vu"),
        };
        let transport = Delayed {
            delay: Duration::from_millis(20),
            status: 201,
        };

        let outcome = p
            .run_once(&mut vu, &producer, &transport, Duration::from_secs(1), &Signal::new())
            .await;

        assert_eq!(outcome.status, OutcomeStatus::Response { status: 201 });
        assert!(outcome.duration >= Duration::from_millis(20));
        assert!(outcome.duration < Duration::from_millis(25));
        assert_eq!(vu.iterations(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_once_times_out() {
        let p = pool(1, 1);
        let mut vu = match p.acquire() {
            Some(vu) => vu,
            None => panic!("expected a vu"),
        };
        let transport = Delayed {
            delay: Duration::from_secs(60),
            status: 200,
        };

        let outcome = p
            .run_once(&mut vu, &producer, &transport, Duration::from_millis(250), &Signal::new())
            .await;

        assert_eq!(outcome.status, OutcomeStatus::Timeout);
        assert!(outcome.duration >= Duration::from_millis(250));
        assert!(outcome.duration < Duration::from_millis(255));
    }

    #[tokio::test(start_paused = true)]
    async fn drain_expiry_turns_in_flight_request_into_timeout() {
        let p = Arc::new(pool(1, 1));
        let drain_expired = Arc::new(Signal::new());

        let task = {
            let p = p.clone();
            let drain_expired = drain_expired.clone();
            tokio::spawn(async move {
                let Some(mut vu) = p.acquire() else {
                    panic!("expected a vu");
                };
                let transport = Delayed {
                    delay: Duration::from_secs(60),
                    status: 200,
                };
                p.run_once(
                    &mut vu,
                    &producer,
                    &transport,
                    Duration::from_secs(30),
                    &drain_expired,
                )
                .await
            })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        drain_expired.fire();

        let outcome = match task.await {
            Ok(o) => o,
            Err(err) => panic!("join error: {err}"),
        };
        assert_eq!(outcome.status, OutcomeStatus::Timeout);
        assert!(outcome.duration >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn producer_panics_become_outcomes() {
        let p = pool(1, 1);
        let Some(mut vu) = p.acquire() else {
            panic!("expected a vu");
        };
        let transport = Delayed {
            delay: Duration::ZERO,
            status: 200,
        };
        let bad = || -> RequestSpec { panic!("boom") };

        let outcome = p
            .run_once(&mut vu, &bad, &transport, Duration::from_secs(1), &Signal::new())
            .await;
        assert_eq!(
            outcome.status,
            OutcomeStatus::TransportError {
                kind: "producer_panic".to_string()
            }
        );
    }
}
