use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use surge_metrics::{Aggregator, MetricsSnapshot, RateSeries};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};

use super::config::{RunConfig, RunOptions, ScenarioConfig, ScenarioExecutor};
use super::error::{Error, Result};
use super::pool::WorkerPool;
use super::progress::{
    LiveMetrics, ProgressFn, ProgressUpdate, RunTotals, ScenarioProgress, StageProgress,
    VuProgress, WindowActivity,
};
use super::rate::RateFn;
use super::request_metrics::OutcomeRecorder;
use super::scheduler::{ArrivalScheduler, Dispatch, log_worker_exit};
use super::signal::Signal;
use super::thresholds::{
    EvalContext, ThresholdExpr, ThresholdSet, ThresholdViolation, compile_thresholds,
    evaluate_thresholds,
};
use super::ticker::DEFAULT_TICK;
use super::transport::{RequestProducer, Transport};

/// How long requests get to report after the drain timeout before their tasks are aborted.
pub const ABORT_GRACE: Duration = Duration::from_secs(1);
pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum RunState {
    Pending,
    Running,
    Draining,
    Completed,
}

/// Run-wide settings shared by every scenario.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub thresholds: Vec<ThresholdExpr>,
    pub drops_count_as_failed: bool,
    pub tick: Duration,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            thresholds: Vec::new(),
            drops_count_as_failed: false,
            tick: DEFAULT_TICK,
        }
    }
}

impl RunSettings {
    /// Compiles the thresholds; any syntax or metric error is reported here, before a run.
    pub fn new(thresholds: &[ThresholdSet], drops_count_as_failed: bool) -> Result<Self> {
        Ok(Self {
            thresholds: compile_thresholds(thresholds)?,
            drops_count_as_failed,
            ..Self::default()
        })
    }

    /// Settings for a run of `opts`; a CLI override in `cfg` wins over the file.
    pub fn from_options(opts: &RunOptions, cfg: &RunConfig) -> Result<Self> {
        Self::new(
            &opts.thresholds,
            cfg.drops_count_as_failed.unwrap_or(opts.drops_count_as_failed),
        )
    }
}

#[derive(Debug, Clone)]
pub struct RunVerdict {
    pub scenario: String,
    pub passed: bool,
    pub failed_thresholds: Vec<ThresholdViolation>,
    pub snapshot: MetricsSnapshot,
    /// Time spent issuing requests (excludes draining).
    pub elapsed: Duration,
    pub issued: u64,
    pub dropped: u64,
    pub peak_busy_vus: u64,
    pub vus_created: u64,
}

impl RunVerdict {
    pub fn checks_failed(&self) -> bool {
        self.snapshot.checks_failed > 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub verdicts: Vec<RunVerdict>,
}

impl RunReport {
    pub fn thresholds_failed(&self) -> bool {
        self.verdicts.iter().any(|v| !v.passed)
    }

    pub fn checks_failed(&self) -> bool {
        self.verdicts.iter().any(RunVerdict::checks_failed)
    }

    pub fn passed(&self) -> bool {
        !self.thresholds_failed() && !self.checks_failed()
    }
}

/// Drives one scenario through `Pending -> Running -> Draining -> Completed`.
pub struct RunController<P: ?Sized, T> {
    config: ScenarioConfig,
    producer: Arc<P>,
    transport: Arc<T>,
    settings: Arc<RunSettings>,
    pool: Arc<WorkerPool>,
    aggregator: Arc<Aggregator>,
    interrupt: Arc<Signal>,
    state: Mutex<RunState>,
}

impl<P, T> RunController<P, T>
where
    P: RequestProducer + ?Sized,
    T: Transport,
{
    /// Validates the scenario and pre-allocates its VUs.
    pub fn new(
        config: ScenarioConfig,
        producer: Arc<P>,
        transport: Arc<T>,
        settings: Arc<RunSettings>,
    ) -> Result<Self> {
        config.validate()?;
        let pool = WorkerPool::new(
            config.executor.pre_allocated_vus(),
            config.executor.max_vus(),
            config.idle_vu_grace,
        )?;

        Ok(Self {
            config,
            producer,
            transport,
            settings,
            pool: Arc::new(pool),
            aggregator: Arc::new(Aggregator::default()),
            interrupt: Arc::new(Signal::new()),
            state: Mutex::new(RunState::Pending),
        })
    }

    /// Shares an external signal that ends issuance early (e.g. on Ctrl-C).
    #[must_use]
    pub fn with_interrupt(mut self, interrupt: Arc<Signal>) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    pub fn state(&self) -> RunState {
        *self.state.lock()
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    pub fn aggregator(&self) -> &Arc<Aggregator> {
        &self.aggregator
    }

    pub fn interrupt(&self) -> &Arc<Signal> {
        &self.interrupt
    }

    fn set_state(&self, next: RunState) {
        let mut state = self.state.lock();
        tracing::debug!(scenario = %self.config.name, from = %*state, to = %next, "run state");
        *state = next;
    }

    pub async fn run(&self, progress: Option<ProgressFn>) -> Result<RunVerdict> {
        {
            let mut state = self.state.lock();
            if *state != RunState::Pending {
                return Err(Error::AlreadyStarted(self.config.name.clone()));
            }
            *state = RunState::Running;
        }

        let name = self.config.name.as_str();
        let rate_fn = self.config.executor.rate_fn();
        let total = rate_fn.total_duration();
        let started = Instant::now();

        tracing::info!(
            scenario = name,
            executor = %self.config.executor.kind(),
            duration = ?total,
            pre_allocated_vus = self.pool.pre_allocated(),
            max_vus = self.pool.max(),
            "scenario started"
        );

        let drain_expired = Arc::new(Signal::new());
        let dispatch = Arc::new(Dispatch {
            pool: self.pool.clone(),
            recorder: Arc::new(OutcomeRecorder::new(
                self.aggregator.clone(),
                started,
                self.config.expect_status,
            )),
            transport: self.transport.clone(),
            drain_expired: drain_expired.clone(),
            request_timeout: self.config.request_timeout,
            producer: self.producer.clone(),
        });

        let scheduler =
            ArrivalScheduler::new(self.settings.tick).start(rate_fn.clone(), started, dispatch);
        let progress_handle = progress.map(|progress| {
            spawn_progress(
                progress,
                self.config.name.clone(),
                self.config.executor.clone(),
                rate_fn,
                self.aggregator.clone(),
                self.pool.clone(),
                started,
            )
        });

        tokio::select! {
            _ = tokio::time::sleep_until(started + total) => {}
            _ = self.interrupt.wait() => {
                tracing::warn!(scenario = name, "interrupted; stopping issuance early");
            }
        }
        scheduler.stop();
        let stats = scheduler.stats().clone();
        let mut inflight = scheduler.join().await?;
        let elapsed = started.elapsed().min(total);

        self.set_state(RunState::Draining);
        self.drain(&mut inflight, &drain_expired).await;

        if let Some(h) = progress_handle {
            h.abort();
            let _ = h.await;
        }

        let snapshot = self.aggregator.snapshot();
        let failed_thresholds = evaluate_thresholds(
            &snapshot,
            &self.settings.thresholds,
            EvalContext {
                elapsed,
                drops_count_as_failed: self.settings.drops_count_as_failed,
            },
        );
        for v in &failed_thresholds {
            tracing::info!(
                scenario = name,
                threshold = %v.expr,
                observed = ?v.observed,
                "threshold failed"
            );
        }

        self.set_state(RunState::Completed);
        tracing::info!(
            scenario = name,
            requests = snapshot.count,
            errors = snapshot.error_count,
            dropped = snapshot.dropped,
            "scenario completed"
        );

        Ok(RunVerdict {
            scenario: self.config.name.clone(),
            passed: failed_thresholds.is_empty(),
            failed_thresholds,
            snapshot,
            elapsed,
            issued: stats.issued(),
            dropped: stats.dropped(),
            peak_busy_vus: self.pool.peak_busy(),
            vus_created: self.pool.created(),
        })
    }

    /// Waits up to `graceful_stop` for in-flight requests, then forces the rest to time out.
    /// Workers that still haven't reported after a short grace are aborted; their guards record
    /// the timeout.
    async fn drain(&self, inflight: &mut JoinSet<()>, drain_expired: &Signal) {
        let name = self.config.name.as_str();

        let graceful = tokio::time::timeout(self.config.graceful_stop, join_all(inflight)).await;
        if graceful.is_ok() {
            return;
        }

        tracing::warn!(
            scenario = name,
            in_flight = inflight.len(),
            graceful_stop = ?self.config.graceful_stop,
            "graceful stop timed out; forcing in-flight requests to time out"
        );
        drain_expired.fire();

        if tokio::time::timeout(ABORT_GRACE, join_all(inflight))
            .await
            .is_err()
        {
            tracing::warn!(scenario = name, in_flight = inflight.len(), "aborting workers");
            inflight.abort_all();
            join_all(inflight).await;
        }
    }
}

async fn join_all(inflight: &mut JoinSet<()>) {
    while let Some(res) = inflight.join_next().await {
        log_worker_exit(res);
    }
}

fn spawn_progress(
    progress: ProgressFn,
    scenario: String,
    executor: ScenarioExecutor,
    rate_fn: RateFn,
    aggregator: Arc<Aggregator>,
    pool: Arc<WorkerPool>,
    started: Instant,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(started + PROGRESS_INTERVAL, PROGRESS_INTERVAL);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut tick_id: u64 = 0;
        let mut last_at = started;
        let mut last = aggregator.snapshot();
        let mut throughput = RateSeries::default();

        loop {
            interval.tick().await;

            tick_id = tick_id.saturating_add(1);
            let now = Instant::now();
            let window = now.saturating_duration_since(last_at);
            last_at = now;
            let elapsed = now.saturating_duration_since(started);

            let snap = aggregator.snapshot();
            let mut activity = WindowActivity::between(&last, &snap);
            activity.rate = throughput.observe(activity.completed, window);

            let metrics = LiveMetrics {
                window: activity,
                totals: RunTotals::from(&snap),
                throughput,
                latency: snap.latency_summary(),
            };

            let progress_val = match (&executor, &rate_fn) {
                (
                    ScenarioExecutor::RampingArrivalRate { time_unit, .. },
                    RateFn::Ramping { schedule, .. },
                ) => {
                    let stage = schedule.stage_snapshot_at(elapsed).map(|st| StageProgress {
                        stage: st.index + 1,
                        stages: st.count,
                        stage_elapsed: st.stage_elapsed,
                        stage_remaining: st.stage_remaining,
                        start_target: st.start_target,
                        end_target: st.end_target,
                        current_target: st.current_target,
                    });
                    ScenarioProgress::RampingArrivalRate {
                        time_unit: *time_unit,
                        total_duration: schedule.total_duration(),
                        stage,
                    }
                }
                _ => ScenarioProgress::ConstantArrivalRate {
                    rate: match &executor {
                        ScenarioExecutor::ConstantArrivalRate { rate, .. } => *rate,
                        ScenarioExecutor::RampingArrivalRate { start_rate, .. } => *start_rate,
                    },
                    time_unit: rate_fn.time_unit(),
                    duration: rate_fn.total_duration(),
                },
            };

            (progress)(ProgressUpdate {
                tick: tick_id,
                elapsed,
                scenario: scenario.clone(),
                target_rate: rate_fn.per_second(elapsed.min(rate_fn.total_duration())),
                metrics,
                vus: VuProgress {
                    busy: pool.busy(),
                    idle: pool.idle(),
                    peak_busy: pool.peak_busy(),
                    max: pool.max(),
                },
                progress: progress_val,
            });

            last = snap;
        }
    })
}

/// One scenario of a run together with its request source.
pub struct ScenarioRun<P: ?Sized> {
    pub config: ScenarioConfig,
    pub producer: Arc<P>,
}

/// Runs every scenario concurrently. All scenarios are validated before any of them starts.
pub async fn run_scenarios<P, T>(
    scenarios: Vec<ScenarioRun<P>>,
    transport: Arc<T>,
    settings: RunSettings,
    progress: Option<ProgressFn>,
    interrupt: Option<Arc<Signal>>,
) -> Result<RunReport>
where
    P: RequestProducer + ?Sized,
    T: Transport,
{
    if scenarios.is_empty() {
        return Err(Error::NoScenarios);
    }

    let settings = Arc::new(settings);
    let interrupt = interrupt.unwrap_or_default();

    let controllers = scenarios
        .into_iter()
        .map(|s| {
            RunController::new(s.config, s.producer, transport.clone(), settings.clone())
                .map(|c| Arc::new(c.with_interrupt(interrupt.clone())))
        })
        .collect::<Result<Vec<_>>>()?;

    let handles: Vec<_> = controllers
        .into_iter()
        .map(|c| {
            let progress = progress.clone();
            tokio::spawn(async move { c.run(progress).await })
        })
        .collect();

    Ok(RunReport {
        verdicts: join_verdicts(handles).await?,
    })
}

/// Waits for every scenario, then reports the first failure, if any.
async fn join_verdicts<V>(handles: Vec<JoinHandle<Result<V>>>) -> Result<Vec<V>> {
    let mut verdicts = Vec::with_capacity(handles.len());
    let mut first_err = None;
    for h in handles {
        match h.await.map_err(Error::from).and_then(|res| res) {
            Ok(verdict) => verdicts.push(verdict),
            Err(err) => {
                tracing::error!(error = %err, "scenario failed");
                first_err.get_or_insert(err);
            }
        }
    }

    match first_err {
        Some(err) => Err(err),
        None => Ok(verdicts),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::thresholds::ThresholdMetric;

    #[test]
    fn cli_drop_policy_overrides_file() {
        let opts = RunOptions {
            drops_count_as_failed: true,
            thresholds: vec![ThresholdSet {
                metric: "http_req_failed".to_string(),
                expressions: vec!["rate<0.01".to_string()],
            }],
            ..RunOptions::default()
        };

        let from_file = RunSettings::from_options(&opts, &RunConfig::default())
            .unwrap_or_else(|e| panic!("settings: {e}"));
        assert!(from_file.drops_count_as_failed);
        assert_eq!(from_file.thresholds.len(), 1);
        assert_eq!(from_file.thresholds[0].metric, ThresholdMetric::HttpReqFailed);

        let cfg = RunConfig {
            drops_count_as_failed: Some(false),
            ..RunConfig::default()
        };
        let overridden =
            RunSettings::from_options(&opts, &cfg).unwrap_or_else(|e| panic!("settings: {e}"));
        assert!(!overridden.drops_count_as_failed);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_scenario_still_waits_for_the_others() {
        let finished = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let failing = tokio::spawn(async { Err(Error::AlreadyStarted("a".to_string())) });
        let slow = {
            let finished = finished.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                finished.store(true, std::sync::atomic::Ordering::Release);
                Ok(1u32)
            })
        };

        let res = join_verdicts(vec![failing, slow]).await;
        assert!(matches!(res, Err(Error::AlreadyStarted(name)) if name == "a"));
        assert!(finished.load(std::sync::atomic::Ordering::Acquire));
    }

    #[test]
    fn report_gates_combine_all_verdicts() {
        let verdict = |passed: bool, checks_failed: u64| {
            let mut snapshot = Aggregator::default().snapshot();
            snapshot.checks_failed = checks_failed;
            RunVerdict {
                scenario: "s".to_string(),
                passed,
                failed_thresholds: Vec::new(),
                snapshot,
                elapsed: Duration::ZERO,
                issued: 0,
                dropped: 0,
                peak_busy_vus: 0,
                vus_created: 0,
            }
        };

        let report = RunReport {
            verdicts: vec![verdict(true, 0), verdict(false, 2)],
        };
        assert!(report.thresholds_failed());
        assert!(report.checks_failed());
        assert!(!report.passed());
    }
}
