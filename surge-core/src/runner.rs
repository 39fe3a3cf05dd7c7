mod config;
mod error;
mod outcome;
mod pool;
mod progress;
mod rate;
mod request_metrics;
mod run;
mod schedule;
mod scheduler;
mod signal;
mod thresholds;
mod ticker;
mod transport;

pub use config::{
    DEFAULT_GRACEFUL_STOP, DEFAULT_IDLE_VU_GRACE, DEFAULT_REQUEST_TIMEOUT, DEFAULT_SCENARIO_NAME,
    DEFAULT_TIME_UNIT, RunConfig, RunOptions, ScenarioConfig, ScenarioExecutor,
    ScenarioExecutorKind, ScenarioOptions, Stage, scenarios_from_options,
};
pub use error::{Error, Result};
pub use outcome::{OutcomeStatus, RequestOutcome};
pub use pool::{VirtualUser, VuState, WorkerPool};
pub use progress::{
    LiveMetrics, ProgressFn, ProgressUpdate, RunTotals, ScenarioProgress, StageProgress,
    VuProgress, WindowActivity,
};
pub use rate::RateFn;
pub use request_metrics::OutcomeRecorder;
pub use run::{
    ABORT_GRACE, PROGRESS_INTERVAL, RunController, RunReport, RunSettings, RunState, RunVerdict,
    ScenarioRun, run_scenarios,
};
pub use schedule::{RampingRateSchedule, StageSnapshot};
pub use scheduler::{ArrivalScheduler, Dispatch, SchedulerHandle, SchedulerStats};
pub use signal::Signal;
pub use thresholds::{
    EvalContext, ThresholdAgg, ThresholdExpr, ThresholdMetric, ThresholdOp, ThresholdSet,
    ThresholdViolation, compile_thresholds, evaluate_thresholds, parse_threshold_expr,
};
pub use ticker::{DEFAULT_TICK, DueAccumulator};
pub use transport::{RequestProducer, RequestSpec, Transport, TransportError, TransportResponse};
