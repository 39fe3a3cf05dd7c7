use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use super::error::{Error, Result};
use super::rate::RateFn;
use super::schedule::RampingRateSchedule;
use super::thresholds::ThresholdSet;

pub const DEFAULT_SCENARIO_NAME: &str = "default";
pub const DEFAULT_TIME_UNIT: Duration = Duration::from_secs(1);
pub const DEFAULT_GRACEFUL_STOP: Duration = Duration::from_secs(30);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_IDLE_VU_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    /// Rate per `time_unit` reached at the end of the stage.
    pub target: u64,
}

/// Command-line overrides. These win over anything in the scenario file.
#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    pub rate: Option<u64>,
    pub duration: Option<Duration>,
    pub max_vus: Option<u64>,
    pub drops_count_as_failed: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScenarioExecutor {
    /// Fixed number of requests per `time_unit` for `duration`.
    ConstantArrivalRate {
        rate: u64,
        time_unit: Duration,
        duration: Duration,
        pre_allocated_vus: u64,
        max_vus: u64,
    },

    /// Piecewise-linear rate curve starting at `start_rate`.
    RampingArrivalRate {
        start_rate: u64,
        time_unit: Duration,
        pre_allocated_vus: u64,
        max_vus: u64,
        stages: Vec<Stage>,
    },
}

/// Scenario executor kind (the string form used by scenario files/CLI).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumString, strum::Display)]
pub enum ScenarioExecutorKind {
    #[strum(to_string = "constant-arrival-rate", serialize = "constant-rps")]
    ConstantArrivalRate,

    #[strum(to_string = "ramping-arrival-rate", serialize = "ramping-rps")]
    RampingArrivalRate,
}

impl ScenarioExecutor {
    pub fn kind(&self) -> ScenarioExecutorKind {
        match self {
            Self::ConstantArrivalRate { .. } => ScenarioExecutorKind::ConstantArrivalRate,
            Self::RampingArrivalRate { .. } => ScenarioExecutorKind::RampingArrivalRate,
        }
    }

    pub fn time_unit(&self) -> Duration {
        match self {
            Self::ConstantArrivalRate { time_unit, .. }
            | Self::RampingArrivalRate { time_unit, .. } => *time_unit,
        }
    }

    pub fn pre_allocated_vus(&self) -> u64 {
        match self {
            Self::ConstantArrivalRate {
                pre_allocated_vus, ..
            }
            | Self::RampingArrivalRate {
                pre_allocated_vus, ..
            } => *pre_allocated_vus,
        }
    }

    pub fn max_vus(&self) -> u64 {
        match self {
            Self::ConstantArrivalRate { max_vus, .. }
            | Self::RampingArrivalRate { max_vus, .. } => *max_vus,
        }
    }

    pub fn total_duration(&self) -> Duration {
        match self {
            Self::ConstantArrivalRate { duration, .. } => *duration,
            Self::RampingArrivalRate { stages, .. } => stages
                .iter()
                .fold(Duration::ZERO, |acc, st| acc.saturating_add(st.duration)),
        }
    }

    pub fn rate_fn(&self) -> RateFn {
        match self {
            Self::ConstantArrivalRate {
                rate,
                time_unit,
                duration,
                ..
            } => RateFn::Constant {
                rate: *rate,
                time_unit: *time_unit,
                duration: *duration,
            },
            Self::RampingArrivalRate {
                start_rate,
                time_unit,
                stages,
                ..
            } => RateFn::Ramping {
                schedule: Arc::new(RampingRateSchedule::new(*start_rate, stages.clone())),
                time_unit: *time_unit,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioConfig {
    pub name: String,
    pub executor: ScenarioExecutor,
    /// Per-request deadline.
    pub request_timeout: Duration,
    /// How long in-flight requests may run after issuance stops.
    pub graceful_stop: Duration,
    /// Idle time after which VUs above `pre_allocated_vus` are retired.
    pub idle_vu_grace: Duration,
    /// When set, every outcome is checked against this status code.
    pub expect_status: Option<u16>,
}

impl ScenarioConfig {
    pub fn validate(&self) -> Result<()> {
        let name = || self.name.clone();

        if self.executor.time_unit().is_zero() {
            return Err(Error::InvalidTimeUnit(name()));
        }
        if self.request_timeout.is_zero() {
            return Err(Error::InvalidRequestTimeout(name()));
        }

        let max_vus = self.executor.max_vus();
        if max_vus == 0 {
            return Err(Error::InvalidMaxVus(name()));
        }
        let pre_allocated = self.executor.pre_allocated_vus();
        if pre_allocated > max_vus {
            return Err(Error::InvalidPreAllocatedVus {
                pre_allocated,
                max: max_vus,
            });
        }

        match &self.executor {
            ScenarioExecutor::ConstantArrivalRate { duration, .. } => {
                if duration.is_zero() {
                    return Err(Error::InvalidDuration(name()));
                }
            }
            ScenarioExecutor::RampingArrivalRate { stages, .. } => {
                if stages.is_empty() {
                    return Err(Error::InvalidStages(name()));
                }
                if let Some(index) = stages.iter().position(|st| st.duration.is_zero()) {
                    return Err(Error::ZeroDurationStage {
                        scenario: name(),
                        index,
                    });
                }
            }
        }

        Ok(())
    }
}

/// Raw, unvalidated run description as read from a scenario file.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub scenarios: Vec<ScenarioOptions>,

    /// Threshold assertions, applied to every scenario.
    pub thresholds: Vec<ThresholdSet>,

    pub drops_count_as_failed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ScenarioOptions {
    pub name: String,

    /// Scenario executor. If missing, inferred from the presence of `stages`.
    pub executor: Option<String>,

    pub time_unit: Option<Duration>,
    pub pre_allocated_vus: Option<u64>,
    pub max_vus: Option<u64>,

    // Constant arrival rate
    pub rate: Option<u64>,
    pub duration: Option<Duration>,

    // Ramping arrival rate
    pub start_rate: Option<u64>,
    pub stages: Vec<Stage>,

    pub graceful_stop: Option<Duration>,
    pub request_timeout: Option<Duration>,
    pub idle_vu_grace: Option<Duration>,
    pub expect_status: Option<u16>,
}

pub fn scenarios_from_options(opts: &RunOptions, cfg: &RunConfig) -> Result<Vec<ScenarioConfig>> {
    if opts.scenarios.is_empty() {
        return Err(Error::NoScenarios);
    }

    let mut seen = HashSet::with_capacity(opts.scenarios.len());
    let mut out = Vec::with_capacity(opts.scenarios.len());
    for s in &opts.scenarios {
        if !seen.insert(s.name.as_str()) {
            return Err(Error::DuplicateScenario(s.name.clone()));
        }

        let scenario = scenario_from_options(s, cfg)?;
        scenario.validate()?;
        out.push(scenario);
    }

    Ok(out)
}

fn scenario_from_options(s: &ScenarioOptions, cfg: &RunConfig) -> Result<ScenarioConfig> {
    let kind = match s.executor.as_deref() {
        Some(name) => name.parse().map_err(|_| Error::InvalidExecutor {
            scenario: s.name.clone(),
            executor: name.to_string(),
        })?,
        None if s.stages.is_empty() => ScenarioExecutorKind::ConstantArrivalRate,
        None => ScenarioExecutorKind::RampingArrivalRate,
    };

    let time_unit = s.time_unit.unwrap_or(DEFAULT_TIME_UNIT);
    let pre_allocated_vus = s.pre_allocated_vus.unwrap_or(1);
    let max_vus = cfg
        .max_vus
        .or(s.max_vus)
        .unwrap_or(pre_allocated_vus)
        .max(1);
    // A `--max-vus` below the file's pre-allocation lowers the pre-allocation with it.
    let pre_allocated_vus = if cfg.max_vus.is_some() {
        pre_allocated_vus.min(max_vus)
    } else {
        pre_allocated_vus
    };

    // CLI flags have the highest priority. If the file defines a ramping executor but the user
    // explicitly requested a rate or duration, run it as a constant-rate scenario instead.
    let cli_shape_override = cfg.rate.is_some() || cfg.duration.is_some();

    let executor = match kind {
        ScenarioExecutorKind::RampingArrivalRate if !cli_shape_override => {
            ScenarioExecutor::RampingArrivalRate {
                start_rate: s.start_rate.unwrap_or(0),
                time_unit,
                pre_allocated_vus,
                max_vus,
                stages: s.stages.clone(),
            }
        }
        ScenarioExecutorKind::RampingArrivalRate => {
            let peak_target = s.stages.iter().map(|st| st.target).max();
            let rate = cfg
                .rate
                .or(s.rate)
                .or(peak_target)
                .ok_or_else(|| Error::InvalidRate(s.name.clone()))?;
            let stages_total = s
                .stages
                .iter()
                .fold(Duration::ZERO, |acc, st| acc.saturating_add(st.duration));
            let duration = cfg.duration.or(s.duration).unwrap_or(stages_total);

            ScenarioExecutor::ConstantArrivalRate {
                rate,
                time_unit,
                duration,
                pre_allocated_vus,
                max_vus,
            }
        }
        ScenarioExecutorKind::ConstantArrivalRate => {
            let rate = cfg
                .rate
                .or(s.rate)
                .ok_or_else(|| Error::InvalidRate(s.name.clone()))?;
            let duration = cfg
                .duration
                .or(s.duration)
                .ok_or_else(|| Error::InvalidDuration(s.name.clone()))?;

            ScenarioExecutor::ConstantArrivalRate {
                rate,
                time_unit,
                duration,
                pre_allocated_vus,
                max_vus,
            }
        }
    };

    Ok(ScenarioConfig {
        name: s.name.clone(),
        executor,
        request_timeout: s.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
        graceful_stop: s.graceful_stop.unwrap_or(DEFAULT_GRACEFUL_STOP),
        idle_vu_grace: s.idle_vu_grace.unwrap_or(DEFAULT_IDLE_VU_GRACE),
        expect_status: s.expect_status,
    })
}
