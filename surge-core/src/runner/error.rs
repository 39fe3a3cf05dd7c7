pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("scenario `{0}` has already been started")]
    AlreadyStarted(String),

    #[error("no scenarios configured")]
    NoScenarios,

    #[error("duplicate scenario name `{0}`")]
    DuplicateScenario(String),

    #[error(
        "scenario `{scenario}`: invalid `executor` `{executor}` (expected `constant-arrival-rate` or `ramping-arrival-rate`)"
    )]
    InvalidExecutor { scenario: String, executor: String },

    #[error("scenario `{0}`: `rate` is required for `constant-arrival-rate`")]
    InvalidRate(String),

    #[error("scenario `{0}`: `timeUnit` must be a positive duration")]
    InvalidTimeUnit(String),

    #[error("scenario `{0}`: `duration` must be a positive duration")]
    InvalidDuration(String),

    #[error("scenario `{0}`: `stages` must be a non-empty array of {{ duration, target }}")]
    InvalidStages(String),

    #[error("scenario `{scenario}`: stage {index} has a zero duration")]
    ZeroDurationStage { scenario: String, index: usize },

    #[error("`preAllocatedVUs` ({pre_allocated}) must be <= `maxVUs` ({max})")]
    InvalidPreAllocatedVus { pre_allocated: u64, max: u64 },

    #[error("scenario `{0}`: `maxVUs` must be a positive integer")]
    InvalidMaxVus(String),

    #[error("scenario `{0}`: `requestTimeout` must be a positive duration")]
    InvalidRequestTimeout(String),

    #[error("unknown threshold metric `{0}`")]
    UnknownThresholdMetric(String),

    #[error("invalid threshold expression for metric `{metric}`: {error}")]
    InvalidThreshold { metric: String, error: String },
}

impl Error {
    /// Configuration errors are fatal and surface before any request is issued.
    #[must_use]
    pub fn is_config(&self) -> bool {
        !matches!(self, Self::Join(_) | Self::AlreadyStarted(_))
    }
}
