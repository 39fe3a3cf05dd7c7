use std::sync::Arc;
use std::time::Duration;

use super::schedule::RampingRateSchedule;

/// Target arrival rate as a function of time since the scenario started.
#[derive(Debug, Clone)]
pub enum RateFn {
    Constant {
        rate: u64,
        time_unit: Duration,
        duration: Duration,
    },
    Ramping {
        schedule: Arc<RampingRateSchedule>,
        time_unit: Duration,
    },
}

impl RateFn {
    pub fn time_unit(&self) -> Duration {
        match self {
            Self::Constant { time_unit, .. } | Self::Ramping { time_unit, .. } => *time_unit,
        }
    }

    pub fn total_duration(&self) -> Duration {
        match self {
            Self::Constant { duration, .. } => *duration,
            Self::Ramping { schedule, .. } => schedule.total_duration(),
        }
    }

    /// Requests per time unit at `elapsed`.
    pub fn per_unit(&self, elapsed: Duration) -> f64 {
        match self {
            Self::Constant { rate, .. } => *rate as f64,
            Self::Ramping { schedule, .. } => schedule.rate_at(elapsed),
        }
    }

    /// Requests per second at `elapsed`.
    pub fn per_second(&self, elapsed: Duration) -> f64 {
        self.per_unit(elapsed) / self.time_unit().as_secs_f64().max(1e-9)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::config::Stage;

    #[test]
    fn per_second_scales_by_time_unit() {
        let f = RateFn::Constant {
            rate: 30,
            time_unit: Duration::from_secs(60),
            duration: Duration::from_secs(10),
        };
        assert!((f.per_second(Duration::ZERO) - 0.5).abs() < 1e-12);
        assert_eq!(f.total_duration(), Duration::from_secs(10));
    }

    #[test]
    fn ramping_follows_schedule() {
        let schedule = RampingRateSchedule::new(
            0,
            vec![Stage {
                duration: Duration::from_secs(4),
                target: 400,
            }],
        );
        let f = RateFn::Ramping {
            schedule: Arc::new(schedule),
            time_unit: Duration::from_millis(500),
        };

        assert!((f.per_second(Duration::from_secs(1)) - 200.0).abs() < 1e-9);
        assert_eq!(f.total_duration(), Duration::from_secs(4));
    }
}
