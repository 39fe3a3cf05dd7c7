use std::time::Duration;

use super::config::Stage;

#[derive(Debug, Clone)]
pub struct StageSnapshot {
    pub index: usize,
    pub count: usize,
    pub stage_elapsed: Duration,
    pub stage_remaining: Duration,
    pub start_target: u64,
    pub end_target: u64,
    pub current_target: f64,
}

/// One stage placed on the run timeline.
#[derive(Debug, Clone, Copy)]
struct Segment {
    from: Duration,
    to: Duration,
    from_target: u64,
    to_target: u64,
}

impl Segment {
    fn len(&self) -> Duration {
        self.to.saturating_sub(self.from)
    }

    fn rate_at(&self, elapsed: Duration) -> f64 {
        let len = self.len();
        if len.is_zero() {
            return self.to_target as f64;
        }
        let into = elapsed.saturating_sub(self.from).as_secs_f64();
        let frac = (into / len.as_secs_f64()).clamp(0.0, 1.0);
        let (a, b) = (self.from_target as f64, self.to_target as f64);
        (a + (b - a) * frac).max(0.0)
    }
}

/// Piecewise-linear rate curve: each stage ramps from the previous target (or `start`) to its
/// own target over its duration.
#[derive(Debug, Clone)]
pub struct RampingRateSchedule {
    start: u64,
    segments: Vec<Segment>,
}

impl RampingRateSchedule {
    pub fn new(start: u64, stages: Vec<Stage>) -> Self {
        let mut at = Duration::ZERO;
        let mut prev_target = start;
        let segments = stages
            .iter()
            .map(|stage| {
                let seg = Segment {
                    from: at,
                    to: at.saturating_add(stage.duration),
                    from_target: prev_target,
                    to_target: stage.target,
                };
                at = seg.to;
                prev_target = stage.target;
                seg
            })
            .collect();

        Self { start, segments }
    }

    pub fn total_duration(&self) -> Duration {
        self.segments.last().map_or(Duration::ZERO, |s| s.to)
    }

    pub fn is_done(&self, elapsed: Duration) -> bool {
        elapsed >= self.total_duration()
    }

    /// Segment containing `elapsed`. A segment's end belongs to it, which keeps the curve
    /// continuous across boundaries; past the end the last segment is returned.
    fn segment_at(&self, elapsed: Duration) -> Option<(usize, &Segment)> {
        let idx = self.segments.partition_point(|s| s.to < elapsed);
        let idx = idx.min(self.segments.len().checked_sub(1)?);
        Some((idx, &self.segments[idx]))
    }

    /// Target rate (per time unit) at `elapsed`.
    pub fn rate_at(&self, elapsed: Duration) -> f64 {
        match self.segment_at(elapsed) {
            Some((_, seg)) => seg.rate_at(elapsed),
            None => self.start as f64,
        }
    }

    pub fn stage_snapshot_at(&self, elapsed: Duration) -> Option<StageSnapshot> {
        let elapsed = elapsed.min(self.total_duration());
        let (index, seg) = self.segment_at(elapsed)?;
        let stage_elapsed = elapsed.saturating_sub(seg.from);

        Some(StageSnapshot {
            index,
            count: self.segments.len(),
            stage_elapsed,
            stage_remaining: seg.len().saturating_sub(stage_elapsed),
            start_target: seg.from_target,
            end_target: seg.to_target,
            current_target: seg.rate_at(elapsed),
        })
    }
}
