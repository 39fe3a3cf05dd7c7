use std::fmt;
use std::time::Duration;

use surge_metrics::{MetricsSnapshot, per_sec};

use super::error::{Error, Result};

/// Raw threshold assertions for one metric, as written in a scenario file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThresholdSet {
    pub metric: String,
    pub expressions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumString, strum::Display)]
pub enum ThresholdMetric {
    /// Request latency in milliseconds.
    #[strum(serialize = "http_req_duration")]
    HttpReqDuration,
    #[strum(serialize = "http_req_failed")]
    HttpReqFailed,
    #[strum(serialize = "http_reqs")]
    HttpReqs,
    #[strum(serialize = "dropped_iterations")]
    DroppedIterations,
    #[strum(serialize = "checks")]
    Checks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ThresholdOp {
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    Lte,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    Gte,
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    Ne,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdAgg {
    Avg,
    Min,
    Max,
    Med,
    Count,
    Rate,
    P(f64),
}

impl ThresholdAgg {
    fn supported_by(self, metric: ThresholdMetric) -> bool {
        match metric {
            ThresholdMetric::HttpReqDuration => !matches!(self, Self::Rate),
            ThresholdMetric::HttpReqFailed
            | ThresholdMetric::HttpReqs
            | ThresholdMetric::DroppedIterations
            | ThresholdMetric::Checks => matches!(self, Self::Rate | Self::Count),
        }
    }
}

impl fmt::Display for ThresholdAgg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Avg => f.write_str("avg"),
            Self::Min => f.write_str("min"),
            Self::Max => f.write_str("max"),
            Self::Med => f.write_str("med"),
            Self::Count => f.write_str("count"),
            Self::Rate => f.write_str("rate"),
            Self::P(p) => write!(f, "p({p})"),
        }
    }
}

/// Parsed `agg op value` assertion bound to a metric.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdExpr {
    pub metric: ThresholdMetric,
    pub agg: ThresholdAgg,
    pub op: ThresholdOp,
    pub value: f64,
}

impl fmt::Display for ThresholdExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}{}{}", self.metric, self.agg, self.op, self.value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdViolation {
    pub expr: ThresholdExpr,
    /// `None` when the metric had no data to aggregate.
    pub observed: Option<f64>,
}

/// Parses the right-hand side of a threshold (`p(95)<250`, `rate <= 0.01`, ...).
pub fn parse_threshold_expr(
    raw: &str,
) -> std::result::Result<(ThresholdAgg, ThresholdOp, f64), String> {
    let s: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if s.is_empty() {
        return Err("empty threshold".to_string());
    }

    // Two-character operators first so `<=` is not read as `<`.
    let ops = [
        ("<=", ThresholdOp::Lte),
        (">=", ThresholdOp::Gte),
        ("==", ThresholdOp::Eq),
        ("!=", ThresholdOp::Ne),
        ("<", ThresholdOp::Lt),
        (">", ThresholdOp::Gt),
    ];
    let (op_pos, op_len, op) = ops
        .iter()
        .find_map(|(tok, op)| s.find(tok).map(|pos| (pos, tok.len(), *op)))
        .ok_or_else(|| format!("invalid threshold (missing operator): {raw}"))?;

    let (left, right_with_op) = s.split_at(op_pos);
    let right = &right_with_op[op_len..];
    if left.is_empty() || right.is_empty() {
        return Err(format!("invalid threshold: {raw}"));
    }

    let agg = if left.eq_ignore_ascii_case("avg") {
        ThresholdAgg::Avg
    } else if left.eq_ignore_ascii_case("min") {
        ThresholdAgg::Min
    } else if left.eq_ignore_ascii_case("max") {
        ThresholdAgg::Max
    } else if left.eq_ignore_ascii_case("med") {
        ThresholdAgg::Med
    } else if left.eq_ignore_ascii_case("count") {
        ThresholdAgg::Count
    } else if left.eq_ignore_ascii_case("rate") {
        ThresholdAgg::Rate
    } else if let Some(inner) = left.strip_prefix("p(").and_then(|v| v.strip_suffix(')')) {
        let p: f64 = inner
            .parse()
            .map_err(|_| format!("invalid percentile in threshold: {raw}"))?;
        if !(p > 0.0 && p <= 100.0) {
            return Err(format!("percentile out of range in threshold: {raw}"));
        }
        ThresholdAgg::P(p)
    } else {
        return Err(format!("unknown aggregation `{left}` in threshold: {raw}"));
    };

    let value: f64 = right
        .parse()
        .ok()
        .filter(|v: &f64| v.is_finite())
        .ok_or_else(|| format!("invalid numeric value in threshold: {raw}"))?;

    Ok((agg, op, value))
}

/// Validates and parses every threshold before a run starts.
pub fn compile_thresholds(sets: &[ThresholdSet]) -> Result<Vec<ThresholdExpr>> {
    let mut out = Vec::new();
    for set in sets {
        let metric: ThresholdMetric = set
            .metric
            .parse()
            .map_err(|_| Error::UnknownThresholdMetric(set.metric.clone()))?;

        for raw in &set.expressions {
            let (agg, op, value) =
                parse_threshold_expr(raw).map_err(|error| Error::InvalidThreshold {
                    metric: set.metric.clone(),
                    error,
                })?;
            if !agg.supported_by(metric) {
                return Err(Error::InvalidThreshold {
                    metric: set.metric.clone(),
                    error: format!("aggregation `{agg}` is not available for `{metric}`"),
                });
            }

            out.push(ThresholdExpr {
                metric,
                agg,
                op,
                value,
            });
        }
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy)]
pub struct EvalContext {
    /// Issuing window of the run, used for `rate` on counters.
    pub elapsed: Duration,
    pub drops_count_as_failed: bool,
}

/// Evaluates every expression and returns all that did not hold.
pub fn evaluate_thresholds(
    snapshot: &MetricsSnapshot,
    exprs: &[ThresholdExpr],
    ctx: EvalContext,
) -> Vec<ThresholdViolation> {
    exprs
        .iter()
        .filter_map(|expr| {
            let observed = observed_value(snapshot, expr, ctx);
            let passed = observed.is_some_and(|v| compare(v, expr.op, expr.value));
            (!passed).then(|| ThresholdViolation {
                expr: expr.clone(),
                observed,
            })
        })
        .collect()
}

fn compare(left: f64, op: ThresholdOp, right: f64) -> bool {
    match op {
        ThresholdOp::Lt => left < right,
        ThresholdOp::Lte => left <= right,
        ThresholdOp::Gt => left > right,
        ThresholdOp::Gte => left >= right,
        ThresholdOp::Eq => left == right,
        ThresholdOp::Ne => left != right,
    }
}

fn observed_value(
    snapshot: &MetricsSnapshot,
    expr: &ThresholdExpr,
    ctx: EvalContext,
) -> Option<f64> {
    match expr.metric {
        ThresholdMetric::HttpReqDuration => {
            let summary = snapshot.latency_summary();
            match expr.agg {
                ThresholdAgg::Avg => summary.mean,
                ThresholdAgg::Min => summary.min,
                ThresholdAgg::Max => summary.max,
                ThresholdAgg::Med => summary.p50,
                ThresholdAgg::P(p) => snapshot.latency_percentile(p),
                ThresholdAgg::Count => Some(summary.count as f64),
                ThresholdAgg::Rate => None,
            }
        }
        ThresholdMetric::HttpReqFailed => match expr.agg {
            ThresholdAgg::Rate => snapshot.error_rate(ctx.drops_count_as_failed),
            ThresholdAgg::Count => {
                let failed = if ctx.drops_count_as_failed {
                    snapshot.error_count.saturating_add(snapshot.dropped)
                } else {
                    snapshot.error_count
                };
                Some(failed as f64)
            }
            _ => None,
        },
        ThresholdMetric::HttpReqs => match expr.agg {
            ThresholdAgg::Count => Some(snapshot.count as f64),
            ThresholdAgg::Rate => per_sec(snapshot.count, ctx.elapsed),
            _ => None,
        },
        ThresholdMetric::DroppedIterations => match expr.agg {
            ThresholdAgg::Count => Some(snapshot.dropped as f64),
            ThresholdAgg::Rate => per_sec(snapshot.dropped, ctx.elapsed),
            _ => None,
        },
        ThresholdMetric::Checks => match expr.agg {
            ThresholdAgg::Rate => snapshot.checks_rate(),
            ThresholdAgg::Count => Some(snapshot.checks_total() as f64),
            _ => None,
        },
    }
}
