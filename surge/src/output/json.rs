use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;

use surge_core::LatencySummary;
use surge_core::runner::{
    ProgressFn, ProgressUpdate, RunReport, RunVerdict, ScenarioProgress, ScenarioRun,
};

use crate::request::StaticRequest;

use super::OutputFormatter;

pub(crate) struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _file: &Path, _scenarios: &[ScenarioRun<StaticRequest>]) {}

    fn progress(&self) -> Option<ProgressFn> {
        Some(Arc::new(move |u| {
            let line = build_progress_line(&u);
            emit_json_line(&line);
        }))
    }

    fn print_summary(&self, report: &RunReport) -> anyhow::Result<()> {
        let line = build_summary_line(report);
        emit_json_line(&line);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonProgressLine<'a> {
    pub kind: &'static str,
    pub scenario: &'a str,
    pub tick: u64,
    pub elapsed_secs: f64,
    pub target_rate: f64,

    pub window: JsonWindow<'a>,
    pub totals: JsonTotals,
    pub throughput: JsonThroughput,
    pub latency_ms: JsonLatencySummary,

    pub vus_busy: u64,
    pub vus_idle: u64,
    pub vus_peak_busy: u64,
    pub vus_max: u64,

    /// 1-based; only for ramping scenarios.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stages: Option<usize>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonWindow<'a> {
    pub requests_per_sec: f64,
    pub completed: u64,
    pub failed: u64,
    pub dropped: u64,
    pub error_rate: f64,
    pub errors: &'a BTreeMap<String, u64>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonThroughput {
    pub avg: f64,
    pub stdev: f64,
    pub peak: f64,
}

fn build_progress_line(u: &ProgressUpdate) -> JsonProgressLine<'_> {
    let m = &u.metrics;
    let stage = match &u.progress {
        ScenarioProgress::RampingArrivalRate {
            stage: Some(stage), ..
        } => Some(stage),
        _ => None,
    };

    JsonProgressLine {
        kind: "progress",
        scenario: &u.scenario,
        tick: u.tick,
        elapsed_secs: u.elapsed.as_secs_f64(),
        target_rate: u.target_rate,

        window: JsonWindow {
            requests_per_sec: m.window.rate,
            completed: m.window.completed,
            failed: m.window.failed,
            dropped: m.window.dropped,
            error_rate: m.window.error_rate(),
            errors: &m.window.errors,
        },
        totals: JsonTotals {
            requests_total: m.totals.requests,
            failed_requests_total: m.totals.failed,
            dropped_total: m.totals.dropped,
            checks_failed_total: m.totals.checks_failed,
            thresholds_failed: None,
        },
        throughput: JsonThroughput {
            avg: m.throughput.mean(),
            stdev: m.throughput.stdev(),
            peak: m.throughput.peak(),
        },
        latency_ms: latency_ms(&m.latency),

        vus_busy: u.vus.busy,
        vus_idle: u.vus.idle,
        vus_peak_busy: u.vus.peak_busy,
        vus_max: u.vus.max,

        stage: stage.map(|s| s.stage),
        stages: stage.map(|s| s.stages),
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSummaryLine {
    pub kind: &'static str,
    pub passed: bool,
    pub scenarios: Vec<JsonScenarioSummary>,
    pub totals: JsonTotals,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonScenarioSummary {
    pub scenario: String,
    pub passed: bool,
    pub elapsed_secs: f64,

    pub issued: u64,
    pub requests_total: u64,
    pub failed_requests_total: u64,
    pub dropped_total: u64,
    pub error_rate: Option<f64>,
    pub errors: BTreeMap<String, u64>,

    pub checks_passed: u64,
    pub checks_failed: u64,

    pub peak_busy_vus: u64,
    pub vus_created: u64,

    pub latency_ms: JsonLatencySummary,
    pub thresholds_failed: Vec<JsonThresholdFailure>,
}

/// Milliseconds.
#[derive(Debug, Serialize)]
pub(crate) struct JsonLatencySummary {
    pub p50: Option<f64>,
    pub p75: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub stdev: Option<f64>,
    pub count: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonThresholdFailure {
    pub metric: String,
    pub expression: String,
    pub observed: Option<f64>,
}

#[derive(Debug, Serialize, Default)]
pub(crate) struct JsonTotals {
    pub requests_total: u64,
    pub failed_requests_total: u64,
    pub dropped_total: u64,
    pub checks_failed_total: u64,
    /// Only known once the run is over.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thresholds_failed: Option<usize>,
}

fn latency_ms(h: &LatencySummary) -> JsonLatencySummary {
    JsonLatencySummary {
        p50: h.p50,
        p75: h.p75,
        p90: h.p90,
        p95: h.p95,
        p99: h.p99,
        min: h.min,
        max: h.max,
        mean: h.mean,
        stdev: h.stdev,
        count: h.count,
    }
}

fn scenario_summary(v: &RunVerdict) -> JsonScenarioSummary {
    let s = &v.snapshot;

    JsonScenarioSummary {
        scenario: v.scenario.clone(),
        passed: v.passed,
        elapsed_secs: v.elapsed.as_secs_f64(),
        issued: v.issued,
        requests_total: s.count,
        failed_requests_total: s.error_count,
        dropped_total: s.dropped,
        error_rate: s.error_rate(false),
        errors: s.errors_by_kind.clone(),
        checks_passed: s.checks_passed,
        checks_failed: s.checks_failed,
        peak_busy_vus: v.peak_busy_vus,
        vus_created: v.vus_created,
        latency_ms: latency_ms(&s.latency_summary()),
        thresholds_failed: v
            .failed_thresholds
            .iter()
            .map(|f| JsonThresholdFailure {
                metric: f.expr.metric.to_string(),
                expression: format!("{}{}{}", f.expr.agg, f.expr.op, f.expr.value),
                observed: f.observed,
            })
            .collect(),
    }
}

fn build_summary_line(report: &RunReport) -> JsonSummaryLine {
    let mut totals = JsonTotals::default();
    let mut failed_thresholds = 0;
    let scenarios = report
        .verdicts
        .iter()
        .map(|v| {
            let s = scenario_summary(v);
            totals.requests_total = totals.requests_total.saturating_add(s.requests_total);
            totals.failed_requests_total = totals
                .failed_requests_total
                .saturating_add(s.failed_requests_total);
            totals.dropped_total = totals.dropped_total.saturating_add(s.dropped_total);
            totals.checks_failed_total = totals.checks_failed_total.saturating_add(s.checks_failed);
            failed_thresholds += s.thresholds_failed.len();
            s
        })
        .collect::<Vec<_>>();
    totals.thresholds_failed = Some(failed_thresholds);

    JsonSummaryLine {
        kind: "summary",
        passed: report.passed(),
        scenarios,
        totals,
    }
}

fn emit_json_line<T: Serialize>(line: &T) {
    let mut out = std::io::stdout().lock();
    if serde_json::to_writer(&mut out, line).is_ok() {
        let _ = writeln!(out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::time::Duration;
    use surge_core::Aggregator;
    use surge_core::runner::{
        LiveMetrics, RunTotals, StageProgress, ThresholdAgg, ThresholdExpr, ThresholdMetric,
        ThresholdOp, ThresholdViolation, VuProgress, WindowActivity,
    };

    fn to_value<T: Serialize>(v: &T) -> Value {
        match serde_json::to_value(v) {
            Ok(v) => v,
            Err(err) => panic!("to_value failed: {err}"),
        }
    }

    #[test]
    fn progress_line_has_kind_and_stage() {
        let update = ProgressUpdate {
            tick: 3,
            elapsed: Duration::from_secs(3),
            scenario: "spike".to_string(),
            target_rate: 150.0,
            metrics: LiveMetrics {
                window: WindowActivity {
                    completed: 150,
                    failed: 2,
                    rate: 149.0,
                    errors: [("timeout".to_string(), 2)].into_iter().collect(),
                    ..WindowActivity::default()
                },
                totals: RunTotals {
                    requests: 400,
                    ..RunTotals::default()
                },
                ..LiveMetrics::default()
            },
            vus: VuProgress {
                busy: 4,
                idle: 6,
                peak_busy: 7,
                max: 50,
            },
            progress: ScenarioProgress::RampingArrivalRate {
                time_unit: Duration::from_secs(1),
                total_duration: Duration::from_secs(40),
                stage: Some(StageProgress {
                    stage: 1,
                    stages: 4,
                    stage_elapsed: Duration::from_secs(3),
                    stage_remaining: Duration::from_secs(7),
                    start_target: 50,
                    end_target: 100,
                    current_target: 65.0,
                }),
            },
        };

        let v = to_value(&build_progress_line(&update));
        assert_eq!(v.get("kind").and_then(Value::as_str), Some("progress"));
        assert_eq!(v.get("scenario").and_then(Value::as_str), Some("spike"));
        assert_eq!(v.pointer("/totals/requests_total").and_then(Value::as_u64), Some(400));
        assert!(v.pointer("/totals/thresholds_failed").is_none());
        assert_eq!(v.pointer("/window/errors/timeout").and_then(Value::as_u64), Some(2));
        assert_eq!(v.pointer("/window/completed").and_then(Value::as_u64), Some(150));
        assert!(v.pointer("/latency_ms/p50").is_some_and(Value::is_null));
        assert_eq!(v.get("vus_max").and_then(Value::as_u64), Some(50));
        assert_eq!(v.get("stage").and_then(Value::as_u64), Some(1));
        assert_eq!(v.get("stages").and_then(Value::as_u64), Some(4));
    }

    #[test]
    fn summary_line_has_totals_and_failures() {
        let agg = Aggregator::default();
        agg.record(surge_core::Sample {
            offset: Duration::ZERO,
            latency: Duration::from_millis(20),
            failed: false,
            error_kind: None,
            check: Some(false),
        });
        agg.record_drop(Duration::from_millis(5));

        let report = RunReport {
            verdicts: vec![RunVerdict {
                scenario: "s1".to_string(),
                passed: false,
                failed_thresholds: vec![ThresholdViolation {
                    expr: ThresholdExpr {
                        metric: ThresholdMetric::HttpReqFailed,
                        agg: ThresholdAgg::Rate,
                        op: ThresholdOp::Lt,
                        value: 0.01,
                    },
                    observed: Some(0.5),
                }],
                snapshot: agg.snapshot(),
                elapsed: Duration::from_secs(1),
                issued: 1,
                dropped: 1,
                peak_busy_vus: 1,
                vus_created: 1,
            }],
        };

        let v = to_value(&build_summary_line(&report));
        assert_eq!(v.get("kind").and_then(Value::as_str), Some("summary"));
        assert_eq!(v.get("passed").and_then(Value::as_bool), Some(false));
        assert_eq!(
            v.pointer("/totals/requests_total").and_then(Value::as_u64),
            Some(1)
        );
        assert_eq!(
            v.pointer("/totals/dropped_total").and_then(Value::as_u64),
            Some(1)
        );
        assert_eq!(
            v.pointer("/totals/checks_failed_total").and_then(Value::as_u64),
            Some(1)
        );
        assert_eq!(
            v.pointer("/scenarios/0/thresholds_failed/0/metric")
                .and_then(Value::as_str),
            Some("http_req_failed")
        );
        assert_eq!(
            v.pointer("/scenarios/0/thresholds_failed/0/expression")
                .and_then(Value::as_str),
            Some("rate<0.01")
        );
        let p50 = v
            .pointer("/scenarios/0/latency_ms/p50")
            .and_then(Value::as_f64)
            .unwrap_or_default();
        assert!((19.0..=21.0).contains(&p50), "p50={p50}");
    }
}
