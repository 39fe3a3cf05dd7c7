use std::fmt::Write as _;

use surge_core::runner::{RunReport, RunVerdict};

use super::format::*;

pub(crate) fn render(report: &RunReport) -> String {
    let mut out = String::new();

    if report.verdicts.is_empty() {
        out.push_str("summary: no scenarios\n");
        return out;
    }

    out.push_str("summary\n");

    let mut totals = Totals::default();
    for v in &report.verdicts {
        totals.add(v);
        render_verdict(v, &mut out);
        out.push('\n');
    }

    out.push_str("totals\n");
    writeln!(
        &mut out,
        "  requests: {} (failed {}, dropped {})",
        totals.requests_total, totals.failed_requests_total, totals.dropped_total
    )
    .ok();
    writeln!(&mut out, "  checks_failed_total: {}", totals.checks_failed_total).ok();
    writeln!(&mut out, "  thresholds_failed: {}", totals.thresholds_failed).ok();
    writeln!(
        &mut out,
        "  result: {}",
        if report.passed() { "passed" } else { "failed" }
    )
    .ok();

    out
}

fn render_verdict(v: &RunVerdict, out: &mut String) {
    let s = &v.snapshot;

    writeln!(
        out,
        "scenario: {} ({})",
        v.scenario,
        if v.passed { "passed" } else { "failed" }
    )
    .ok();
    writeln!(
        out,
        "  requests: {} (failed {}, dropped {}) error_rate={}",
        s.count,
        s.error_count,
        s.dropped,
        format_percent(s.error_rate(false))
    )
    .ok();

    let secs = v.elapsed.as_secs_f64().max(1e-9);
    writeln!(
        out,
        "  rates: issued={}/s completed={}/s over {}",
        format_rate(v.issued as f64 / secs),
        format_rate(s.count as f64 / secs),
        format_duration(v.elapsed)
    )
    .ok();
    writeln!(
        out,
        "  vus: peak_busy={} created={}",
        v.peak_busy_vus, v.vus_created
    )
    .ok();

    let h = s.latency_summary();
    if h.count > 0 {
        let ms = format_ms_opt;
        writeln!(
            out,
            "  latency: p50={} p90={} p95={} p99={} mean={} max={} (n={})",
            ms(h.p50),
            ms(h.p90),
            ms(h.p95),
            ms(h.p99),
            ms(h.mean),
            ms(h.max),
            h.count
        )
        .ok();
    } else {
        out.push_str("  latency: n/a\n");
    }

    if !s.errors_by_kind.is_empty() {
        out.push_str("  errors:\n");
        let mut errors: Vec<_> = s.errors_by_kind.iter().collect();
        errors.sort_by(|(a_kind, a_count), (b_kind, b_count)| {
            b_count.cmp(a_count).then_with(|| a_kind.cmp(b_kind))
        });
        for (kind, count) in errors {
            writeln!(out, "    {kind}: {count}").ok();
        }
    }

    if s.checks_total() > 0 {
        writeln!(
            out,
            "  checks: passed {} failed {}",
            s.checks_passed, s.checks_failed
        )
        .ok();
    }

    for f in &v.failed_thresholds {
        match f.observed {
            Some(obs) => writeln!(out, "  threshold_failed: {} (observed {obs:.4})", f.expr).ok(),
            None => writeln!(out, "  threshold_failed: {} (no data)", f.expr).ok(),
        };
    }
}

#[derive(Default)]
struct Totals {
    requests_total: u64,
    failed_requests_total: u64,
    dropped_total: u64,
    checks_failed_total: u64,
    thresholds_failed: usize,
}

impl Totals {
    fn add(&mut self, v: &RunVerdict) {
        let s = &v.snapshot;
        self.requests_total = self.requests_total.saturating_add(s.count);
        self.failed_requests_total = self.failed_requests_total.saturating_add(s.error_count);
        self.dropped_total = self.dropped_total.saturating_add(s.dropped);
        self.checks_failed_total = self.checks_failed_total.saturating_add(s.checks_failed);
        self.thresholds_failed += v.failed_thresholds.len();
    }
}
