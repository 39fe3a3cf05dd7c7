use std::path::Path;
use std::sync::{Arc, OnceLock};

mod format;
mod progress;
mod summary;

use format::{format_duration, format_ms_opt, format_percent, format_rate};
use progress::HumanProgress;
use summary::render;
use surge_core::runner::{
    ProgressFn, ProgressUpdate, RunReport, ScenarioExecutor, ScenarioProgress, ScenarioRun,
};

use crate::request::StaticRequest;

use super::OutputFormatter;

#[derive(Default)]
pub(crate) struct HumanReadableOutput {
    progress: OnceLock<Arc<HumanProgress>>,
}

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, file: &Path, scenarios: &[ScenarioRun<StaticRequest>]) {
        println!("file: {}", file.display());
        for s in scenarios {
            let c = &s.config;
            let shape = match &c.executor {
                ScenarioExecutor::ConstantArrivalRate {
                    rate,
                    time_unit,
                    duration,
                    ..
                } => format!(
                    "rate={rate}/{} duration={}",
                    format_duration(*time_unit),
                    format_duration(*duration)
                ),
                ScenarioExecutor::RampingArrivalRate {
                    start_rate,
                    time_unit,
                    stages,
                    ..
                } => format!(
                    "start_rate={start_rate}/{} stages={} duration={}",
                    format_duration(*time_unit),
                    stages.len(),
                    format_duration(c.executor.total_duration())
                ),
            };
            let req = s.producer.spec();
            println!(
                "scenario: {} executor={} {shape} vus={}..{} request={} {}",
                c.name,
                c.executor.kind(),
                c.executor.pre_allocated_vus(),
                c.executor.max_vus(),
                req.method,
                req.url
            );
        }
        if !scenarios.is_empty() {
            println!();
        }

        let bars = HumanProgress::new(
            scenarios
                .iter()
                .map(|s| (s.config.name.as_str(), s.config.executor.total_duration())),
        );
        let _ = self.progress.set(Arc::new(bars));
    }

    fn progress(&self) -> Option<ProgressFn> {
        let bars = self.progress.get()?.clone();
        Some(Arc::new(move |u| {
            bars.update(&u.scenario, u.elapsed, progress_message(&u));
        }))
    }

    fn print_summary(&self, report: &RunReport) -> anyhow::Result<()> {
        if let Some(bars) = self.progress.get() {
            bars.finish();
        }
        print!("{}", render(report));

        if report.thresholds_failed() {
            eprintln!("thresholds failed:");
            for v in &report.verdicts {
                for f in &v.failed_thresholds {
                    match f.observed {
                        Some(obs) => eprintln!("  [{}] {} (observed {obs})", v.scenario, f.expr),
                        None => eprintln!("  [{}] {} (no data)", v.scenario, f.expr),
                    }
                }
            }
        }

        Ok(())
    }
}

fn progress_message(u: &ProgressUpdate) -> String {
    let m = &u.metrics;
    let mut msg = format!(
        "elapsed={} target={}/s rps={} p90={} err={} vus={}/{} dropped={}",
        format_duration(u.elapsed),
        format_rate(u.target_rate),
        format_rate(m.window.rate),
        format_ms_opt(m.latency.p90),
        format_percent(Some(m.window.error_rate())),
        u.vus.busy,
        u.vus.max,
        m.totals.dropped
    );

    if let ScenarioProgress::RampingArrivalRate {
        stage: Some(stage), ..
    } = &u.progress
    {
        msg.push_str(&format!(
            " stage={}/{} stage_remaining={}",
            stage.stage,
            stage.stages,
            format_duration(stage.stage_remaining)
        ));
    }

    msg
}
