use crate::cli::OutputFormat;
use crate::request::StaticRequest;
use std::path::Path;

use surge_core::runner::{ProgressFn, RunReport, ScenarioRun};

mod human;
mod json;

pub(crate) trait OutputFormatter: Send + Sync {
    fn print_header(&self, file: &Path, scenarios: &[ScenarioRun<StaticRequest>]);
    fn progress(&self) -> Option<ProgressFn>;
    fn print_summary(&self, report: &RunReport) -> anyhow::Result<()>;
}

pub(crate) fn formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::HumanReadable => Box::new(human::HumanReadableOutput::default()),
        OutputFormat::Json => Box::new(json::JsonOutput),
    }
}
