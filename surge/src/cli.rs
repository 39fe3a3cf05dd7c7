use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 10s, 250ms, 1m30s)".to_string());
    }

    // Bare integers are seconds.
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    humantime::parse_duration(s)
        .map_err(|err| format!("invalid duration '{s}' (expected e.g. 10s, 250ms, 1m30s): {err}"))
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Progress bars on stderr and a text summary on stdout.
    HumanReadable,
    /// Emit JSON progress and summary lines (NDJSON) to stdout.
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Template {
    /// Constant arrival rate with latency and error-rate thresholds.
    Load,
    /// Ramping arrival rate that climbs past the expected capacity.
    Stress,
    /// Short burst to a high rate, then recovery.
    Spike,
}

#[derive(Debug, Parser)]
#[command(
    name = "surge",
    author,
    version,
    about = "Open-model HTTP load generator",
    long_about = "surge issues requests at a configured arrival rate, independent of how fast the target responds.\n\nA YAML scenario file describes one or more scenarios (constant or ramping arrival rate), the request to send and the thresholds that decide pass/fail.\n\nValues in the request may reference environment variables as ${NAME}; use `--env KEY=VALUE` to add/override values.",
    after_help = "Examples:\n  surge init --template load\n  surge run surge.yaml\n  surge run surge.yaml --rate 500 --duration 1m\n  surge run surge.yaml --env BASE_URL=http://localhost:8080 --output json\n\nLogging: set SURGE_LOG (e.g. SURGE_LOG=debug) for diagnostics on stderr."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a scenario file
    #[command(
        long_about = "Run every scenario in the file concurrently, then evaluate thresholds.\n\nCLI flags override values from the file. Passing --rate or --duration turns a ramping scenario into a constant-rate one."
    )]
    Run(RunArgs),

    /// Write a starter scenario file
    Init(InitArgs),
}

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Target directory (created if missing)
    #[arg(default_value = ".")]
    pub dir: PathBuf,

    /// Scenario shape to scaffold
    #[arg(long, value_enum, default_value_t = Template::Load)]
    pub template: Template,

    /// Scenario filename to create in the target directory
    #[arg(long, default_value = "surge.yaml")]
    pub file: String,

    /// Overwrite existing files
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Path to the scenario file (.yaml/.yml)
    pub file: PathBuf,

    /// Override the arrival rate (requests per time unit)
    #[arg(long)]
    pub rate: Option<u64>,

    /// Override the test duration (e.g. 10s, 250ms, 1m)
    #[arg(long, value_parser = parse_duration)]
    pub duration: Option<Duration>,

    /// Override the maximum number of concurrent virtual users
    #[arg(long)]
    pub max_vus: Option<u64>,

    /// Count dropped requests as failed in `http_req_failed` thresholds
    #[arg(long)]
    pub drops_count_as_failed: bool,

    /// Add/override env vars used for ${NAME} interpolation (repeatable, KEY=VALUE).
    /// CLI-provided vars override the current process env.
    #[arg(long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,
}
