use std::sync::Arc;

use anyhow::Context as _;
use surge_core::{HttpClient, HttpClientConfig};
use surge_core::runner::{
    RunConfig, RunSettings, ScenarioRun, Signal, run_scenarios, scenarios_from_options,
};
use tokio::task::JoinHandle;

use crate::cli::RunArgs;
use crate::exit_codes::ExitCode;
use crate::output;
use crate::request::StaticRequest;
use crate::run_error::RunError;
use crate::run_support::merged_env;
use crate::scenario_yaml::load_scenario_file;

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let out = output::formatter(args.output);

    let env = merged_env(&args.env).map_err(RunError::InvalidInput)?;
    let file = load_scenario_file(&args.file)
        .await
        .map_err(RunError::InvalidInput)?;
    let cfg = run_config(&args);

    let configs = scenarios_from_options(&file.options, &cfg)
        .map_err(|e| RunError::from_core("invalid scenario config", e))?;
    let settings = RunSettings::from_options(&file.options, &cfg)
        .map_err(|e| RunError::from_core("invalid thresholds", e))?;

    let scenarios = configs
        .into_iter()
        .zip(&file.requests)
        .map(|(config, req)| {
            let producer = StaticRequest::from_yaml(req, &env)
                .with_context(|| format!("scenario `{}`: invalid request", config.name))?;
            Ok(ScenarioRun {
                config,
                producer: Arc::new(producer),
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()
        .map_err(RunError::InvalidInput)?;

    out.print_header(&args.file, &scenarios);
    tracing::info!(scenarios = scenarios.len(), file = %args.file.display(), "run starting");

    let interrupt = Arc::new(Signal::new());
    let ctrl_c = spawn_ctrl_c_listener(interrupt.clone());
    let transport = Arc::new(HttpClient::new(&client_config(&scenarios)));

    let report = run_scenarios(
        scenarios,
        transport,
        settings,
        out.progress(),
        Some(interrupt),
    )
    .await;
    ctrl_c.abort();
    let report = report.map_err(|e| RunError::from_core("run failed", e))?;

    out.print_summary(&report).map_err(RunError::RuntimeError)?;

    Ok(ExitCode::from_quality_gates(
        report.checks_failed(),
        report.thresholds_failed(),
    ))
}

fn run_config(args: &RunArgs) -> RunConfig {
    RunConfig {
        rate: args.rate,
        duration: args.duration,
        max_vus: args.max_vus,
        drops_count_as_failed: args.drops_count_as_failed.then_some(true),
    }
}

fn client_config(scenarios: &[ScenarioRun<StaticRequest>]) -> HttpClientConfig {
    let peak: u64 = scenarios
        .iter()
        .map(|s| s.config.executor.max_vus())
        .fold(0, u64::saturating_add);
    HttpClientConfig {
        pool_max_idle_per_host: usize::try_from(peak).unwrap_or(usize::MAX).max(1),
        ..HttpClientConfig::default()
    }
}

/// First Ctrl-C stops issuing and drains; a second one exits immediately.
fn spawn_ctrl_c_listener(interrupt: Arc<Signal>) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        tracing::warn!("interrupted, draining in-flight requests (Ctrl-C again to exit)");
        interrupt.fire();

        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("interrupted twice, exiting");
            std::process::exit(ExitCode::RuntimeError.as_i32());
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::OutputFormat;
    use std::path::PathBuf;
    use std::time::Duration;

    fn args() -> RunArgs {
        RunArgs {
            file: PathBuf::from("surge.yaml"),
            rate: None,
            duration: None,
            max_vus: None,
            drops_count_as_failed: false,
            env: Vec::new(),
            output: OutputFormat::Json,
        }
    }

    #[test]
    fn absent_flags_do_not_override_the_file() {
        let cfg = run_config(&args());
        assert_eq!(cfg.rate, None);
        assert_eq!(cfg.duration, None);
        assert_eq!(cfg.max_vus, None);
        assert_eq!(cfg.drops_count_as_failed, None);
    }

    #[test]
    fn flags_become_overrides() {
        let cfg = run_config(&RunArgs {
            rate: Some(50),
            duration: Some(Duration::from_secs(5)),
            max_vus: Some(3),
            drops_count_as_failed: true,
            ..args()
        });
        assert_eq!(cfg.rate, Some(50));
        assert_eq!(cfg.duration, Some(Duration::from_secs(5)));
        assert_eq!(cfg.max_vus, Some(3));
        assert_eq!(cfg.drops_count_as_failed, Some(true));
    }

    #[tokio::test]
    async fn missing_file_is_invalid_input() {
        let err = match run(RunArgs {
            file: PathBuf::from("/nonexistent/surge.yaml"),
            ..args()
        })
        .await
        {
            Ok(code) => panic!("expected an error, got {code:?}"),
            Err(err) => err,
        };
        assert_eq!(err.exit_code(), ExitCode::InvalidInput);
        assert!(err.to_string().contains("failed to read scenario file"));
    }
}
