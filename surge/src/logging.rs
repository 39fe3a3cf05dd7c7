use tracing_subscriber::EnvFilter;

pub(crate) const LOG_ENV: &str = "SURGE_LOG";
const DEFAULT_DIRECTIVE: &str = "warn";

/// Installs the stderr subscriber. `SURGE_LOG` takes `RUST_LOG`-style directives.
pub(crate) fn init() {
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    // Only fails when a global subscriber is already set.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
