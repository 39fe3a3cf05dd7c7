use crate::cli::Template;

pub(crate) fn contents(template: Template) -> &'static str {
    match template {
        Template::Load => LOAD_YAML,
        Template::Stress => STRESS_YAML,
        Template::Spike => SPIKE_YAML,
    }
}

const LOAD_YAML: &str = r#"# Constant load: a fixed arrival rate regardless of response times.
#
#   surge run surge.yaml --env BASE_URL=http://localhost:8080

scenarios:
  constant_load:
    executor: constant-arrival-rate
    rate: 200
    timeUnit: 1s
    duration: 30s
    preAllocatedVUs: 20
    maxVUs: 500

request:
  method: POST
  url: ${BASE_URL:-http://localhost:8080}/predict
  headers:
    Content-Type: application/json
  json:
    features: [0.5, 0.5, 0.5, 0.5, 0.5, 0.5, 0.5, 0.5, 0.5, 0.5]

expectStatus: 200

thresholds:
  http_req_duration: ["p(99)<500"]
  http_req_failed: ["rate<0.05"]
"#;

const STRESS_YAML: &str = r#"# Stress: ramp the arrival rate past the expected capacity, then back down.
#
#   surge run surge.yaml --env BASE_URL=http://localhost:8080

scenarios:
  stress_ramp:
    executor: ramping-arrival-rate
    startRate: 50
    timeUnit: 1s
    preAllocatedVUs: 50
    maxVUs: 1000
    stages:
      - { target: 500, duration: 30s }
      - { target: 1000, duration: 1m }
      - { target: 2000, duration: 1m }
      - { target: 0, duration: 30s }

request:
  method: POST
  url: ${BASE_URL:-http://localhost:8080}/predict
  headers:
    Content-Type: application/json
  json:
    features: [0.5, 0.5, 0.5, 0.5, 0.5, 0.5, 0.5, 0.5, 0.5, 0.5]

expectStatus: 200

thresholds:
  http_req_failed: ["rate<0.10"]
"#;

const SPIKE_YAML: &str = r#"# Spike: jump to 20x the normal rate, hold, then recover.
#
#   surge run surge.yaml --env BASE_URL=http://localhost:8080

scenarios:
  spike:
    executor: ramping-arrival-rate
    startRate: 50
    timeUnit: 1s
    preAllocatedVUs: 50
    maxVUs: 2000
    stages:
      - { target: 100, duration: 10s }
      - { target: 2000, duration: 10s }
      - { target: 2000, duration: 10s }
      - { target: 100, duration: 10s }

request:
  method: POST
  url: ${BASE_URL:-http://localhost:8080}/predict
  headers:
    Content-Type: application/json
  json:
    features: [0.5, 0.5, 0.5, 0.5, 0.5, 0.5, 0.5, 0.5, 0.5, 0.5]

thresholds:
  dropped_iterations: ["count<1"]
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run_support::EnvVars;
    use crate::scenario_yaml::parse_scenario_file;
    use surge_core::runner::{RunConfig, RunSettings, scenarios_from_options};

    #[test]
    fn every_template_is_a_valid_scenario_file() -> anyhow::Result<()> {
        for template in [Template::Load, Template::Stress, Template::Spike] {
            let file = parse_scenario_file(contents(template))?;
            let scenarios = scenarios_from_options(&file.options, &RunConfig::default())?;
            assert_eq!(scenarios.len(), 1, "{template:?}");
            RunSettings::from_options(&file.options, &RunConfig::default())?;

            let request =
                crate::request::StaticRequest::from_yaml(&file.requests[0], &EnvVars::new())?;
            assert_eq!(request.spec().url, "http://localhost:8080/predict");
        }
        Ok(())
    }
}
