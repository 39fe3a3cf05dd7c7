use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use serde::Deserialize;
use surge_core::runner::{DEFAULT_SCENARIO_NAME, RunOptions, ScenarioOptions, Stage, ThresholdSet};

/// One scenario as written in the file. Top-level keys of a multi-scenario file use the same
/// shape and act as defaults for every entry under `scenarios`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ScenarioYaml {
    pub name: Option<String>,

    /// constant-arrival-rate | ramping-arrival-rate
    pub executor: Option<String>,

    // constant-arrival-rate
    pub rate: Option<u64>,
    pub duration: Option<YamlDuration>,

    // ramping-arrival-rate
    pub start_rate: Option<u64>,
    #[serde(default)]
    pub stages: Vec<StageYaml>,

    pub time_unit: Option<YamlDuration>,

    #[serde(rename = "preAllocatedVUs")]
    pub pre_allocated_vus: Option<u64>,

    #[serde(rename = "maxVUs")]
    pub max_vus: Option<u64>,

    pub graceful_stop: Option<YamlDuration>,
    pub request_timeout: Option<YamlDuration>,
    pub idle_vu_grace: Option<YamlDuration>,

    /// Status a response must carry to pass the scenario's check.
    pub expect_status: Option<u16>,

    pub request: Option<RequestYaml>,
}

impl ScenarioYaml {
    fn with_defaults(self, d: &ScenarioYaml) -> Self {
        Self {
            name: self.name,
            executor: self.executor.or_else(|| d.executor.clone()),
            rate: self.rate.or(d.rate),
            duration: self.duration.or(d.duration),
            start_rate: self.start_rate.or(d.start_rate),
            stages: if self.stages.is_empty() {
                d.stages.clone()
            } else {
                self.stages
            },
            time_unit: self.time_unit.or(d.time_unit),
            pre_allocated_vus: self.pre_allocated_vus.or(d.pre_allocated_vus),
            max_vus: self.max_vus.or(d.max_vus),
            graceful_stop: self.graceful_stop.or(d.graceful_stop),
            request_timeout: self.request_timeout.or(d.request_timeout),
            idle_vu_grace: self.idle_vu_grace.or(d.idle_vu_grace),
            expect_status: self.expect_status.or(d.expect_status),
            request: self.request.or_else(|| d.request.clone()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StageYaml {
    pub target: u64,
    pub duration: YamlDuration,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RequestYaml {
    #[serde(default = "default_method")]
    pub method: String,
    pub url: String,
    #[serde(default, deserialize_with = "deserialize_headers")]
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    /// Serialized as the body; implies `content-type: application/json` unless set.
    pub json: Option<serde_json::Value>,
}

fn default_method() -> String {
    "GET".to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct YamlDuration(Duration);

impl YamlDuration {
    fn into_inner(self) -> Duration {
        self.0
    }
}

impl<'de> Deserialize<'de> for YamlDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl serde::de::Visitor<'_> for V {
            type Value = YamlDuration;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str(
                    "duration as string (e.g. 10s, 1m30s), integer seconds, or float seconds",
                )
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(YamlDuration(Duration::from_secs(v)))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                u64::try_from(v)
                    .map(|secs| YamlDuration(Duration::from_secs(secs)))
                    .map_err(|_| E::custom("duration must not be negative"))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Duration::try_from_secs_f64(v)
                    .map(YamlDuration)
                    .map_err(|_| E::custom("duration must be a non-negative, finite number"))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let d = humantime::parse_duration(v.trim()).map_err(E::custom)?;
                Ok(YamlDuration(d))
            }
        }

        deserializer.deserialize_any(V)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ScenariosYaml {
    Named(BTreeMap<String, ScenarioYaml>),
    List(Vec<ScenarioYaml>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ThresholdExprYaml {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScenarioDocYaml {
    scenarios: Option<ScenariosYaml>,

    #[serde(default)]
    thresholds: BTreeMap<String, ThresholdExprYaml>,

    #[serde(default)]
    drops_count_as_failed: bool,

    #[serde(flatten)]
    defaults: ScenarioYaml,
}

/// A parsed scenario file: run options plus, index-aligned with `options.scenarios`, the request
/// each scenario sends.
#[derive(Debug, Clone)]
pub(crate) struct ScenarioFile {
    pub options: RunOptions,
    pub requests: Vec<RequestYaml>,
}

fn deserialize_headers<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = BTreeMap::<String, serde_yaml::Value>::deserialize(deserializer)?;
    let mut out = BTreeMap::new();

    for (k, v) in raw {
        let s = match v {
            serde_yaml::Value::Bool(b) => b.to_string(),
            serde_yaml::Value::Number(n) => n.to_string(),
            serde_yaml::Value::String(s) => s,
            _ => {
                return Err(serde::de::Error::custom(format!(
                    "header `{k}` must be a string, number or bool"
                )));
            }
        };
        out.insert(k, s);
    }

    Ok(out)
}

pub fn looks_like_yaml_path(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|s| s.to_str()).map(|s| s.to_ascii_lowercase()),
        Some(ext) if ext == "yml" || ext == "yaml"
    )
}

pub(crate) async fn load_scenario_file(path: &Path) -> anyhow::Result<ScenarioFile> {
    if !looks_like_yaml_path(path) {
        anyhow::bail!(
            "unsupported scenario file (expected .yaml or .yml): {}",
            path.display()
        );
    }

    let src = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read scenario file: {}", path.display()))?;

    parse_scenario_file(&src).with_context(|| format!("invalid scenario file: {}", path.display()))
}

pub(crate) fn parse_scenario_file(src: &str) -> anyhow::Result<ScenarioFile> {
    let doc: ScenarioDocYaml = serde_yaml::from_str(src).context("failed to parse YAML")?;

    let ScenarioDocYaml {
        scenarios,
        thresholds,
        drops_count_as_failed,
        defaults,
    } = doc;

    let named: Vec<(String, ScenarioYaml)> = match scenarios {
        None => {
            let name = defaults
                .name
                .clone()
                .unwrap_or_else(|| DEFAULT_SCENARIO_NAME.to_string());
            vec![(name, defaults)]
        }
        Some(ScenariosYaml::Named(map)) => map
            .into_iter()
            .map(|(name, s)| (name, s.with_defaults(&defaults)))
            .collect(),
        Some(ScenariosYaml::List(list)) => list
            .into_iter()
            .enumerate()
            .map(|(idx, s)| {
                let name = s
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("scenario_{}", idx + 1));
                (name, s.with_defaults(&defaults))
            })
            .collect(),
    };

    let mut scenarios = Vec::with_capacity(named.len());
    let mut requests = Vec::with_capacity(named.len());
    for (name, scenario) in named {
        let (options, request) = scenario_yaml_into_options(scenario, name)?;
        scenarios.push(options);
        requests.push(request);
    }

    Ok(ScenarioFile {
        options: RunOptions {
            scenarios,
            thresholds: parse_thresholds_map(thresholds),
            drops_count_as_failed,
        },
        requests,
    })
}

fn scenario_yaml_into_options(
    scenario: ScenarioYaml,
    name: String,
) -> anyhow::Result<(ScenarioOptions, RequestYaml)> {
    let ScenarioYaml {
        name: _,
        executor,
        rate,
        duration,
        start_rate,
        stages,
        time_unit,
        pre_allocated_vus,
        max_vus,
        graceful_stop,
        request_timeout,
        idle_vu_grace,
        expect_status,
        request,
    } = scenario;

    let request = request.with_context(|| format!("scenario `{name}` has no `request`"))?;

    let options = ScenarioOptions {
        name,
        executor,
        time_unit: time_unit.map(YamlDuration::into_inner),
        pre_allocated_vus,
        max_vus,
        rate,
        duration: duration.map(YamlDuration::into_inner),
        start_rate,
        stages: stages
            .into_iter()
            .map(|s| Stage {
                duration: s.duration.into_inner(),
                target: s.target,
            })
            .collect(),
        graceful_stop: graceful_stop.map(YamlDuration::into_inner),
        request_timeout: request_timeout.map(YamlDuration::into_inner),
        idle_vu_grace: idle_vu_grace.map(YamlDuration::into_inner),
        expect_status,
    };

    Ok((options, request))
}

fn parse_thresholds_map(raw: BTreeMap<String, ThresholdExprYaml>) -> Vec<ThresholdSet> {
    raw.into_iter()
        .map(|(metric, exprs)| ThresholdSet {
            metric,
            expressions: match exprs {
                ThresholdExprYaml::One(s) => vec![s],
                ThresholdExprYaml::Many(v) => v,
            },
        })
        .collect()
}
