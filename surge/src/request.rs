use anyhow::Context as _;
use bytes::Bytes;
use surge_core::runner::{RequestProducer, RequestSpec};

use crate::run_support::{EnvVars, interpolate};
use crate::scenario_yaml::RequestYaml;

/// The same request for every dispatch, resolved once before the run starts.
#[derive(Debug, Clone)]
pub(crate) struct StaticRequest {
    spec: RequestSpec,
}

impl StaticRequest {
    pub(crate) fn from_yaml(req: &RequestYaml, env: &EnvVars) -> anyhow::Result<Self> {
        let method = http::Method::from_bytes(req.method.trim().to_ascii_uppercase().as_bytes())
            .with_context(|| format!("invalid HTTP method: {}", req.method))?;

        let url = interpolate(&req.url, env).context("request url")?;
        let uri: http::Uri = url
            .parse()
            .with_context(|| format!("invalid request url: {url}"))?;
        if !matches!(uri.scheme_str(), Some("http" | "https")) || uri.host().is_none() {
            anyhow::bail!("request url must be absolute http(s): {url}");
        }

        let mut headers = req
            .headers
            .iter()
            .map(|(k, v)| {
                let v = interpolate(v, env).with_context(|| format!("request header `{k}`"))?;
                Ok((k.clone(), v))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let body = match (&req.body, &req.json) {
            (Some(_), Some(_)) => anyhow::bail!("request sets both `body` and `json`"),
            (Some(body), None) => Bytes::from(interpolate(body, env).context("request body")?),
            (None, Some(json)) => {
                let json = interpolate_json(json, env).context("request json")?;
                if !headers
                    .iter()
                    .any(|(k, _)| k.eq_ignore_ascii_case("content-type"))
                {
                    headers.push(("content-type".to_string(), "application/json".to_string()));
                }
                Bytes::from(serde_json::to_vec(&json).context("failed to encode request json")?)
            }
            (None, None) => Bytes::new(),
        };

        Ok(Self {
            spec: RequestSpec {
                method,
                url,
                headers,
                body,
            },
        })
    }

    pub(crate) fn spec(&self) -> &RequestSpec {
        &self.spec
    }
}

impl RequestProducer for StaticRequest {
    fn produce(&self) -> RequestSpec {
        self.spec.clone()
    }
}

/// Interpolates string leaves only, so substituted values never change the JSON structure.
fn interpolate_json(value: &serde_json::Value, env: &EnvVars) -> anyhow::Result<serde_json::Value> {
    use serde_json::Value;

    Ok(match value {
        Value::String(s) => Value::String(interpolate(s, env)?),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| interpolate_json(v, env))
                .collect::<anyhow::Result<_>>()?,
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| Ok((k.clone(), interpolate_json(v, env)?)))
                .collect::<anyhow::Result<_>>()?,
        ),
        other => other.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn env() -> EnvVars {
        [("BASE_URL", "http://localhost:8080"), ("TOKEN", "abc\"def")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn request(url: &str) -> RequestYaml {
        RequestYaml {
            method: "GET".to_string(),
            url: url.to_string(),
            headers: BTreeMap::new(),
            body: None,
            json: None,
        }
    }

    #[test]
    fn json_body_sets_content_type_and_keeps_structure() -> anyhow::Result<()> {
        let mut req = request("${BASE_URL}/predict");
        req.method = "post".to_string();
        req.json = Some(serde_json::json!({ "token": "${TOKEN}", "features": [0.5, 0.5] }));

        let built = StaticRequest::from_yaml(&req, &env())?;
        let spec = built.produce();

        assert_eq!(spec.method, http::Method::POST);
        assert_eq!(spec.url, "http://localhost:8080/predict");
        assert_eq!(
            spec.headers,
            vec![("content-type".to_string(), "application/json".to_string())]
        );

        let body: serde_json::Value = serde_json::from_slice(&spec.body)?;
        assert_eq!(body["token"], "abc\"def");
        assert_eq!(body["features"], serde_json::json!([0.5, 0.5]));
        Ok(())
    }

    #[test]
    fn explicit_content_type_is_kept() -> anyhow::Result<()> {
        let mut req = request("http://h/x");
        req.headers
            .insert("Content-Type".to_string(), "application/vnd.api+json".to_string());
        req.json = Some(serde_json::json!({}));

        let built = StaticRequest::from_yaml(&req, &env())?;
        assert_eq!(built.spec().headers.len(), 1);
        assert_eq!(built.spec().headers[0].1, "application/vnd.api+json");
        Ok(())
    }

    #[test]
    fn raw_body_and_headers_are_interpolated() -> anyhow::Result<()> {
        let mut req = request("http://h/x");
        req.headers
            .insert("Authorization".to_string(), "Bearer ${TOKEN}".to_string());
        req.body = Some("token=${TOKEN}".to_string());

        let built = StaticRequest::from_yaml(&req, &env())?;
        assert_eq!(
            built.spec().headers,
            vec![("Authorization".to_string(), "Bearer abc\"def".to_string())]
        );
        assert_eq!(&built.spec().body[..], b"token=abc\"def");
        Ok(())
    }

    #[test]
    fn invalid_requests_are_rejected() {
        let env = env();

        assert!(StaticRequest::from_yaml(&request("/relative"), &env).is_err());
        assert!(StaticRequest::from_yaml(&request("ftp://h/x"), &env).is_err());
        assert!(StaticRequest::from_yaml(&request("${UNDEFINED}/x"), &env).is_err());

        let mut bad_method = request("http://h/x");
        bad_method.method = "GE T".to_string();
        assert!(StaticRequest::from_yaml(&bad_method, &env).is_err());

        let mut both = request("http://h/x");
        both.body = Some("x".to_string());
        both.json = Some(serde_json::json!(1));
        assert!(StaticRequest::from_yaml(&both, &env).is_err());
    }
}
