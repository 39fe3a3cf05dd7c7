use std::collections::BTreeMap;

use anyhow::Context as _;

pub(crate) type EnvVars = BTreeMap<String, String>;

pub(crate) fn merged_env(overrides: &[String]) -> anyhow::Result<EnvVars> {
    let mut map: EnvVars = std::env::vars().collect();

    for raw in overrides {
        let (k, v) = parse_env_override(raw)?;
        map.insert(k, v);
    }

    Ok(map)
}

fn parse_env_override(s: &str) -> anyhow::Result<(String, String)> {
    let (k, v) = s
        .split_once('=')
        .with_context(|| format!("invalid --env (expected KEY=VALUE): {s}"))?;
    if k.is_empty() {
        anyhow::bail!("invalid --env (empty KEY): {s}");
    }
    Ok((k.to_string(), v.to_string()))
}

/// Expands `${NAME}` and `${NAME:-fallback}` from `env`. Undefined names without a fallback are
/// errors.
pub(crate) fn interpolate(input: &str, env: &EnvVars) -> anyhow::Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .with_context(|| format!("unterminated `${{` in: {input}"))?;

        let expr = &after[..end];
        let (name, fallback) = match expr.split_once(":-") {
            Some((name, fallback)) => (name, Some(fallback)),
            None => (expr, None),
        };
        if name.is_empty() {
            anyhow::bail!("empty variable name in: {input}");
        }

        match env.get(name).map(String::as_str).or(fallback) {
            Some(value) => out.push_str(value),
            None => anyhow::bail!("undefined variable `{name}` (set it or pass --env {name}=...)"),
        }

        rest = &after[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> EnvVars {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn overrides_win_over_process_env() -> anyhow::Result<()> {
        let map = merged_env(&["PATH=overridden".to_string(), "EMPTY=".to_string()])?;
        assert_eq!(map.get("PATH").map(String::as_str), Some("overridden"));
        assert_eq!(map.get("EMPTY").map(String::as_str), Some(""));
        Ok(())
    }

    #[test]
    fn env_override_requires_key_and_equals() {
        assert!(merged_env(&["NOEQUALS".to_string()]).is_err());
        assert!(merged_env(&["=value".to_string()]).is_err());
    }

    #[test]
    fn interpolate_replaces_every_reference() -> anyhow::Result<()> {
        let vars = env(&[("HOST", "localhost"), ("PORT", "8080")]);
        assert_eq!(
            interpolate("http://${HOST}:${PORT}/predict", &vars)?,
            "http://localhost:8080/predict"
        );
        assert_eq!(interpolate("no refs", &vars)?, "no refs");
        assert_eq!(interpolate("$HOST stays", &vars)?, "$HOST stays");
        Ok(())
    }

    #[test]
    fn interpolate_uses_fallback_only_when_unset() -> anyhow::Result<()> {
        let vars = env(&[("SET", "yes")]);
        assert_eq!(interpolate("${SET:-no}", &vars)?, "yes");
        assert_eq!(interpolate("${UNSET:-no}", &vars)?, "no");
        assert_eq!(interpolate("${UNSET:-}", &vars)?, "");
        Ok(())
    }

    #[test]
    fn interpolate_rejects_bad_references() {
        let vars = env(&[]);
        assert!(interpolate("${MISSING}", &vars).is_err());
        assert!(interpolate("${}", &vars).is_err());
        assert!(interpolate("${OPEN", &vars).is_err());
    }
}
