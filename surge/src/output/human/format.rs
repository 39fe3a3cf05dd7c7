use std::time::Duration;

pub(crate) fn format_rate(v: f64) -> String {
    if v.is_finite() {
        format!("{v:.0}")
    } else {
        "0".to_string()
    }
}

/// Renders milliseconds with a unit that keeps ~3 significant digits.
pub(crate) fn format_ms(ms: f64) -> String {
    if !ms.is_finite() || ms < 0.0 {
        return "-".to_string();
    }
    if ms >= 1000.0 {
        return format!("{:.2}s", ms / 1000.0);
    }
    if ms >= 1.0 {
        return format!("{ms:.2}ms");
    }
    format!("{:.0}us", ms * 1000.0)
}

pub(crate) fn format_ms_opt(ms: Option<f64>) -> String {
    ms.map_or_else(|| "-".to_string(), format_ms)
}

pub(crate) fn format_percent(ratio: Option<f64>) -> String {
    match ratio {
        Some(r) if r.is_finite() => format!("{:.2}%", r * 100.0),
        _ => "-".to_string(),
    }
}

/// Single rounded component in one of: ms, s.
pub(crate) fn format_duration(d: Duration) -> String {
    let total_ms = d.as_millis();
    if total_ms >= 1000 {
        // Round to nearest second (ties round up).
        return format!("{}s", (total_ms + 500) / 1000);
    }
    format!("{total_ms}ms")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ms_picks_a_readable_unit() {
        assert_eq!(format_ms(0.25), "250us");
        assert_eq!(format_ms(12.346), "12.35ms");
        assert_eq!(format_ms(1500.0), "1.50s");
        assert_eq!(format_ms_opt(None), "-");
        assert_eq!(format_ms(f64::NAN), "-");
    }

    #[test]
    fn duration_rounds_to_one_component() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1499)), "1s");
        assert_eq!(format_duration(Duration::from_millis(1500)), "2s");
        assert_eq!(format_duration(Duration::from_secs(90)), "90s");
    }

    #[test]
    fn percent_and_rate() {
        assert_eq!(format_percent(Some(0.0125)), "1.25%");
        assert_eq!(format_percent(None), "-");
        assert_eq!(format_rate(199.6), "200");
        assert_eq!(format_rate(f64::INFINITY), "0");
    }
}
