use std::collections::BTreeMap;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

const TEMPLATE: &str = "{prefix:>12} {bar:24.green/white} {percent:>3}% {msg}";

/// Stderr progress bars, one per scenario, measured in elapsed milliseconds.
pub(crate) struct HumanProgress {
    multi: MultiProgress,
    bars: BTreeMap<String, ProgressBar>,
}

impl HumanProgress {
    pub(crate) fn new<'a>(scenarios: impl IntoIterator<Item = (&'a str, Duration)>) -> Self {
        let multi = MultiProgress::with_draw_target(ProgressDrawTarget::stderr_with_hz(5));
        let style = ProgressStyle::with_template(TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");

        let bars = scenarios
            .into_iter()
            .map(|(name, total)| {
                let bar = multi.add(ProgressBar::new(millis(total)));
                bar.set_style(style.clone());
                bar.set_prefix(name.to_string());
                (name.to_string(), bar)
            })
            .collect();

        Self { multi, bars }
    }

    pub(crate) fn update(&self, scenario: &str, elapsed: Duration, message: String) {
        if let Some(bar) = self.bars.get(scenario) {
            let len = bar.length().unwrap_or(0);
            bar.set_position(millis(elapsed).min(len));
            bar.set_message(message);
        }
    }

    pub(crate) fn finish(&self) {
        for bar in self.bars.values() {
            bar.finish_and_clear();
        }
        let _ = self.multi.clear();
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn updates_for_unknown_scenarios_are_ignored() {
        let progress = HumanProgress::new([("steady", Duration::from_secs(10))]);
        progress.update("steady", Duration::from_secs(20), "late".to_string());
        progress.update("missing", Duration::from_secs(1), "ignored".to_string());

        let bar = &progress.bars["steady"];
        assert_eq!(bar.position(), 10_000);
        assert_eq!(bar.message(), "late");
        progress.finish();
    }
}
