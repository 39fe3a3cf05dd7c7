use std::sync::Arc;

use surge_metrics::{Aggregator, Sample};
use tokio::time::Instant;

use super::outcome::{OutcomeStatus, RequestOutcome};

/// Turns request outcomes into aggregator samples for one scenario.
#[derive(Debug)]
pub struct OutcomeRecorder {
    aggregator: Arc<Aggregator>,
    run_started: Instant,
    expect_status: Option<u16>,
}

impl OutcomeRecorder {
    pub fn new(
        aggregator: Arc<Aggregator>,
        run_started: Instant,
        expect_status: Option<u16>,
    ) -> Self {
        Self {
            aggregator,
            run_started,
            expect_status,
        }
    }

    pub fn aggregator(&self) -> &Arc<Aggregator> {
        &self.aggregator
    }

    pub fn record(&self, outcome: &RequestOutcome) {
        let status = &outcome.status;
        let error_kind = status.error_kind();

        let check = self.expect_status.map(|want| match status {
            OutcomeStatus::Response { status } => *status == want,
            OutcomeStatus::TransportError { .. } | OutcomeStatus::Timeout => false,
        });

        self.aggregator.record(Sample {
            offset: outcome
                .start_time
                .saturating_duration_since(self.run_started),
            latency: outcome.duration,
            failed: status.is_failure(),
            error_kind: error_kind.as_deref(),
            check,
        });
    }

    pub fn record_drop(&self, at: Instant) {
        self.aggregator
            .record_drop(at.saturating_duration_since(self.run_started));
    }
}
