use std::borrow::Cow;
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeStatus {
    /// The transport returned a response (any status code).
    Response { status: u16 },
    TransportError { kind: String },
    /// The per-request deadline elapsed, or the request was still running when the drain
    /// timeout expired.
    Timeout,
}

impl OutcomeStatus {
    /// Everything except a 2xx response is a failed request.
    pub fn is_failure(&self) -> bool {
        !matches!(self, Self::Response { status } if (200..300).contains(status))
    }

    /// Breakdown key for failed outcomes (`status_503`, `connect`, `timeout`, ...).
    pub fn error_kind(&self) -> Option<Cow<'_, str>> {
        match self {
            Self::Response { status } if (200..300).contains(status) => None,
            Self::Response { status } => Some(Cow::Owned(format!("status_{status}"))),
            Self::TransportError { kind } => Some(Cow::Borrowed(kind.as_str())),
            Self::Timeout => Some(Cow::Borrowed("timeout")),
        }
    }
}

/// Result of exactly one dispatched request.
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    pub vu_id: u64,
    pub start_time: Instant,
    pub duration: Duration,
    pub status: OutcomeStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_failures() {
        assert!(!OutcomeStatus::Response { status: 204 }.is_failure());
        assert!(OutcomeStatus::Response { status: 302 }.is_failure());
        assert!(OutcomeStatus::Response { status: 503 }.is_failure());
        assert!(OutcomeStatus::Timeout.is_failure());
        assert!(
            OutcomeStatus::TransportError {
                kind: "connect".to_string()
            }
            .is_failure()
        );
    }

    #[test]
    fn error_kinds() {
        assert_eq!(OutcomeStatus::Response { status: 200 }.error_kind(), None);
        assert_eq!(
            OutcomeStatus::Response { status: 503 }.error_kind().as_deref(),
            Some("status_503")
        );
        assert_eq!(
            OutcomeStatus::Timeout.error_kind().as_deref(),
            Some("timeout")
        );
        assert_eq!(
            OutcomeStatus::TransportError {
                kind: "connect".to_string()
            }
            .error_kind()
            .as_deref(),
            Some("connect")
        );
    }
}
