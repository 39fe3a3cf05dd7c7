use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

/// Label recorded in the per-scenario error breakdown for a failed exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum HttpTransportErrorKind {
    InvalidUrl,
    UnsupportedScheme,
    InvalidRequest,
    Connect,
    Request,
    Timeout,
    Body,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("unsupported url scheme (want http or https): {0}")]
    UnsupportedScheme(String),

    #[error("invalid request: {0}")]
    InvalidRequest(#[from] http::Error),

    #[error("invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    #[error("invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    #[error("request failed: {0}")]
    Send(#[from] hyper_util::client::legacy::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("response body: {0}")]
    Body(#[from] hyper::Error),
}

impl Error {
    #[must_use]
    pub fn transport_error_kind(&self) -> HttpTransportErrorKind {
        use HttpTransportErrorKind as K;
        match self {
            Self::InvalidUrl(_) => K::InvalidUrl,
            Self::UnsupportedScheme(_) => K::UnsupportedScheme,
            Self::InvalidRequest(_) | Self::InvalidHeaderName(_) | Self::InvalidHeaderValue(_) => {
                K::InvalidRequest
            }
            Self::Send(e) if e.is_connect() => K::Connect,
            Self::Send(_) => K::Request,
            Self::Timeout(_) => K::Timeout,
            Self::Body(_) => K::Body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_errors_share_one_label() -> anyhow::Result<()> {
        let bad_name = match http::header::HeaderName::from_bytes(b"bad name") {
            Err(e) => Error::from(e),
            Ok(_) => anyhow::bail!("header name with a space should be rejected"),
        };
        assert_eq!(bad_name.transport_error_kind().to_string(), "invalid_request");
        Ok(())
    }

    #[test]
    fn timeout_label() {
        let err = Error::Timeout(Duration::from_millis(5));
        assert_eq!(err.transport_error_kind(), HttpTransportErrorKind::Timeout);
        assert_eq!(err.transport_error_kind().to_string(), "timeout");
    }
}
