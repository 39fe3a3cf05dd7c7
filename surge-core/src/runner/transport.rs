use std::future::Future;

use bytes::Bytes;

/// One request to issue, produced fresh for every dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSpec {
    pub method: http::Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl RequestSpec {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: http::Method::GET,
            url: url.into(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }
}

/// Source of requests for a scenario.
pub trait RequestProducer: Send + Sync + 'static {
    fn produce(&self) -> RequestSpec;
}

impl<F> RequestProducer for F
where
    F: Fn() -> RequestSpec + Send + Sync + 'static,
{
    fn produce(&self) -> RequestSpec {
        self()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    /// Stable, low-cardinality key used in the error breakdown.
    pub kind: String,
    pub message: String,
}

/// Executes a single request/response exchange. Deadlines are imposed by the caller.
pub trait Transport: Send + Sync + 'static {
    fn execute(
        &self,
        spec: RequestSpec,
    ) -> impl Future<Output = Result<TransportResponse, TransportError>> + Send;
}

#[cfg(feature = "http")]
impl Transport for surge_http::HttpClient {
    fn execute(
        &self,
        spec: RequestSpec,
    ) -> impl Future<Output = Result<TransportResponse, TransportError>> + Send {
        let req = surge_http::HttpRequest {
            method: spec.method,
            url: spec.url,
            headers: spec.headers,
            body: spec.body,
            timeout: None,
        };

        async move {
            match self.request(req).await {
                Ok(res) => Ok(TransportResponse { status: res.status }),
                Err(err) => Err(TransportError {
                    kind: err.transport_error_kind().to_string(),
                    message: err.to_string(),
                }),
            }
        }
    }
}
