use std::time::Duration;

use bytes::Bytes;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// Bytes read from the (discarded) response body.
    pub body_len: u64,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: http::Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    /// Whole-exchange deadline, body included.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    fn new(method: http::Method, url: &str, body: Bytes) -> Self {
        Self {
            method,
            url: url.to_string(),
            headers: Vec::new(),
            body,
            timeout: None,
        }
    }

    pub fn get(url: &str) -> Self {
        Self::new(http::Method::GET, url, Bytes::new())
    }

    pub fn post(url: &str, body: Bytes) -> Self {
        Self::new(http::Method::POST, url, body)
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
