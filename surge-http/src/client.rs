use bytes::Bytes;
use http_body_util::{BodyExt as _, Full};
use hyper::Request;
use hyper::body::Incoming;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;

use super::{Error, HttpRequest, HttpResponse, Result};

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Bounds TCP connect; the OS default can stall a short run for tens of seconds.
    pub connect_timeout: Option<Duration>,
    pub pool_idle_timeout: Option<Duration>,
    /// Size this to the peak number of concurrent requests so keep-alive connections are reused.
    pub pool_max_idle_per_host: usize,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Some(Duration::from_secs(3)),
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: usize::MAX,
        }
    }
}

/// Keep-alive HTTP/1.1 client shared by all virtual users of a run. Cloning shares the pool.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new(&HttpClientConfig::default())
    }
}

impl HttpClient {
    #[must_use]
    pub fn new(config: &HttpClientConfig) -> Self {
        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false);
        http_connector.set_nodelay(true);
        http_connector.set_connect_timeout(config.connect_timeout);

        let https_connector = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector);

        let inner = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .build(https_connector);

        Self { inner }
    }

    /// Sends `req` and drains the response body without keeping it.
    pub async fn request(&self, req: HttpRequest) -> Result<HttpResponse> {
        let uri: http::Uri = req
            .url
            .parse()
            .map_err(|_| Error::InvalidUrl(req.url.clone()))?;
        match uri.scheme_str() {
            Some("http" | "https") => {}
            _ => return Err(Error::UnsupportedScheme(req.url)),
        }
        if uri.host().is_none() {
            return Err(Error::InvalidUrl(req.url));
        }

        let mut builder = Request::builder().method(req.method).uri(uri);
        for (k, v) in &req.headers {
            let name = http::header::HeaderName::from_bytes(k.as_bytes())?;
            let value = http::header::HeaderValue::from_str(v)?;
            builder = builder.header(name, value);
        }
        let request = builder.body(Full::new(req.body))?;

        let exchange = async {
            let res = self.inner.request(request).await?;
            let status = res.status().as_u16();
            let body_len = drain(res.into_body()).await?;
            Ok::<_, Error>(HttpResponse { status, body_len })
        };

        match req.timeout {
            Some(timeout) => tokio::time::timeout(timeout, exchange)
                .await
                .map_err(|_| Error::Timeout(timeout))?,
            None => exchange.await,
        }
    }

    pub async fn get(&self, url: &str) -> Result<HttpResponse> {
        self.request(HttpRequest::get(url)).await
    }
}

async fn drain(mut body: Incoming) -> Result<u64> {
    let mut len = 0u64;
    while let Some(frame) = body.frame().await {
        let frame = frame?;
        if let Some(data) = frame.data_ref() {
            len = len.saturating_add(data.len() as u64);
        }
    }
    Ok(len)
}
