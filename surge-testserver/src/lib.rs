//! In-process stand-in for the fraud-scoring API that load scenarios target.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Duration, sleep};

#[derive(Debug, Default)]
struct Counters {
    requests: AtomicU64,
    json_bodies: AtomicU64,
}

/// Shared request counters; clones observe the same totals.
#[derive(Debug, Clone, Default)]
pub struct TestServerStats(Arc<Counters>);

impl TestServerStats {
    fn hit(&self) {
        self.0.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests_total(&self) -> u64 {
        self.0.requests.load(Ordering::Relaxed)
    }

    /// Requests whose `content-type` was `application/json`.
    pub fn saw_json_content_type(&self) -> u64 {
        self.0.json_bodies.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TestServerOptions {
    /// Added to every `/predict` answer to mimic model inference.
    pub inference_latency: Duration,
}

#[derive(Clone)]
struct AppState {
    stats: TestServerStats,
    opts: TestServerOptions,
}

#[derive(Debug, Clone)]
pub struct TestServerUrls {
    pub base_url: String,
    pub health: String,
    pub predict: String,
    pub hang: String,
}

impl TestServerUrls {
    fn new(addr: SocketAddr) -> Self {
        let base_url = format!("http://{addr}");
        Self {
            health: format!("{base_url}/health"),
            predict: format!("{base_url}/predict"),
            hang: format!("{base_url}/hang"),
            base_url,
        }
    }

    /// URL that always answers with `code`.
    pub fn status(&self, code: u16) -> String {
        format!("{}/status/{code}", self.base_url)
    }
}

#[derive(Deserialize)]
struct PredictRequest {
    features: Vec<f64>,
}

#[derive(Serialize)]
struct PredictResponse {
    fraud_score: f64,
    is_fraud: bool,
    inference_time_ms: f64,
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

async fn health(State(app): State<AppState>) -> Json<Health> {
    app.stats.hit();
    Json(Health { status: "healthy" })
}

async fn predict(
    State(app): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<PredictResponse>, StatusCode> {
    let started = Instant::now();
    app.stats.hit();

    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().starts_with("application/json"));
    if is_json {
        app.stats.0.json_bodies.fetch_add(1, Ordering::Relaxed);
    }

    let req: PredictRequest =
        serde_json::from_slice(&body).map_err(|_| StatusCode::UNPROCESSABLE_ENTITY)?;
    if req.features.is_empty() {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }

    if !app.opts.inference_latency.is_zero() {
        sleep(app.opts.inference_latency).await;
    }

    // Logistic over the feature mean; deterministic so tests can reason about it.
    let mean = req.features.iter().sum::<f64>() / req.features.len() as f64;
    let fraud_score = 1.0 / (1.0 + (-(mean - 0.5) * 8.0).exp());

    Ok(Json(PredictResponse {
        fraud_score,
        is_fraud: fraud_score > 0.5,
        inference_time_ms: started.elapsed().as_secs_f64() * 1000.0,
    }))
}

async fn fixed_status(State(app): State<AppState>, Path(code): Path<u16>) -> StatusCode {
    app.stats.hit();
    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST)
}

async fn hang(State(app): State<AppState>) -> StatusCode {
    app.stats.hit();
    sleep(Duration::from_secs(3600)).await;
    StatusCode::GATEWAY_TIMEOUT
}

pub fn router(stats: TestServerStats, opts: TestServerOptions) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/predict", post(predict))
        .route("/status/{code}", get(fixed_status).post(fixed_status))
        .route("/hang", get(hang).post(hang))
        .with_state(AppState { stats, opts })
}

/// Serves the router on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    stats: TestServerStats,
    opts: TestServerOptions,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(listener, router(stats, opts))
        .with_graceful_shutdown(shutdown)
        .await
}

/// Server bound to an ephemeral localhost port for the lifetime of a test.
pub struct TestServer {
    urls: TestServerUrls,
    stats: TestServerStats,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl TestServer {
    pub async fn start() -> std::io::Result<Self> {
        Self::start_with(TestServerOptions::default()).await
    }

    pub async fn start_with(opts: TestServerOptions) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let urls = TestServerUrls::new(listener.local_addr()?);
        let stats = TestServerStats::default();

        let (stop, stopped) = oneshot::channel::<()>();
        let server_stats = stats.clone();
        let task = tokio::spawn(async move {
            let stopped = async move {
                let _ = stopped.await;
            };
            let _ = serve(listener, server_stats, opts, stopped).await;
        });

        Ok(Self {
            urls,
            stats,
            stop: Some(stop),
            task: Some(task),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.urls.base_url
    }

    pub fn urls(&self) -> &TestServerUrls {
        &self.urls
    }

    pub fn stats(&self) -> &TestServerStats {
        &self.stats
    }

    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }

        // Graceful shutdown waits on open connections, and `/hang` holds one for an hour.
        if let Some(mut task) = self.task.take()
            && tokio::time::timeout(Duration::from_secs(2), &mut task)
                .await
                .is_err()
        {
            task.abort();
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
