pub mod runner;

#[cfg(feature = "http")]
pub use surge_http::{
    HttpClient, HttpClientConfig, HttpRequest, HttpResponse, HttpTransportErrorKind,
};
pub use surge_metrics::{
    Aggregator, LatencySummary, MetricsSnapshot, RateSeries, Sample, WindowCounts,
};
