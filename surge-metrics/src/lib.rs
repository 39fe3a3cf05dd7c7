pub mod aggregator;
pub mod histogram;
pub mod snapshot;
pub mod stats;

pub use aggregator::{Aggregator, Sample};
pub use histogram::{LatencyHistogram, LatencySummary};
pub use snapshot::{MetricsSnapshot, WindowCounts};
pub use stats::{RateSeries, per_sec};
