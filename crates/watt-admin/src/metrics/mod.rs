//! Rolling per-runtime metric series, fed by a background poller.

mod aggregator;
mod parse;
mod store;

pub use aggregator::{AggregatorHandle, MetricsAggregator};
pub use parse::{RuntimeSnapshot, parse_snapshot};
pub use store::{MetricsStore, RecordedMetrics};
