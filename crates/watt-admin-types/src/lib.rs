//! Data model shared by the watt-admin server and its dashboard.
//!
//! Everything here is plain data with `serde` derives; field names follow the
//! camelCase shapes the dashboard frontend consumes.

mod api;
mod metrics;
mod recording;
mod runtime;

pub use api::{ApiError, HealthResponse, HealthStatus};
pub use metrics::{
    CpuPoint, LatencyPoint, MemoryPoint, MetricSample, MetricsResponse, RequestPoint, bytes_to_mb,
};
pub use recording::{ProfileKind, RecordMode, RecordRequest, RecordResponse, RecordStatusResponse, SessionMode};
pub use runtime::{Application, ApplicationStatus, ApplicationsResponse, Pid, Runtime, SelectableRuntime};
