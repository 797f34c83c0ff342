use serde::{Deserialize, Serialize};

/// One point-in-time reading for a runtime or one of its applications.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSample {
    /// Unix milliseconds at which the sample was taken.
    pub timestamp: i64,
    /// Process CPU usage, percent.
    pub cpu: f64,
    /// Event loop utilization, percent.
    pub event_loop_delay: f64,
    pub rss: u64,
    pub heap_used: u64,
    pub heap_total: u64,
    pub new_space: u64,
    pub old_space: u64,
    /// Request latency quantiles, milliseconds.
    pub latency_p90: f64,
    pub latency_p95: f64,
    pub latency_p99: f64,
    pub request_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuPoint {
    pub date: i64,
    pub cpu: f64,
    pub event_loop: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyPoint {
    pub date: i64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

/// Memory readings in MB, two decimals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryPoint {
    pub date: i64,
    pub rss: f64,
    pub total_heap: f64,
    pub used_heap: f64,
    pub new_space: f64,
    pub old_space: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RequestPoint {
    pub date: i64,
    pub count: u64,
}

/// Chart-ready series for `GET /runtimes/{pid}/metrics[/{serviceId}]`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsResponse {
    pub data_cpu: Vec<CpuPoint>,
    pub data_latency: Vec<LatencyPoint>,
    pub data_mem: Vec<MemoryPoint>,
    pub data_req: Vec<RequestPoint>,
}

impl MetricsResponse {
    pub fn from_samples(samples: &[MetricSample]) -> Self {
        let mut response = Self::default();
        for sample in samples {
            let date = sample.timestamp;
            response.data_cpu.push(CpuPoint {
                date,
                cpu: sample.cpu,
                event_loop: sample.event_loop_delay,
            });
            response.data_latency.push(LatencyPoint {
                date,
                p90: sample.latency_p90,
                p95: sample.latency_p95,
                p99: sample.latency_p99,
            });
            response.data_mem.push(MemoryPoint {
                date,
                rss: bytes_to_mb(sample.rss),
                total_heap: bytes_to_mb(sample.heap_total),
                used_heap: bytes_to_mb(sample.heap_used),
                new_space: bytes_to_mb(sample.new_space),
                old_space: bytes_to_mb(sample.old_space),
            });
            response.data_req.push(RequestPoint {
                date,
                count: sample.request_count,
            });
        }
        response
    }
}

/// Bytes to MB (2^20), rounded to two decimals.
pub fn bytes_to_mb(bytes: u64) -> f64 {
    let mb = bytes as f64 / (1024.0 * 1024.0);
    (mb * 100.0).round() / 100.0
}
