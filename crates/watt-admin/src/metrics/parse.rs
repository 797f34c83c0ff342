use std::collections::BTreeMap;

use watt_admin_types::MetricSample;

use crate::client::{RawMetric, RawMetricValue};

const CPU: &str = "process_cpu_percent_usage";
const EVENT_LOOP_UTILIZATION: &str = "nodejs_eventloop_utilization";
const RSS: &str = "process_resident_memory_bytes";
const HEAP_USED: &str = "nodejs_heap_size_used_bytes";
const HEAP_TOTAL: &str = "nodejs_heap_size_total_bytes";
const HEAP_SPACE_USED: &str = "nodejs_heap_space_size_used_bytes";
const LATENCY: &str = "http_request_all_summary_seconds";
const REQUEST_COUNT: &str = "http_request_all_summary_seconds_count";

/// One poll of one runtime: the runtime-wide sample plus one per application.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuntimeSnapshot {
    pub aggregated: MetricSample,
    pub applications: BTreeMap<String, MetricSample>,
}

/// Folds a runtime's exported metric families into samples stamped `timestamp`.
///
/// Values labelled `applicationId` (or the older `serviceId`) belong to that
/// application. When any application is present the runtime-wide sample is
/// derived from them; otherwise the unlabelled values are used as-is.
pub fn parse_snapshot(timestamp: i64, metrics: &[RawMetric]) -> RuntimeSnapshot {
    let empty = MetricSample {
        timestamp,
        ..MetricSample::default()
    };
    let mut unlabelled = empty;
    let mut applications: BTreeMap<String, MetricSample> = BTreeMap::new();

    for metric in metrics {
        for value in &metric.values {
            if !value.value.is_finite() {
                continue;
            }
            let name = value.metric_name.as_deref().unwrap_or(&metric.name);
            let sample = match application_of(value) {
                Some(id) => applications.entry(id).or_insert(empty),
                None => &mut unlabelled,
            };
            apply(sample, name, value);
        }
    }

    let aggregated = if applications.is_empty() {
        unlabelled
    } else {
        aggregate(timestamp, &applications)
    };
    RuntimeSnapshot {
        aggregated,
        applications,
    }
}

fn application_of(value: &RawMetricValue) -> Option<String> {
    value
        .label("applicationId")
        .or_else(|| value.label("serviceId"))
}

fn apply(sample: &mut MetricSample, name: &str, value: &RawMetricValue) {
    let v = value.value;
    match name {
        CPU => sample.cpu = v,
        EVENT_LOOP_UTILIZATION => sample.event_loop_delay = v * 100.0,
        RSS => sample.rss = whole(v),
        HEAP_USED => sample.heap_used = whole(v),
        HEAP_TOTAL => sample.heap_total = whole(v),
        HEAP_SPACE_USED => match value.label("space").as_deref() {
            Some("new") => sample.new_space = whole(v),
            Some("old") => sample.old_space = whole(v),
            _ => {}
        },
        LATENCY => {
            let ms = v * 1000.0;
            match value.label("quantile").as_deref() {
                Some("0.9") => sample.latency_p90 = ms,
                Some("0.95") => sample.latency_p95 = ms,
                Some("0.99") => sample.latency_p99 = ms,
                _ => {}
            }
        }
        REQUEST_COUNT => sample.request_count += whole(v),
        _ => {}
    }
}

fn whole(v: f64) -> u64 {
    if v <= 0.0 { 0 } else { v as u64 }
}

/// Rates and latencies are averaged; heap and request counts add up. RSS is
/// a process figure that every application reports identically, so it is
/// the maximum rather than a sum.
fn aggregate(timestamp: i64, applications: &BTreeMap<String, MetricSample>) -> MetricSample {
    let n = applications.len() as f64;
    let mut out = MetricSample {
        timestamp,
        ..MetricSample::default()
    };
    for sample in applications.values() {
        out.cpu += sample.cpu / n;
        out.event_loop_delay += sample.event_loop_delay / n;
        out.latency_p90 += sample.latency_p90 / n;
        out.latency_p95 += sample.latency_p95 / n;
        out.latency_p99 += sample.latency_p99 / n;
        out.rss = out.rss.max(sample.rss);
        out.heap_used += sample.heap_used;
        out.heap_total += sample.heap_total;
        out.new_space += sample.new_space;
        out.old_space += sample.old_space;
        out.request_count += sample.request_count;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric(name: &str, values: Vec<RawMetricValue>) -> RawMetric {
        RawMetric {
            name: name.to_owned(),
            values,
        }
    }

    fn app(id: &str, value: f64) -> RawMetricValue {
        RawMetricValue::new(value).with_label("applicationId", id)
    }

    #[test]
    fn unlabelled_values_form_the_runtime_sample() {
        let snapshot = parse_snapshot(
            10,
            &[
                metric(CPU, vec![RawMetricValue::new(12.5)]),
                metric(EVENT_LOOP_UTILIZATION, vec![RawMetricValue::new(0.25)]),
                metric(RSS, vec![RawMetricValue::new(2_621_440.0)]),
            ],
        );
        assert!(snapshot.applications.is_empty());
        assert_eq!(snapshot.aggregated.timestamp, 10);
        assert_eq!(snapshot.aggregated.cpu, 12.5);
        assert_eq!(snapshot.aggregated.event_loop_delay, 25.0);
        assert_eq!(snapshot.aggregated.rss, 2_621_440);
    }

    #[test]
    fn per_application_values_are_split_and_combined() {
        let snapshot = parse_snapshot(
            0,
            &[
                metric(CPU, vec![app("api", 10.0), app("web", 30.0)]),
                metric(RSS, vec![app("api", 100.0), app("web", 100.0)]),
                metric(HEAP_USED, vec![app("api", 40.0), app("web", 60.0)]),
                metric(
                    HEAP_SPACE_USED,
                    vec![
                        app("api", 5.0).with_label("space", "new"),
                        app("api", 7.0).with_label("space", "old"),
                        app("api", 99.0).with_label("space", "code"),
                    ],
                ),
            ],
        );
        let api = snapshot.applications["api"];
        assert_eq!(api.cpu, 10.0);
        assert_eq!(api.new_space, 5);
        assert_eq!(api.old_space, 7);

        let all = snapshot.aggregated;
        assert_eq!(all.cpu, 20.0);
        assert_eq!(all.rss, 100);
        assert_eq!(all.heap_used, 100);
    }

    #[test]
    fn service_id_label_is_accepted() {
        let snapshot = parse_snapshot(
            0,
            &[metric(
                CPU,
                vec![RawMetricValue::new(3.0).with_label("serviceId", "legacy")],
            )],
        );
        assert_eq!(snapshot.applications["legacy"].cpu, 3.0);
    }

    #[test]
    fn latency_quantiles_convert_to_milliseconds_and_counts_add_up() {
        let snapshot = parse_snapshot(
            0,
            &[metric(
                LATENCY,
                vec![
                    app("api", 0.010).with_label("quantile", 0.9),
                    app("api", 0.020).with_label("quantile", 0.95),
                    app("api", 0.050).with_label("quantile", 0.99),
                    app("api", 4.0).with_label("method", "GET").named(REQUEST_COUNT),
                    app("api", 3.0).with_label("method", "POST").named(REQUEST_COUNT),
                    app("api", 1.5).named("http_request_all_summary_seconds_sum"),
                ],
            )],
        );
        let api = snapshot.applications["api"];
        assert!((api.latency_p90 - 10.0).abs() < 1e-9);
        assert!((api.latency_p95 - 20.0).abs() < 1e-9);
        assert!((api.latency_p99 - 50.0).abs() < 1e-9);
        assert_eq!(api.request_count, 7);
    }

    #[test]
    fn unknown_families_are_ignored() {
        let snapshot = parse_snapshot(5, &[metric("up", vec![RawMetricValue::new(1.0)])]);
        assert_eq!(
            snapshot.aggregated,
            MetricSample {
                timestamp: 5,
                ..MetricSample::default()
            }
        );
    }
}
