use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::warn;
use watt_admin_types::{MetricSample, MetricsResponse, Pid};

use super::parse::RuntimeSnapshot;

#[derive(Default)]
struct RuntimeSeries {
    aggregated: VecDeque<MetricSample>,
    applications: BTreeMap<String, VecDeque<MetricSample>>,
}

/// Samples gathered for the runtime being profiled, from `start` to `stop`.
struct Capture {
    pid: Pid,
    frames: VecDeque<RuntimeSnapshot>,
    max_frames: usize,
    overflowed: bool,
    total_frames_captured: u64,
}

impl Capture {
    fn new(pid: Pid, max_frames: usize) -> Self {
        Self {
            pid,
            frames: VecDeque::new(),
            max_frames: max_frames.max(1),
            overflowed: false,
            total_frames_captured: 0,
        }
    }
}

fn push_frame(capture: &mut Capture, frame: RuntimeSnapshot) {
    if capture.frames.len() >= capture.max_frames {
        capture.overflowed = true;
        capture.frames.pop_front();
    }
    capture.total_frames_captured += 1;
    capture.frames.push_back(frame);
}

/// Metrics section of a recording artifact.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecordedMetrics {
    pub aggregated: MetricsResponse,
    pub services: BTreeMap<String, MetricsResponse>,
}

impl RecordedMetrics {
    fn from_capture(capture: &Capture) -> Self {
        let aggregated: Vec<MetricSample> = capture.frames.iter().map(|f| f.aggregated).collect();
        let mut per_service: BTreeMap<String, Vec<MetricSample>> = BTreeMap::new();
        for frame in &capture.frames {
            for (id, sample) in &frame.applications {
                per_service.entry(id.clone()).or_default().push(*sample);
            }
        }
        Self {
            aggregated: MetricsResponse::from_samples(&aggregated),
            services: per_service
                .into_iter()
                .map(|(id, samples)| (id, MetricsResponse::from_samples(&samples)))
                .collect(),
        }
    }

    fn from_series(series: &RuntimeSeries) -> Self {
        let aggregated: Vec<MetricSample> = series.aggregated.iter().copied().collect();
        Self {
            aggregated: MetricsResponse::from_samples(&aggregated),
            services: series
                .applications
                .iter()
                .map(|(id, samples)| {
                    let samples: Vec<MetricSample> = samples.iter().copied().collect();
                    (id.clone(), MetricsResponse::from_samples(&samples))
                })
                .collect(),
        }
    }
}

#[derive(Default)]
struct StoreState {
    runtimes: HashMap<Pid, RuntimeSeries>,
    capture: Option<Capture>,
}

/// Time-windowed metric series for every known runtime.
///
/// Every mutation happens under one lock, so readers see a tick either fully
/// applied (appends and evictions) or not at all.
pub struct MetricsStore {
    retention_ms: i64,
    state: Mutex<StoreState>,
}

impl MetricsStore {
    pub fn new(retention: Duration) -> Self {
        Self {
            retention_ms: i64::try_from(retention.as_millis()).unwrap_or(i64::MAX),
            state: Mutex::new(StoreState::default()),
        }
    }

    /// Appends this tick's snapshots, forgets runtimes absent from `live_pids`,
    /// then evicts samples older than the retention window as of `now_ms`.
    pub fn record_tick(
        &self,
        now_ms: i64,
        snapshots: Vec<(Pid, RuntimeSnapshot)>,
        live_pids: &[Pid],
    ) {
        let mut state = self.state.lock();
        let StoreState { runtimes, capture } = &mut *state;

        for (pid, snapshot) in snapshots {
            let series = runtimes.entry(pid).or_default();
            append(&mut series.aggregated, snapshot.aggregated);
            for (id, sample) in &snapshot.applications {
                append(series.applications.entry(id.clone()).or_default(), *sample);
            }
            if let Some(capture) = capture.as_mut().filter(|c| c.pid == pid) {
                push_frame(capture, snapshot);
            }
        }

        runtimes.retain(|pid, _| live_pids.contains(pid));
        evict(runtimes, now_ms.saturating_sub(self.retention_ms));
    }

    /// Eviction alone, for ticks where the runtime list could not be read.
    pub fn evict_expired(&self, now_ms: i64) {
        let mut state = self.state.lock();
        evict(&mut state.runtimes, now_ms.saturating_sub(self.retention_ms));
    }

    pub fn series(&self, pid: Pid) -> Vec<MetricSample> {
        self.state
            .lock()
            .runtimes
            .get(&pid)
            .map(|series| series.aggregated.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn service_series(&self, pid: Pid, application_id: &str) -> Vec<MetricSample> {
        self.state
            .lock()
            .runtimes
            .get(&pid)
            .and_then(|series| series.applications.get(application_id))
            .map(|samples| samples.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Starts a fresh capture for `pid`, discarding any previous one.
    pub fn begin_capture(&self, pid: Pid, max_frames: usize) {
        self.state.lock().capture = Some(Capture::new(pid, max_frames));
    }

    /// Ends the capture and returns what it gathered for `pid`. Without a
    /// capture for that pid, the retained window is used instead.
    pub fn finish_capture(&self, pid: Pid) -> RecordedMetrics {
        let mut state = self.state.lock();
        match state.capture.take() {
            Some(capture) if capture.pid == pid => {
                if capture.overflowed {
                    warn!(
                        pid,
                        kept = capture.frames.len(),
                        captured = capture.total_frames_captured,
                        "recording outgrew its metric buffer; oldest samples dropped"
                    );
                }
                RecordedMetrics::from_capture(&capture)
            }
            _ => state
                .runtimes
                .get(&pid)
                .map(RecordedMetrics::from_series)
                .unwrap_or_default(),
        }
    }
}

fn append(series: &mut VecDeque<MetricSample>, mut sample: MetricSample) {
    if let Some(last) = series.back() {
        sample.timestamp = sample.timestamp.max(last.timestamp);
    }
    series.push_back(sample);
}

fn evict(runtimes: &mut HashMap<Pid, RuntimeSeries>, cutoff_ms: i64) {
    for series in runtimes.values_mut() {
        drop_older(&mut series.aggregated, cutoff_ms);
        series.applications.retain(|_, samples| {
            drop_older(samples, cutoff_ms);
            !samples.is_empty()
        });
    }
}

fn drop_older(series: &mut VecDeque<MetricSample>, cutoff_ms: i64) {
    while series.front().is_some_and(|s| s.timestamp < cutoff_ms) {
        series.pop_front();
    }
}
