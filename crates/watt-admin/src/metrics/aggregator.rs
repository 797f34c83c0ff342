use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, warn};
use watt_admin_types::Pid;

use super::parse::parse_snapshot;
use super::store::MetricsStore;
use crate::client::RuntimeClient;
use crate::util::time::now_ms;

/// Polls every runtime once per interval and feeds [`MetricsStore`].
#[derive(Clone)]
pub struct MetricsAggregator {
    client: Arc<dyn RuntimeClient>,
    store: Arc<MetricsStore>,
}

pub struct AggregatorHandle {
    stop_signal: Arc<Notify>,
    task: JoinHandle<()>,
}

impl AggregatorHandle {
    pub async fn stop(self) {
        self.stop_signal.notify_one();
        if let Err(e) = self.task.await {
            warn!(%e, "metrics poller ended abnormally");
        }
    }
}

impl MetricsAggregator {
    pub fn new(client: Arc<dyn RuntimeClient>, store: Arc<MetricsStore>) -> Self {
        Self { client, store }
    }

    pub fn store(&self) -> &Arc<MetricsStore> {
        &self.store
    }

    /// One sampling pass. A runtime whose poll fails gets no sample this
    /// tick; the others are unaffected.
    pub async fn tick(&self) {
        let runtimes = match self.client.list_runtimes().await {
            Ok(runtimes) => runtimes,
            Err(e) => {
                warn!(%e, "listing runtimes for metrics failed");
                self.store.evict_expired(now_ms());
                return;
            }
        };

        let sampled_at = now_ms();
        let mut polls = JoinSet::new();
        for runtime in &runtimes {
            let client = Arc::clone(&self.client);
            let pid = runtime.pid;
            polls.spawn(async move { (pid, client.get_metrics(pid).await) });
        }

        let mut snapshots = Vec::with_capacity(runtimes.len());
        while let Some(joined) = polls.join_next().await {
            match joined {
                Ok((pid, Ok(raw))) => snapshots.push((pid, parse_snapshot(sampled_at, &raw))),
                Ok((pid, Err(e))) => warn!(pid, %e, "metrics poll failed"),
                Err(e) => warn!(%e, "metrics poll task failed"),
            }
        }
        snapshots.sort_by_key(|(pid, _)| *pid);

        let live: Vec<Pid> = runtimes.iter().map(|runtime| runtime.pid).collect();
        debug!(runtimes = live.len(), sampled = snapshots.len(), "metrics tick");
        self.store.record_tick(now_ms(), snapshots, &live);
    }

    pub fn spawn(self, interval: Duration) -> AggregatorHandle {
        let stop_signal = Arc::new(Notify::new());
        let loop_stop = Arc::clone(&stop_signal);
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = loop_stop.notified() => break,
                    _ = tokio::time::sleep(interval) => self.tick().await,
                }
            }
        });
        AggregatorHandle { stop_signal, task }
    }
}
