use std::collections::BTreeMap;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Serialize, Serializer};
use tracing::{debug, info, warn};
use watt_admin_types::{ApplicationsResponse, Pid, ProfileKind, SelectableRuntime};

use crate::client::{ClientError, RuntimeClient};
use crate::metrics::{MetricsStore, RecordedMetrics};
use crate::runtimes::RuntimeDirectory;

#[derive(Debug, thiserror::Error)]
pub enum ProfilingError {
    #[error("starting {kind} profiling of {application_id} in runtime {pid}: {source}")]
    Start {
        pid: Pid,
        application_id: String,
        kind: ProfileKind,
        #[source]
        source: ClientError,
    },
    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Everything an artifact shows: `window.LOADED_JSON`.
#[derive(Debug, Clone, Serialize)]
pub struct RecordingPayload {
    pub runtimes: Vec<SelectableRuntime>,
    pub services: ApplicationsResponse,
    pub metrics: RecordedMetrics,
    /// Raw profile per application id, base64 on the wire.
    #[serde(serialize_with = "serialize_buffers")]
    pub profile: BTreeMap<String, Vec<u8>>,
    #[serde(rename = "type")]
    pub kind: ProfileKind,
}

fn serialize_buffers<S>(buffers: &BTreeMap<String, Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_map(
        buffers
            .iter()
            .map(|(id, bytes)| (id, STANDARD.encode(bytes))),
    )
}

/// Starts and stops profiling across every application of one runtime.
#[derive(Clone)]
pub struct ProfilingCoordinator {
    client: Arc<dyn RuntimeClient>,
    directory: RuntimeDirectory,
    metrics: Arc<MetricsStore>,
    max_samples: usize,
}

impl ProfilingCoordinator {
    pub fn new(
        client: Arc<dyn RuntimeClient>,
        directory: RuntimeDirectory,
        metrics: Arc<MetricsStore>,
        max_samples: usize,
    ) -> Self {
        Self {
            client,
            directory,
            metrics,
            max_samples,
        }
    }

    /// Starts `kind` profiling on every application, one after the other.
    ///
    /// All or nothing: if one start fails, the applications already started
    /// are stopped again (best effort) and the error is returned. On success
    /// the started application ids are returned and metric capture begins.
    pub async fn begin(&self, pid: Pid, kind: ProfileKind) -> Result<Vec<String>, ProfilingError> {
        let topology = self.client.get_applications(pid).await?;
        let mut started: Vec<String> = Vec::with_capacity(topology.applications.len());

        for application in &topology.applications {
            if let Err(source) = self
                .client
                .start_profiling(pid, &application.id, kind, true)
                .await
            {
                self.roll_back(pid, kind, &started).await;
                return Err(ProfilingError::Start {
                    pid,
                    application_id: application.id.clone(),
                    kind,
                    source,
                });
            }
            debug!(pid, application_id = %application.id, %kind, "profiling started");
            started.push(application.id.clone());
        }

        self.metrics.begin_capture(pid, self.max_samples);
        info!(pid, %kind, applications = started.len(), "recording started");
        Ok(started)
    }

    async fn roll_back(&self, pid: Pid, kind: ProfileKind, started: &[String]) {
        for application_id in started {
            if let Err(e) = self.client.stop_profiling(pid, application_id, kind).await {
                warn!(pid, %application_id, %e, "failed to stop profiling after aborted start");
            }
        }
    }

    /// Stops profiling on `applications` and assembles the artifact payload.
    ///
    /// Every stop is sent before anything else is asked of the runtime, so a
    /// failed lookup never leaves a profiler running. An application whose
    /// stop fails is logged and left out of `profile`; the runtime listing
    /// and topology lookups that follow are required.
    pub async fn end(
        &self,
        pid: Pid,
        kind: ProfileKind,
        applications: &[String],
    ) -> Result<RecordingPayload, ProfilingError> {
        let mut profile = BTreeMap::new();
        for application_id in applications {
            match self.client.stop_profiling(pid, application_id, kind).await {
                Ok(bytes) => {
                    debug!(pid, %application_id, bytes = bytes.len(), "profile collected");
                    profile.insert(application_id.clone(), bytes);
                }
                Err(e) => warn!(pid, %application_id, %e, "failed to stop profiling"),
            }
        }
        let metrics = self.metrics.finish_capture(pid);

        let runtimes = self.directory.list_selectable(false).await?;
        let services = self.client.get_applications(pid).await?;

        Ok(RecordingPayload {
            runtimes,
            services,
            metrics,
            profile,
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use watt_admin_types::Runtime;

    use super::*;
    use crate::client::fake::{Call, FakeRuntimeClient};

    const PID: Pid = 42;

    fn coordinator(client: Arc<FakeRuntimeClient>) -> ProfilingCoordinator {
        let directory = RuntimeDirectory::new(client.clone(), 1, None);
        let metrics = Arc::new(MetricsStore::new(Duration::from_secs(600)));
        ProfilingCoordinator::new(client, directory, metrics, 100)
    }

    fn fleet() -> Arc<FakeRuntimeClient> {
        Arc::new(FakeRuntimeClient::new().with_runtime(Runtime::new(PID, "shop", 0), &["api", "web"]))
    }

    #[tokio::test]
    async fn begin_starts_every_application_with_source_maps() {
        let client = fleet();
        let started = coordinator(client.clone())
            .begin(PID, ProfileKind::Cpu)
            .await
            .expect("begin");
        assert_eq!(started, vec!["api", "web"]);
        assert_eq!(
            client.calls(),
            vec![
                Call::StartProfiling {
                    pid: PID,
                    application_id: "api".into(),
                    kind: ProfileKind::Cpu,
                    source_maps: true,
                },
                Call::StartProfiling {
                    pid: PID,
                    application_id: "web".into(),
                    kind: ProfileKind::Cpu,
                    source_maps: true,
                },
            ]
        );
    }

    #[tokio::test]
    async fn failed_begin_stops_what_it_started() {
        let client = fleet();
        client.fail_start_for("web");
        let err = coordinator(client.clone())
            .begin(PID, ProfileKind::Heap)
            .await
            .expect_err("web fails");
        assert!(matches!(err, ProfilingError::Start { ref application_id, .. } if application_id == "web"));
        assert_eq!(
            client.calls().last(),
            Some(&Call::StopProfiling {
                pid: PID,
                application_id: "api".into(),
                kind: ProfileKind::Heap,
            })
        );
    }

    #[tokio::test]
    async fn end_collects_buffers_and_skips_failures() {
        let client = fleet();
        client.fail_stop_for("web");
        let coordinator = coordinator(client.clone());
        let started = coordinator.begin(PID, ProfileKind::Cpu).await.expect("begin");

        let payload = coordinator.end(PID, ProfileKind::Cpu, &started).await.expect("end");
        assert_eq!(payload.profile.len(), 1);
        assert_eq!(payload.profile["api"], b"cpu-profile-api".to_vec());
        assert_eq!(payload.services.applications.len(), 2);
        assert_eq!(payload.runtimes.len(), 1);

        let json = serde_json::to_value(&payload).expect("encode");
        assert_eq!(json["type"], "cpu");
        assert_eq!(json["profile"]["api"], STANDARD.encode("cpu-profile-api"));
        assert!(json["metrics"].get("aggregated").is_some());
        assert_eq!(json["services"]["entrypoint"], "api");
    }

    #[tokio::test]
    async fn end_on_a_vanished_runtime_is_an_error() {
        let client = fleet();
        let coordinator = coordinator(client.clone());
        let started = coordinator.begin(PID, ProfileKind::Cpu).await.expect("begin");
        client.remove_runtime(PID);
        let err = coordinator.end(PID, ProfileKind::Cpu, &started).await.expect_err("gone");
        assert!(matches!(
            err,
            ProfilingError::Client(ClientError::RuntimeNotFound { pid: PID })
        ));
    }

    #[tokio::test]
    async fn failed_topology_lookup_still_stops_every_profiler() {
        let client = fleet();
        let coordinator = coordinator(client.clone());
        let started = coordinator.begin(PID, ProfileKind::Cpu).await.expect("begin");
        client.fail_applications_after(0);

        let err = coordinator.end(PID, ProfileKind::Cpu, &started).await.expect_err("lookup fails");
        assert!(matches!(err, ProfilingError::Client(ClientError::Http { status: 500, .. })));
        let stops = client
            .calls()
            .into_iter()
            .filter(|call| matches!(call, Call::StopProfiling { .. }))
            .count();
        assert_eq!(stops, 2);
    }
}
