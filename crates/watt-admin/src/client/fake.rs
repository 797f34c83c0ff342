use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use watt_admin_types::{Application, ApplicationsResponse, Pid, ProfileKind, Runtime};

use super::{ClientError, RawMetric, RuntimeClient};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    StartProfiling {
        pid: Pid,
        application_id: String,
        kind: ProfileKind,
        source_maps: bool,
    },
    StopProfiling {
        pid: Pid,
        application_id: String,
        kind: ProfileKind,
    },
    Restart {
        pid: Pid,
    },
}

#[derive(Default)]
struct FakeState {
    runtimes: Vec<Runtime>,
    applications: HashMap<Pid, Vec<Application>>,
    metrics: HashMap<Pid, Vec<RawMetric>>,
    failing_metrics: HashSet<Pid>,
    failing_start: HashSet<String>,
    failing_stop: HashSet<String>,
    failing_restart: bool,
    /// Successful `get_applications` calls left before they start failing.
    applications_budget: Option<usize>,
    calls: Vec<Call>,
    closes: usize,
}

/// In-memory runtime fleet for exercising the admin without real processes.
#[derive(Default)]
pub(crate) struct FakeRuntimeClient {
    state: Mutex<FakeState>,
}

impl FakeRuntimeClient {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_runtime(self, runtime: Runtime, applications: &[&str]) -> Self {
        {
            let mut state = self.state.lock();
            state.applications.insert(
                runtime.pid,
                applications.iter().map(|id| Application::started(*id)).collect(),
            );
            state.runtimes.push(runtime);
        }
        self
    }

    pub(crate) fn set_metrics(&self, pid: Pid, metrics: Vec<RawMetric>) {
        self.state.lock().metrics.insert(pid, metrics);
    }

    pub(crate) fn remove_runtime(&self, pid: Pid) {
        let mut state = self.state.lock();
        state.runtimes.retain(|runtime| runtime.pid != pid);
        state.applications.remove(&pid);
        state.metrics.remove(&pid);
    }

    pub(crate) fn fail_metrics_for(&self, pid: Pid) {
        self.state.lock().failing_metrics.insert(pid);
    }

    pub(crate) fn fail_start_for(&self, application_id: &str) {
        self.state.lock().failing_start.insert(application_id.to_owned());
    }

    pub(crate) fn fail_stop_for(&self, application_id: &str) {
        self.state.lock().failing_stop.insert(application_id.to_owned());
    }

    pub(crate) fn fail_applications_after(&self, successes: usize) {
        self.state.lock().applications_budget = Some(successes);
    }

    pub(crate) fn fail_restart(&self) {
        self.state.lock().failing_restart = true;
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub(crate) fn close_count(&self) -> usize {
        self.state.lock().closes
    }

    fn runtime_exists(&self, pid: Pid) -> Result<(), ClientError> {
        if self.state.lock().runtimes.iter().any(|r| r.pid == pid) {
            Ok(())
        } else {
            Err(ClientError::RuntimeNotFound { pid })
        }
    }
}

fn upstream_failure(pid: Pid, path: String) -> ClientError {
    ClientError::Http {
        pid,
        status: 500,
        path,
        body: "injected failure".to_owned(),
    }
}

#[async_trait]
impl RuntimeClient for FakeRuntimeClient {
    async fn list_runtimes(&self) -> Result<Vec<Runtime>, ClientError> {
        Ok(self.state.lock().runtimes.clone())
    }

    async fn get_applications(&self, pid: Pid) -> Result<ApplicationsResponse, ClientError> {
        self.runtime_exists(pid)?;
        let applications = {
            let mut state = self.state.lock();
            match state.applications_budget.as_mut() {
                Some(0) => return Err(upstream_failure(pid, "/api/v1/applications".to_owned())),
                Some(left) => *left -= 1,
                None => {}
            }
            state.applications.get(&pid).cloned().unwrap_or_default()
        };
        let entrypoint = applications
            .first()
            .map(|app| app.id.clone())
            .unwrap_or_default();
        Ok(ApplicationsResponse {
            entrypoint,
            production: false,
            applications,
        })
    }

    async fn get_openapi(&self, pid: Pid, application_id: &str) -> Result<Value, ClientError> {
        self.runtime_exists(pid)?;
        let known = self
            .state
            .lock()
            .applications
            .get(&pid)
            .is_some_and(|apps| apps.iter().any(|app| app.id == application_id));
        if !known {
            return Err(upstream_failure(
                pid,
                format!("/api/v1/applications/{application_id}/openapi-schema"),
            ));
        }
        Ok(json!({ "openapi": "3.0.3", "info": { "title": application_id } }))
    }

    async fn get_metrics(&self, pid: Pid) -> Result<Vec<RawMetric>, ClientError> {
        self.runtime_exists(pid)?;
        let state = self.state.lock();
        if state.failing_metrics.contains(&pid) {
            return Err(upstream_failure(pid, "/api/v1/metrics".to_owned()));
        }
        Ok(state.metrics.get(&pid).cloned().unwrap_or_default())
    }

    async fn start_profiling(
        &self,
        pid: Pid,
        application_id: &str,
        kind: ProfileKind,
        source_maps: bool,
    ) -> Result<(), ClientError> {
        self.runtime_exists(pid)?;
        let mut state = self.state.lock();
        state.calls.push(Call::StartProfiling {
            pid,
            application_id: application_id.to_owned(),
            kind,
            source_maps,
        });
        if state.failing_start.contains(application_id) {
            return Err(upstream_failure(
                pid,
                format!("/api/v1/applications/{application_id}/pprof/start"),
            ));
        }
        Ok(())
    }

    async fn stop_profiling(
        &self,
        pid: Pid,
        application_id: &str,
        kind: ProfileKind,
    ) -> Result<Vec<u8>, ClientError> {
        self.runtime_exists(pid)?;
        let mut state = self.state.lock();
        state.calls.push(Call::StopProfiling {
            pid,
            application_id: application_id.to_owned(),
            kind,
        });
        if state.failing_stop.contains(application_id) {
            return Err(upstream_failure(
                pid,
                format!("/api/v1/applications/{application_id}/pprof/stop"),
            ));
        }
        Ok(format!("{kind}-profile-{application_id}").into_bytes())
    }

    async fn restart_runtime(&self, pid: Pid) -> Result<(), ClientError> {
        self.runtime_exists(pid)?;
        let mut state = self.state.lock();
        state.calls.push(Call::Restart { pid });
        if state.failing_restart {
            return Err(upstream_failure(pid, "/api/v1/restart".to_owned()));
        }
        Ok(())
    }

    async fn close(&self) {
        self.state.lock().closes += 1;
    }
}
