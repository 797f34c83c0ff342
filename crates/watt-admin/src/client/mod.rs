//! The admin's view of the supervised runtimes.
//!
//! Everything the admin learns about a runtime, and every command it sends
//! one, goes through [`RuntimeClient`]. The production implementation talks
//! to each runtime's control socket; tests swap in an in-memory fake.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use watt_admin_types::{ApplicationsResponse, Pid, ProfileKind, Runtime};

mod control_socket;
#[cfg(test)]
pub(crate) mod fake;

pub use control_socket::ControlSocketClient;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("no runtime with pid {pid}")]
    RuntimeNotFound { pid: Pid },
    #[error("listing runtime sockets in {}: {source}", .dir.display())]
    Discovery {
        dir: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("control socket i/o for runtime {pid}: {source}")]
    Io {
        pid: Pid,
        #[source]
        source: std::io::Error,
    },
    #[error("http exchange with runtime {pid}: {source}")]
    Transport {
        pid: Pid,
        #[source]
        source: hyper::Error,
    },
    #[error("runtime {pid} answered {status} on {path}: {body}")]
    Http {
        pid: Pid,
        status: u16,
        path: String,
        body: String,
    },
    #[error("decoding response from runtime {pid}: {message}")]
    Decode { pid: Pid, message: String },
}

/// One metric family as exported by a runtime, prometheus-JSON shaped.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawMetric {
    pub name: String,
    #[serde(default)]
    pub values: Vec<RawMetricValue>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMetricValue {
    pub value: f64,
    #[serde(default)]
    pub labels: BTreeMap<String, Value>,
    /// Set on summary/histogram members such as `<name>_count`.
    #[serde(default)]
    pub metric_name: Option<String>,
}

impl RawMetricValue {
    pub fn new(value: f64) -> Self {
        Self {
            value,
            labels: BTreeMap::new(),
            metric_name: None,
        }
    }

    pub fn with_label(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.labels.insert(key.to_owned(), value.into());
        self
    }

    pub fn named(mut self, metric_name: &str) -> Self {
        self.metric_name = Some(metric_name.to_owned());
        self
    }

    /// Label value as text; numeric labels (`quantile`) are rendered too.
    pub fn label(&self, key: &str) -> Option<String> {
        match self.labels.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[async_trait]
pub trait RuntimeClient: Send + Sync {
    async fn list_runtimes(&self) -> Result<Vec<Runtime>, ClientError>;

    async fn get_matching_runtime(&self, pid: Pid) -> Result<Runtime, ClientError> {
        self.list_runtimes()
            .await?
            .into_iter()
            .find(|runtime| runtime.pid == pid)
            .ok_or(ClientError::RuntimeNotFound { pid })
    }

    async fn get_applications(&self, pid: Pid) -> Result<ApplicationsResponse, ClientError>;

    async fn get_openapi(&self, pid: Pid, application_id: &str) -> Result<Value, ClientError>;

    async fn get_metrics(&self, pid: Pid) -> Result<Vec<RawMetric>, ClientError>;

    async fn start_profiling(
        &self,
        pid: Pid,
        application_id: &str,
        kind: ProfileKind,
        source_maps: bool,
    ) -> Result<(), ClientError>;

    async fn stop_profiling(
        &self,
        pid: Pid,
        application_id: &str,
        kind: ProfileKind,
    ) -> Result<Vec<u8>, ClientError>;

    async fn restart_runtime(&self, pid: Pid) -> Result<(), ClientError>;

    /// Releases whatever the client holds open.
    async fn close(&self) {}
}
