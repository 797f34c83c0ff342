use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// OS process id of a supervised runtime.
pub type Pid = u32;

/// One supervised application-server process.
///
/// Identity is `pid`. Instances are produced by directory queries and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Runtime {
    pub pid: Pid,
    pub package_name: String,
    /// Wall-clock start of the process, unix milliseconds.
    pub start_time: i64,
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub argv: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platformatic_version: Option<String>,
}

impl Runtime {
    pub fn new(pid: Pid, package_name: impl Into<String>, start_time: i64) -> Self {
        Self {
            pid,
            package_name: package_name.into(),
            start_time,
            url: String::new(),
            cwd: None,
            argv: Vec::new(),
            node_version: None,
            package_version: None,
            platformatic_version: None,
        }
    }
}

/// A runtime as listed to the dashboard, with the selection marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectableRuntime {
    #[serde(flatten)]
    pub runtime: Runtime,
    pub selected: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Starting,
    Started,
    Stopping,
    Stopped,
    #[serde(other)]
    Unknown,
}

/// One logical service hosted inside a runtime.
///
/// Applications that are not running are reported with only `id` and
/// `status`, so every other field defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    pub status: ApplicationStatus,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub local_url: String,
    #[serde(rename = "entrypoint", default)]
    pub is_entrypoint: bool,
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Fields the runtime reports that the admin does not interpret
    /// (`workers`, `url`, ...). Passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Application {
    pub fn started(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: String::new(),
            status: ApplicationStatus::Started,
            version: String::new(),
            local_url: String::new(),
            is_entrypoint: false,
            dependencies: Vec::new(),
            extra: Map::new(),
        }
    }
}

/// Topology of one runtime: `GET /runtimes/{pid}/services`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationsResponse {
    pub entrypoint: String,
    pub production: bool,
    pub applications: Vec<Application>,
}
