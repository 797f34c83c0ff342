use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Method, Request, StatusCode, header};
use http_body_util::{BodyExt, Full, Limited};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;
use watt_admin_types::{ApplicationsResponse, Pid, ProfileKind, Runtime};

use super::{ClientError, RawMetric, RuntimeClient};
use crate::util::time::now_ms;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Heap profiles of large services run to tens of megabytes.
const MAX_RESPONSE_BYTES: usize = 256 * 1024 * 1024;

/// Everything but the RFC 3986 unreserved set.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Speaks HTTP/1.1 to each runtime over `<socket_dir>/<pid>.sock`.
///
/// One connection per request; nothing is kept open between calls.
#[derive(Debug, Clone)]
pub struct ControlSocketClient {
    socket_dir: PathBuf,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RuntimeMetadata {
    pid: Pid,
    #[serde(default)]
    package_name: Option<String>,
    #[serde(default)]
    uptime_seconds: f64,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    cwd: Option<String>,
    #[serde(default)]
    argv: Vec<String>,
    #[serde(default)]
    node_version: Option<String>,
    #[serde(default)]
    package_version: Option<String>,
    #[serde(default)]
    platformatic_version: Option<String>,
}

impl RuntimeMetadata {
    fn into_runtime(self, now_ms: i64) -> Runtime {
        let uptime_ms = (self.uptime_seconds.max(0.0) * 1000.0) as i64;
        Runtime {
            pid: self.pid,
            package_name: self.package_name.unwrap_or_default(),
            start_time: now_ms - uptime_ms,
            url: self.url.unwrap_or_default(),
            cwd: self.cwd,
            argv: self.argv,
            node_version: self.node_version,
            package_version: self.package_version,
            platformatic_version: self.platformatic_version,
        }
    }
}

impl ControlSocketClient {
    pub fn new(socket_dir: impl Into<PathBuf>) -> Self {
        Self {
            socket_dir: socket_dir.into(),
        }
    }

    fn socket_path(&self, pid: Pid) -> PathBuf {
        self.socket_dir.join(format!("{pid}.sock"))
    }

    async fn request(
        &self,
        pid: Pid,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Bytes, ClientError> {
        let mut builder = Request::builder()
            .method(method.clone())
            .uri(path)
            .header(header::HOST, "localhost")
            .header(header::ACCEPT, "application/json");
        let payload = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Bytes::from(value.to_string())
            }
            None => Bytes::new(),
        };
        let request = builder
            .body(Full::new(payload))
            .map_err(|e| ClientError::Decode {
                pid,
                message: format!("building {method} {path}: {e}"),
            })?;

        let socket = self.socket_path(pid);
        let (status, body) = tokio::time::timeout(REQUEST_TIMEOUT, send(pid, &socket, request))
            .await
            .map_err(|_| ClientError::Io {
                pid,
                source: io::Error::new(io::ErrorKind::TimedOut, format!("{method} {path} timed out")),
            })??;

        if !status.is_success() {
            return Err(ClientError::Http {
                pid,
                status: status.as_u16(),
                path: path.to_owned(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        Ok(body)
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        pid: Pid,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T, ClientError> {
        let bytes = self.request(pid, method, path, body).await?;
        serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode {
            pid,
            message: format!("{path}: {e}"),
        })
    }

    async fn metadata(&self, pid: Pid) -> Result<Runtime, ClientError> {
        let metadata: RuntimeMetadata = self
            .request_json(pid, Method::GET, "/api/v1/metadata", None)
            .await?;
        Ok(metadata.into_runtime(now_ms()))
    }
}

#[async_trait]
impl RuntimeClient for ControlSocketClient {
    async fn list_runtimes(&self) -> Result<Vec<Runtime>, ClientError> {
        let mut entries = match tokio::fs::read_dir(&self.socket_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(ClientError::Discovery {
                    dir: self.socket_dir.clone(),
                    source,
                });
            }
        };

        let mut runtimes = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(source) => {
                    return Err(ClientError::Discovery {
                        dir: self.socket_dir.clone(),
                        source,
                    });
                }
            };
            let Some(pid) = pid_from_socket_name(&entry.file_name().to_string_lossy()) else {
                continue;
            };
            match self.metadata(pid).await {
                Ok(runtime) => runtimes.push(runtime),
                Err(e) => debug!(pid, %e, "skipping unreachable runtime socket"),
            }
        }
        runtimes.sort_by_key(|runtime| runtime.pid);
        Ok(runtimes)
    }

    async fn get_matching_runtime(&self, pid: Pid) -> Result<Runtime, ClientError> {
        match self.metadata(pid).await {
            Ok(runtime) if runtime.pid == pid => Ok(runtime),
            Ok(_) => Err(ClientError::RuntimeNotFound { pid }),
            Err(ClientError::Io { source, .. })
                if matches!(
                    source.kind(),
                    io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused
                ) =>
            {
                Err(ClientError::RuntimeNotFound { pid })
            }
            Err(e) => Err(e),
        }
    }

    async fn get_applications(&self, pid: Pid) -> Result<ApplicationsResponse, ClientError> {
        self.request_json(pid, Method::GET, "/api/v1/applications", None)
            .await
    }

    async fn get_openapi(&self, pid: Pid, application_id: &str) -> Result<Value, ClientError> {
        let path = format!(
            "/api/v1/applications/{}/openapi-schema",
            encode_path_segment(application_id)
        );
        self.request_json(pid, Method::GET, &path, None).await
    }

    async fn get_metrics(&self, pid: Pid) -> Result<Vec<RawMetric>, ClientError> {
        let value: Value = self
            .request_json(pid, Method::GET, "/api/v1/metrics", None)
            .await?;
        decode_metrics(value).map_err(|message| ClientError::Decode { pid, message })
    }

    async fn start_profiling(
        &self,
        pid: Pid,
        application_id: &str,
        kind: ProfileKind,
        source_maps: bool,
    ) -> Result<(), ClientError> {
        let path = format!(
            "/api/v1/applications/{}/pprof/start",
            encode_path_segment(application_id)
        );
        self.request(
            pid,
            Method::POST,
            &path,
            Some(json!({ "type": kind.as_str(), "sourceMaps": source_maps })),
        )
        .await?;
        Ok(())
    }

    async fn stop_profiling(
        &self,
        pid: Pid,
        application_id: &str,
        kind: ProfileKind,
    ) -> Result<Vec<u8>, ClientError> {
        let path = format!(
            "/api/v1/applications/{}/pprof/stop",
            encode_path_segment(application_id)
        );
        self.request(pid, Method::POST, &path, Some(json!({ "type": kind.as_str() })))
            .await
            .map(Vec::from)
    }

    async fn restart_runtime(&self, pid: Pid) -> Result<(), ClientError> {
        self.request(pid, Method::POST, "/api/v1/restart", Some(json!({})))
            .await?;
        Ok(())
    }
}

/// One request per connection; the connection task ends once the sender drops.
#[cfg(unix)]
async fn send(
    pid: Pid,
    socket: &Path,
    request: Request<Full<Bytes>>,
) -> Result<(StatusCode, Bytes), ClientError> {
    use hyper_util::rt::TokioIo;

    let stream = tokio::net::UnixStream::connect(socket)
        .await
        .map_err(|source| ClientError::Io { pid, source })?;
    let (mut sender, connection) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .map_err(|source| ClientError::Transport { pid, source })?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            debug!(pid, %e, "control socket connection closed with error");
        }
    });

    let response = sender
        .send_request(request)
        .await
        .map_err(|source| ClientError::Transport { pid, source })?;
    let status = response.status();
    let body = Limited::new(response.into_body(), MAX_RESPONSE_BYTES)
        .collect()
        .await
        .map_err(|e| ClientError::Decode {
            pid,
            message: format!("reading response body: {e}"),
        })?
        .to_bytes();
    Ok((status, body))
}

#[cfg(not(unix))]
async fn send(
    pid: Pid,
    _socket: &Path,
    _request: Request<Full<Bytes>>,
) -> Result<(StatusCode, Bytes), ClientError> {
    Err(ClientError::Io {
        pid,
        source: io::Error::new(
            io::ErrorKind::Unsupported,
            "runtime control sockets require unix domain sockets",
        ),
    })
}

fn decode_metrics(value: Value) -> Result<Vec<RawMetric>, String> {
    let list = match value {
        Value::Array(items) => Value::Array(items),
        Value::Object(mut map) => map
            .remove("metrics")
            .ok_or("metrics object has no `metrics` field")?,
        other => return Err(format!("unexpected metrics payload: {other}")),
    };
    serde_json::from_value(list).map_err(|e| format!("metrics: {e}"))
}

fn pid_from_socket_name(name: &str) -> Option<Pid> {
    name.strip_suffix(".sock")?.parse().ok()
}

fn encode_path_segment(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}
