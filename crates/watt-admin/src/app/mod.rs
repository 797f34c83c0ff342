use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tower_http::services::ServeDir;
use tracing::{error, info};

use crate::api::metrics::{api_runtime_metrics, api_service_metrics};
use crate::api::record::{api_record, api_record_status};
use crate::api::runtimes::{
    api_runtime_health, api_runtime_openapi, api_runtime_restart, api_runtime_services,
    api_runtimes,
};
use crate::artifact::{ArtifactBuilder, ArtifactOpener};
use crate::client::RuntimeClient;
use crate::config::AdminConfig;
use crate::metrics::MetricsStore;
use crate::recording::{ProfilingCoordinator, Recorder, ServerControl};
use crate::runtimes::RuntimeDirectory;

/// Shared by every handler. Each piece guards its own state.
#[derive(Clone)]
pub struct AppState {
    pub client: Arc<dyn RuntimeClient>,
    pub directory: RuntimeDirectory,
    pub metrics: Arc<MetricsStore>,
    pub recorder: Arc<Recorder>,
}

impl AppState {
    pub fn new(
        config: &AdminConfig,
        client: Arc<dyn RuntimeClient>,
        opener: Arc<dyn ArtifactOpener>,
    ) -> Self {
        let directory = RuntimeDirectory::new(
            Arc::clone(&client),
            config.admin_pid,
            config.selected_pid,
        );
        let metrics = Arc::new(MetricsStore::new(config.metrics_retention));
        let profiling = ProfilingCoordinator::new(
            Arc::clone(&client),
            directory.clone(),
            Arc::clone(&metrics),
            config.recording_max_samples,
        );
        let recorder = Arc::new(Recorder::new(
            directory.clone(),
            profiling,
            ArtifactBuilder::new(config.assets_dir.clone(), config.output_dir.clone()),
            opener,
            config.open_artifacts,
        ));
        Self {
            client,
            directory,
            metrics,
            recorder,
        }
    }
}

pub fn build_router(state: AppState, assets_dir: &Path) -> Router {
    let api = Router::new()
        .route("/runtimes", get(api_runtimes))
        .route("/runtimes/{pid}/health", get(api_runtime_health))
        .route("/runtimes/{pid}/services", get(api_runtime_services))
        .route(
            "/runtimes/{pid}/openapi/{service_id}",
            get(api_runtime_openapi),
        )
        .route("/runtimes/{pid}/restart", post(api_runtime_restart))
        .route("/runtimes/{pid}/metrics", get(api_runtime_metrics))
        .route(
            "/runtimes/{pid}/metrics/{service_id}",
            get(api_service_metrics),
        )
        .route("/record", get(api_record_status))
        .route("/record/{pid}", post(api_record));

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .fallback_service(ServeDir::new(assets_dir))
        .with_state(state)
}

pub async fn health() -> &'static str {
    "ok"
}

/// A running HTTP server that can be shut down gracefully from elsewhere.
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown_signal: Arc<Notify>,
    finished: Arc<Notify>,
    task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl ServerHandle {
    pub fn serve(listener: TcpListener, router: Router) -> Result<Self, String> {
        let local_addr = listener
            .local_addr()
            .map_err(|e| format!("failed to read listener address: {e}"))?;
        let shutdown_signal = Arc::new(Notify::new());
        let finished = Arc::new(Notify::new());

        let signal = Arc::clone(&shutdown_signal);
        let done = Arc::clone(&finished);
        let task = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { signal.notified().await })
                .await;
            if let Err(e) = result {
                error!(%e, "HTTP server error");
            }
            done.notify_one();
        });

        Ok(Self {
            local_addr,
            shutdown_signal,
            finished,
            task: parking_lot::Mutex::new(Some(task)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Resolves once the server task has ended, for whatever reason.
    pub async fn stopped(&self) {
        self.finished.notified().await;
    }
}

#[async_trait]
impl ServerControl for ServerHandle {
    async fn close(&self) {
        self.shutdown_signal.notify_one();
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(%e, "HTTP server task failed");
            }
            info!(addr = %self.local_addr, "HTTP server closed");
        }
    }
}
