use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use tracing::warn;
use watt_admin_types::{HealthResponse, Pid, SelectableRuntime};

use crate::app::AppState;
use crate::util::http::{json_error, json_ok};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimesQuery {
    #[serde(default)]
    pub include_admin: bool,
}

pub async fn api_runtimes(
    State(state): State<AppState>,
    Query(query): Query<RuntimesQuery>,
) -> impl IntoResponse {
    match state.directory.list_selectable(query.include_admin).await {
        Ok(runtimes) => json_ok(&runtimes),
        Err(e) => {
            warn!(%e, "listing runtimes failed");
            json_ok::<[SelectableRuntime]>(&[])
        }
    }
}

pub async fn api_runtime_health(
    State(state): State<AppState>,
    Path(pid): Path<Pid>,
) -> impl IntoResponse {
    json_ok(&HealthResponse {
        status: state.directory.health(pid).await,
    })
}

pub async fn api_runtime_services(
    State(state): State<AppState>,
    Path(pid): Path<Pid>,
) -> impl IntoResponse {
    match state.client.get_applications(pid).await {
        Ok(services) => json_ok(&services),
        Err(e) => json_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

pub async fn api_runtime_openapi(
    State(state): State<AppState>,
    Path((pid, service_id)): Path<(Pid, String)>,
) -> impl IntoResponse {
    match state.client.get_openapi(pid, &service_id).await {
        Ok(document) => json_ok(&document),
        Err(e) => json_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// Best effort: a failed restart is logged and still answered with 200.
pub async fn api_runtime_restart(
    State(state): State<AppState>,
    Path(pid): Path<Pid>,
) -> impl IntoResponse {
    if let Err(e) = state.client.restart_runtime(pid).await {
        warn!(pid, %e, "issue restarting the runtime");
    }
    StatusCode::OK
}
