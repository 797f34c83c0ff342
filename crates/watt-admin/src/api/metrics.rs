use axum::extract::{Path, State};
use axum::response::IntoResponse;
use watt_admin_types::{MetricsResponse, Pid};

use crate::app::AppState;
use crate::util::http::json_ok;

pub async fn api_runtime_metrics(
    State(state): State<AppState>,
    Path(pid): Path<Pid>,
) -> impl IntoResponse {
    json_ok(&MetricsResponse::from_samples(&state.metrics.series(pid)))
}

pub async fn api_service_metrics(
    State(state): State<AppState>,
    Path((pid, service_id)): Path<(Pid, String)>,
) -> impl IntoResponse {
    json_ok(&MetricsResponse::from_samples(
        &state.metrics.service_series(pid, &service_id),
    ))
}
