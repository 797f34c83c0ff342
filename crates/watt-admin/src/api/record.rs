use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use watt_admin_types::{Pid, RecordRequest};

use crate::app::AppState;
use crate::recording::RecordError;
use crate::util::http::{json_error, json_ok};

pub async fn api_record(
    State(state): State<AppState>,
    Path(pid): Path<Pid>,
    body: Bytes,
) -> impl IntoResponse {
    let req: RecordRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(e) => {
            return json_error(
                StatusCode::BAD_REQUEST,
                format!("invalid record request: {e}"),
            );
        }
    };

    match state.recorder.record(pid, req).await {
        Ok(response) => json_ok(&response),
        Err(e) => json_error(record_error_status(&e), e.to_string()),
    }
}

pub async fn api_record_status(State(state): State<AppState>) -> impl IntoResponse {
    json_ok(&state.recorder.status().await)
}

fn record_error_status(error: &RecordError) -> StatusCode {
    if error.is_missing_runtime() {
        return StatusCode::NOT_FOUND;
    }
    match error {
        RecordError::Transition(_) => StatusCode::BAD_REQUEST,
        RecordError::NoTarget(_) => StatusCode::NOT_FOUND,
        RecordError::Profiling(_) | RecordError::Upstream(_) => StatusCode::BAD_GATEWAY,
        RecordError::Artifact(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use axum::response::Response;
    use serde_json::Value;

    use super::*;
    use crate::app::tests::{PID, test_state};

    async fn post(state: &AppState, pid: Pid, body: &str) -> (StatusCode, Value) {
        let response: Response = api_record(
            State(state.clone()),
            Path(pid),
            Bytes::from(body.to_owned()),
        )
        .await
        .into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        (status, serde_json::from_slice(&bytes).expect("json"))
    }

    #[tokio::test]
    async fn start_twice_is_rejected_and_stop_returns_the_artifact_path() {
        let (state, _client, _dirs) = test_state();

        let (status, body) = post(&state, PID, r#"{"mode":"start","profile":"cpu"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({}));

        let (status, body) = post(&state, PID, r#"{"mode":"start","profile":"cpu"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().is_some_and(|e| e.contains("start to start")));

        let (status, body) = post(&state, PID, r#"{"mode":"stop","profile":"cpu"}"#).await;
        assert_eq!(status, StatusCode::OK);
        let path = body["path"].as_str().expect("path");
        let html = std::fs::read_to_string(path).expect("artifact");
        assert!(html.contains("<script>window.LOADED_JSON="));
        assert!(html.trim_end().ends_with("</html>"));

        let status = api_record_status(State(state)).await.into_response();
        let bytes = axum::body::to_bytes(status.into_body(), usize::MAX)
            .await
            .expect("body");
        let status: Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(status["mode"], "stop");
        assert_eq!(status["profile"], "cpu");
    }

    #[tokio::test]
    async fn malformed_bodies_are_client_errors() {
        let (state, client, _dirs) = test_state();
        for body in [
            "",
            "not json",
            r#"{"mode":"","profile":""}"#,
            r#"{"mode":"start","profile":"gpu"}"#,
            r#"{"mode":"start"}"#,
            r#"{"mode":"start","profile":"cpu","extra":1}"#,
        ] {
            let (status, body_json) = post(&state, PID, body).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "body {body:?}");
            assert!(body_json["error"].is_string());
        }
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn stop_while_idle_is_a_client_error() {
        let (state, _client, _dirs) = test_state();
        let (status, _) = post(&state, PID, r#"{"mode":"stop","profile":"heap"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_runtime_is_not_found() {
        let (state, _client, _dirs) = test_state();
        let (status, _) = post(&state, 31_337, r#"{"mode":"start","profile":"cpu"}"#).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn failing_application_start_is_a_bad_gateway() {
        let (state, client, _dirs) = test_state();
        client.fail_start_for("web");
        let (status, _) = post(&state, PID, r#"{"mode":"start","profile":"cpu"}"#).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }
}
