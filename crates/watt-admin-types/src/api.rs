use serde::{Deserialize, Serialize};

/// Error body returned by every failing JSON endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "KO")]
    Ko,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_wire_shape() {
        let json = serde_json::to_string(&HealthResponse {
            status: HealthStatus::Ko,
        })
        .expect("health response should encode");
        assert_eq!(json, r#"{"status":"KO"}"#);
    }
}
