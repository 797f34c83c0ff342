use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Pid;

/// Which profiling data a record session captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileKind {
    Cpu,
    Heap,
}

impl ProfileKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Heap => "heap",
        }
    }
}

impl fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle position of the record session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    #[default]
    Idle,
    Start,
    Stop,
}

impl SessionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Start => "start",
            Self::Stop => "stop",
        }
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transition a client may request. `idle` is never requested directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordMode {
    Start,
    Stop,
}

impl From<RecordMode> for SessionMode {
    fn from(mode: RecordMode) -> Self {
        match mode {
            RecordMode::Start => SessionMode::Start,
            RecordMode::Stop => SessionMode::Stop,
        }
    }
}

/// Body of `POST /record/{pid}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RecordRequest {
    pub mode: RecordMode,
    pub profile: ProfileKind,
    /// Directory or `.html` file path for the artifact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
}

/// `{}` after a start, `{"path": ...}` after a stop.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecordResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// `GET /record`: where the session currently is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordStatusResponse {
    pub mode: SessionMode,
    pub profile: Option<ProfileKind>,
    pub pid: Option<Pid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_mode_and_profile_are_rejected() {
        let err = serde_json::from_str::<RecordRequest>(r#"{"mode":"","profile":""}"#);
        assert!(err.is_err(), "empty mode must not decode");
    }

    #[test]
    fn idle_is_not_a_requestable_mode() {
        let err = serde_json::from_str::<RecordRequest>(r#"{"mode":"idle","profile":"cpu"}"#);
        assert!(err.is_err());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = serde_json::from_str::<RecordRequest>(
            r#"{"mode":"start","profile":"cpu","interval":5}"#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn stop_request_carries_output_path() {
        let req: RecordRequest = serde_json::from_str(
            r#"{"mode":"stop","profile":"heap","outputPath":"/tmp/recordings"}"#,
        )
        .expect("stop request should decode");
        assert_eq!(req.mode, RecordMode::Stop);
        assert_eq!(req.profile, ProfileKind::Heap);
        assert_eq!(req.output_path.as_deref(), Some("/tmp/recordings"));
    }

    #[test]
    fn start_response_is_an_empty_object() {
        let json = serde_json::to_string(&RecordResponse::default()).expect("encode");
        assert_eq!(json, "{}");
    }
}
