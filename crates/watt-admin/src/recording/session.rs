use watt_admin_types::{Pid, ProfileKind, RecordStatusResponse, SessionMode};

/// The one profiling session the admin tracks.
///
/// `profile`, `pid` and `applications` are set by an accepted `start` and
/// read back unchanged by the paired `stop`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordSession {
    pub mode: SessionMode,
    pub profile: Option<ProfileKind>,
    pub pid: Option<Pid>,
    /// Applications profiling was started on, in start order.
    pub applications: Vec<String>,
}

impl RecordSession {
    pub fn started(pid: Pid, profile: ProfileKind, applications: Vec<String>) -> Self {
        Self {
            mode: SessionMode::Start,
            profile: Some(profile),
            pid: Some(pid),
            applications,
        }
    }

    pub fn status(&self) -> RecordStatusResponse {
        RecordStatusResponse {
            mode: self.mode,
            profile: self.profile,
            pid: self.pid,
        }
    }
}
