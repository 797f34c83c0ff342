use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{error, info, warn};
use watt_admin_types::{
    Pid, RecordMode, RecordRequest, RecordResponse, RecordStatusResponse, SessionMode,
};

use super::profiling::{ProfilingCoordinator, ProfilingError};
use super::session::RecordSession;
use super::state::{TransitionError, check_transition};
use crate::artifact::{ArtifactBuilder, ArtifactError, ArtifactOpener};
use crate::client::ClientError;
use crate::runtimes::{RuntimeDirectory, TargetError, resolve_target_pid};

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    NoTarget(#[from] TargetError),
    #[error(transparent)]
    Profiling(#[from] ProfilingError),
    #[error(transparent)]
    Upstream(#[from] ClientError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

impl RecordError {
    /// The runtime named by the request does not exist.
    pub fn is_missing_runtime(&self) -> bool {
        matches!(
            self,
            Self::NoTarget(_)
                | Self::Upstream(ClientError::RuntimeNotFound { .. })
                | Self::Profiling(ProfilingError::Client(ClientError::RuntimeNotFound { .. }))
        )
    }
}

/// Applies record requests to the session, one at a time.
///
/// The session lock is held for the whole request, fan-out included, so a
/// second `start` waits for the first to finish and is then rejected.
pub struct Recorder {
    session: Mutex<RecordSession>,
    directory: RuntimeDirectory,
    profiling: ProfilingCoordinator,
    artifacts: ArtifactBuilder,
    opener: Arc<dyn ArtifactOpener>,
    open_artifacts: bool,
}

impl Recorder {
    pub fn new(
        directory: RuntimeDirectory,
        profiling: ProfilingCoordinator,
        artifacts: ArtifactBuilder,
        opener: Arc<dyn ArtifactOpener>,
        open_artifacts: bool,
    ) -> Self {
        Self {
            session: Mutex::new(RecordSession::default()),
            directory,
            profiling,
            artifacts,
            opener,
            open_artifacts,
        }
    }

    pub async fn status(&self) -> RecordStatusResponse {
        self.session.lock().await.status()
    }

    /// `pid` 0 means "the selected runtime".
    pub async fn record(
        &self,
        pid: Pid,
        request: RecordRequest,
    ) -> Result<RecordResponse, RecordError> {
        let mut session = self.session.lock().await;
        let to = SessionMode::from(request.mode);
        if let Err(e) = check_transition(session.mode, to) {
            error!(from = %e.from, to = %e.to, "invalid record state machine transition");
            return Err(e.into());
        }

        match request.mode {
            RecordMode::Start => {
                let pid = self.resolve_pid(pid).await?;
                let applications = self.profiling.begin(pid, request.profile).await?;
                *session = RecordSession::started(pid, request.profile, applications);
                Ok(RecordResponse::default())
            }
            RecordMode::Stop => {
                let (Some(pid), Some(kind)) = (session.pid, session.profile) else {
                    return Err(TransitionError {
                        from: SessionMode::Idle,
                        to,
                    }
                    .into());
                };
                if request.profile != kind {
                    warn!(requested = %request.profile, recording = %kind, "stop names a different profile kind; using the recorded one");
                }
                session.mode = SessionMode::Stop;
                let applications = std::mem::take(&mut session.applications);

                let payload = self.profiling.end(pid, kind, &applications).await?;
                let path = match self
                    .artifacts
                    .write(&payload, request.output_path.as_deref())
                    .await
                {
                    Ok(path) => path,
                    Err(e) => {
                        error!(pid, %e, "unable to save the recording");
                        return Err(e.into());
                    }
                };
                info!(pid, %kind, path = %path.display(), "recording stopped");

                if self.open_artifacts {
                    self.opener.open(&path);
                }
                Ok(RecordResponse {
                    path: Some(path.display().to_string()),
                })
            }
        }
    }

    async fn resolve_pid(&self, pid: Pid) -> Result<Pid, RecordError> {
        if pid != 0 {
            return Ok(pid);
        }
        let selectable = self.directory.list_selectable(false).await?;
        Ok(resolve_target_pid(self.directory.selected_pid(), &selectable)?)
    }
}
