use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use watt_admin_types::{Pid, ProfileKind, RecordMode, RecordRequest};

use super::recorder::{RecordError, Recorder};
use crate::client::RuntimeClient;

/// Something that can be told to stop serving.
#[async_trait]
pub trait ServerControl: Send + Sync {
    async fn close(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    Interrupt,
    SafetyTimeout,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupt => f.write_str("interrupt"),
            Self::SafetyTimeout => f.write_str("safety timeout"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Running,
    ShuttingDown,
}

/// A recording started from the command line and stopped by Ctrl-C or by
/// the safety timeout, whichever comes first.
///
/// The stop-and-save and close sequence runs once no matter how many
/// interrupts arrive or how many callers race for it.
pub struct UnattendedRecording {
    recorder: Arc<Recorder>,
    client: Arc<dyn RuntimeClient>,
    server: Arc<dyn ServerControl>,
    pid: Pid,
    profile: ProfileKind,
    output_path: Option<String>,
    phase: Mutex<Phase>,
}

impl UnattendedRecording {
    pub fn new(
        recorder: Arc<Recorder>,
        client: Arc<dyn RuntimeClient>,
        server: Arc<dyn ServerControl>,
        pid: Pid,
        profile: ProfileKind,
        output_path: Option<String>,
    ) -> Self {
        Self {
            recorder,
            client,
            server,
            pid,
            profile,
            output_path,
            phase: Mutex::new(Phase::Running),
        }
    }

    pub async fn start(&self) -> Result<(), RecordError> {
        self.recorder
            .record(self.pid, self.request(RecordMode::Start))
            .await?;
        info!(pid = self.pid, profile = %self.profile, "recording; press Ctrl-C to stop and save");
        Ok(())
    }

    fn request(&self, mode: RecordMode) -> RecordRequest {
        RecordRequest {
            mode,
            profile: self.profile,
            output_path: self.output_path.clone(),
        }
    }

    /// Starts the recording and runs it until stopped.
    ///
    /// `interrupts` must already be wired to Ctrl-C: a press during the start
    /// fan-out is queued and stops the recording as soon as it is running.
    /// Nothing is closed when the start itself fails.
    pub async fn run(
        &self,
        interrupts: mpsc::Receiver<()>,
        safety_timeout: Duration,
    ) -> Result<(), RecordError> {
        self.start().await?;
        self.run_until_stopped(interrupts, safety_timeout).await;
        Ok(())
    }

    /// Waits for the first interrupt or the safety timeout, then shuts down.
    /// Interrupts arriving while the shutdown runs are absorbed.
    pub async fn run_until_stopped(
        &self,
        mut interrupts: mpsc::Receiver<()>,
        safety_timeout: Duration,
    ) {
        let reason = tokio::select! {
            Some(()) = interrupts.recv() => ShutdownReason::Interrupt,
            _ = tokio::time::sleep(safety_timeout) => ShutdownReason::SafetyTimeout,
        };

        let shutdown = self.shutdown(reason);
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                Some(()) = interrupts.recv() => debug!("interrupt ignored, already shutting down"),
            }
        }
    }

    /// Stop-and-save, then close the runtime client, then the server.
    /// Returns false when a shutdown had already begun.
    pub async fn shutdown(&self, reason: ShutdownReason) -> bool {
        {
            let mut phase = self.phase.lock();
            if *phase == Phase::ShuttingDown {
                return false;
            }
            *phase = Phase::ShuttingDown;
        }
        info!(%reason, pid = self.pid, "stopping recording");

        match self
            .recorder
            .record(self.pid, self.request(RecordMode::Stop))
            .await
        {
            Ok(response) => {
                if let Some(path) = response.path {
                    info!(%path, "recording saved");
                }
            }
            Err(e) => error!(%e, "failed to stop and save the recording"),
        }
        self.client.close().await;
        self.server.close().await;
        true
    }
}

/// Relays Ctrl-C presses into a channel until removed.
pub struct InterruptForwarder {
    task: JoinHandle<()>,
}

impl InterruptForwarder {
    pub fn install() -> (Self, mpsc::Receiver<()>) {
        let (tx, rx) = mpsc::channel(8);
        let task = tokio::spawn(async move {
            loop {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(%e, "failed to listen for ctrl-c");
                    return;
                }
                if tx.send(()).await.is_err() {
                    return;
                }
            }
        });
        (Self { task }, rx)
    }

    pub fn remove(self) {
        self.task.abort();
    }
}
