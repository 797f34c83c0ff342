use std::sync::Arc;

use tracing::debug;
use watt_admin_types::{HealthStatus, Pid, Runtime, SelectableRuntime};

use crate::client::{ClientError, RuntimeClient};

#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    #[error("no runtime selected and none given explicitly")]
    NoneSelected,
}

#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
    #[error("failed to list runtimes: {0}")]
    Listing(#[from] ClientError),
    #[error("No runtimes available.")]
    NoRuntimes,
    #[error("no runtime with pid {pid}; available:{}", candidate_lines(.candidates))]
    UnknownPid { pid: Pid, candidates: Vec<Runtime> },
    #[error("several runtimes are running; pick one with --pid:{}", candidate_lines(.candidates))]
    Ambiguous { candidates: Vec<Runtime> },
}

fn candidate_lines(candidates: &[Runtime]) -> String {
    candidates
        .iter()
        .map(|runtime| format!("\n  {} (PID: {})", runtime.package_name, runtime.pid))
        .collect()
}

/// Which runtimes the admin may address, and whether each is alive.
#[derive(Clone)]
pub struct RuntimeDirectory {
    client: Arc<dyn RuntimeClient>,
    admin_pid: Pid,
    selected_pid: Option<Pid>,
}

impl RuntimeDirectory {
    pub fn new(client: Arc<dyn RuntimeClient>, admin_pid: Pid, selected_pid: Option<Pid>) -> Self {
        Self {
            client,
            admin_pid,
            selected_pid,
        }
    }

    pub fn selected_pid(&self) -> Option<Pid> {
        self.selected_pid
    }

    /// All runtimes except the admin's own (unless `include_admin`), with at
    /// most one marked `selected`: the configured pid, or the only entry.
    pub async fn list_selectable(
        &self,
        include_admin: bool,
    ) -> Result<Vec<SelectableRuntime>, ClientError> {
        let runtimes: Vec<_> = self
            .client
            .list_runtimes()
            .await?
            .into_iter()
            .filter(|runtime| include_admin || runtime.pid != self.admin_pid)
            .collect();

        let sole = runtimes.len() == 1;
        Ok(runtimes
            .into_iter()
            .map(|runtime| {
                let selected = match self.selected_pid {
                    Some(pid) => runtime.pid == pid,
                    None => sole,
                };
                SelectableRuntime { runtime, selected }
            })
            .collect())
    }

    /// The runtime to attach to at startup: the configured pid if it is
    /// running, else the only runtime there is.
    pub async fn select_startup(&self, include_admin: bool) -> Result<Runtime, SelectionError> {
        let selectable = self.list_selectable(include_admin).await?;
        if selectable.is_empty() {
            return Err(SelectionError::NoRuntimes);
        }
        if let Ok(pid) = resolve_target_pid(None, &selectable) {
            if let Some(entry) = selectable.iter().find(|entry| entry.runtime.pid == pid) {
                return Ok(entry.runtime.clone());
            }
        }

        let candidates = selectable.into_iter().map(|entry| entry.runtime).collect();
        Err(match self.selected_pid {
            Some(pid) => SelectionError::UnknownPid { pid, candidates },
            None => SelectionError::Ambiguous { candidates },
        })
    }

    pub async fn health(&self, pid: Pid) -> HealthStatus {
        match self.client.get_matching_runtime(pid).await {
            Ok(_) => HealthStatus::Ok,
            Err(e) => {
                debug!(pid, %e, "runtime health lookup failed");
                HealthStatus::Ko
            }
        }
    }
}

/// An explicit pid wins; otherwise the single runtime flagged `selected`.
pub fn resolve_target_pid(
    explicit: Option<Pid>,
    selectable: &[SelectableRuntime],
) -> Result<Pid, TargetError> {
    if let Some(pid) = explicit {
        return Ok(pid);
    }
    let mut selected = selectable.iter().filter(|entry| entry.selected);
    match (selected.next(), selected.next()) {
        (Some(entry), None) => Ok(entry.runtime.pid),
        _ => Err(TargetError::NoneSelected),
    }
}
