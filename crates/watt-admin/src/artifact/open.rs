use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{info, warn};

/// Hands a freshly written artifact to whatever displays it.
///
/// Fire-and-forget: implementations log failures and never report them.
pub trait ArtifactOpener: Send + Sync {
    fn open(&self, path: &Path);
}

/// Opens artifacts with the platform's default viewer.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemOpener;

impl ArtifactOpener for SystemOpener {
    fn open(&self, path: &Path) {
        let mut command = viewer_command(path);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(path = %path.display(), %e, "failed to launch viewer for recording");
                return;
            }
        };
        let path = path.to_path_buf();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => {
                    info!(path = %path.display(), "recording opened in browser");
                }
                Ok(status) => warn!(path = %path.display(), %status, "viewer exited with failure"),
                Err(e) => warn!(path = %path.display(), %e, "failed to open recording in browser"),
            }
        });
    }
}

fn viewer_command(path: &Path) -> Command {
    #[cfg(target_os = "macos")]
    {
        let mut command = Command::new("open");
        command.arg(path);
        command
    }

    #[cfg(windows)]
    {
        let mut command = Command::new("cmd");
        command.arg("/C").arg("start").arg("").arg(path);
        command
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    {
        let mut command = Command::new("xdg-open");
        command.arg(path);
        command
    }
}

/// Remembers every path it was asked to open.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct CountingOpener {
    opened: parking_lot::Mutex<Vec<std::path::PathBuf>>,
}

#[cfg(test)]
impl CountingOpener {
    pub(crate) fn opened(&self) -> Vec<std::path::PathBuf> {
        self.opened.lock().clone()
    }
}

#[cfg(test)]
impl ArtifactOpener for CountingOpener {
    fn open(&self, path: &Path) {
        self.opened.lock().push(path.to_path_buf());
    }
}
