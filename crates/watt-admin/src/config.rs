use std::path::PathBuf;
use std::time::Duration;

use watt_admin_types::Pid;

pub const DEFAULT_HTTP_ADDR: &str = "127.0.0.1:4042";
pub const DEFAULT_ASSETS_DIR: &str = "frontend/dist";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_RECORDING_MAX_SAMPLES: usize = 10_000;
pub const DEFAULT_RECORD_SAFETY_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Everything the admin server needs to know about its surroundings.
///
/// Built once at startup and handed to constructors; nothing below `main`
/// reads the process environment.
#[derive(Debug, Clone)]
pub struct AdminConfig {
    pub http_addr: String,
    /// Runtime picked at startup, marked `selected` in listings.
    pub selected_pid: Option<Pid>,
    /// Pid of the admin process itself, hidden from listings by default.
    pub admin_pid: Pid,
    /// Launch the system viewer on freshly written artifacts.
    pub open_artifacts: bool,
    /// Frontend build output: `index.html` plus `fonts/`.
    pub assets_dir: PathBuf,
    /// Where artifacts land when a stop request names no output path.
    pub output_dir: PathBuf,
    /// Directory holding one `<pid>.sock` control socket per runtime.
    pub socket_dir: PathBuf,
    pub metrics_poll_interval: Duration,
    pub metrics_retention: Duration,
    pub recording_max_samples: usize,
    pub record_safety_timeout: Duration,
}

impl AdminConfig {
    /// Reads `WATT_ADMIN_HTTP`, `WATT_ADMIN_ASSETS`, `PLT_RUNTIMES_DIR`,
    /// `CI` and `WATT_ADMIN_TEST` through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let http_addr = lookup("WATT_ADMIN_HTTP").unwrap_or_else(|| DEFAULT_HTTP_ADDR.to_owned());
        let assets_dir = lookup("WATT_ADMIN_ASSETS")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ASSETS_DIR));
        let socket_dir = lookup("PLT_RUNTIMES_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_socket_dir);
        let headless = lookup("CI").is_some_and(|v| !v.is_empty())
            || lookup("WATT_ADMIN_TEST").is_some_and(|v| !v.is_empty());
        let output_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

        Self {
            http_addr,
            selected_pid: None,
            admin_pid: std::process::id(),
            open_artifacts: !headless,
            assets_dir,
            output_dir,
            socket_dir,
            metrics_poll_interval: DEFAULT_POLL_INTERVAL,
            metrics_retention: DEFAULT_RETENTION,
            recording_max_samples: DEFAULT_RECORDING_MAX_SAMPLES,
            record_safety_timeout: DEFAULT_RECORD_SAFETY_TIMEOUT,
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

/// `<tmp>/platformatic/runtimes`, where runtimes publish their control sockets.
pub fn default_socket_dir() -> PathBuf {
    std::env::temp_dir().join("platformatic").join("runtimes")
}
