//! The record session: state machine, profiling fan-out and the unattended
//! command-line flow built on top of them.

mod profiling;
mod recorder;
mod session;
mod shutdown;
mod state;

pub use profiling::{ProfilingCoordinator, ProfilingError, RecordingPayload};
pub use recorder::{RecordError, Recorder};
pub use session::RecordSession;
pub use shutdown::{InterruptForwarder, ServerControl, ShutdownReason, UnattendedRecording};
pub use state::{TransitionError, check_transition};
