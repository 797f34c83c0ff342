use watt_admin_types::SessionMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid record transition from {from} to {to}")]
pub struct TransitionError {
    pub from: SessionMode,
    pub to: SessionMode,
}

/// `idle → start → stop → start → …`. Nothing else moves.
fn is_allowed(from: SessionMode, to: SessionMode) -> bool {
    matches!(
        (from, to),
        (SessionMode::Idle, SessionMode::Start)
            | (SessionMode::Start, SessionMode::Stop)
            | (SessionMode::Stop, SessionMode::Start)
    )
}

pub fn check_transition(from: SessionMode, to: SessionMode) -> Result<(), TransitionError> {
    if is_allowed(from, to) {
        Ok(())
    } else {
        Err(TransitionError { from, to })
    }
}
