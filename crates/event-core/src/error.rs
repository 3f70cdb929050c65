//! Error types shared by the reactor crates.

use core::fmt;

/// Result type for reactor operations.
pub type EventResult<T> = Result<T, EventError>;

/// Errors that can occur in reactor operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventError {
    /// No backend could be initialized at reactor creation.
    BackendSelectionFailed,

    /// A backend `add`/`del`/`dispatch` call returned an error.
    BackendOp(i32),

    /// Operation attempted on an event that is not in the required state.
    InvalidState(&'static str),

    /// `set_priorities` called while one or more events are active.
    PrioritiesBusy,

    /// Reading the clock failed.
    ClockRead,

    /// Installing or restoring a signal handler failed.
    SignalInstall(i32),

    /// A second reactor tried to claim a signal number already owned
    /// by a live reactor in this process.
    SignalAlreadyOwned(i32),

    /// `once` was called with a signal binding.
    OnceRejectsSignal,

    /// Heap capacity could not be reserved ahead of a registration.
    HeapReserveFailed,
}

impl fmt::Display for EventError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventError::BackendSelectionFailed => write!(f, "no backend could be initialized"),
            EventError::BackendOp(errno) => write!(f, "backend operation failed: errno {}", errno),
            EventError::InvalidState(what) => write!(f, "invalid state: {}", what),
            EventError::PrioritiesBusy => write!(f, "set_priorities called while events are active"),
            EventError::ClockRead => write!(f, "clock read failed"),
            EventError::SignalInstall(errno) => write!(f, "signal install failed: errno {}", errno),
            EventError::SignalAlreadyOwned(signo) => {
                write!(f, "signal {} already owned by another reactor", signo)
            }
            EventError::OnceRejectsSignal => write!(f, "once() does not accept signal bindings"),
            EventError::HeapReserveFailed => write!(f, "timer heap reserve failed"),
        }
    }
}

impl std::error::Error for EventError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_nonempty_for_every_variant() {
        let variants = [
            EventError::BackendSelectionFailed,
            EventError::BackendOp(5),
            EventError::InvalidState("not initialized"),
            EventError::PrioritiesBusy,
            EventError::ClockRead,
            EventError::SignalInstall(22),
            EventError::SignalAlreadyOwned(10),
            EventError::OnceRejectsSignal,
            EventError::HeapReserveFailed,
        ];
        for v in variants {
            assert!(!v.to_string().is_empty());
        }
    }

    #[test]
    fn backend_op_carries_errno() {
        let e = EventError::BackendOp(9);
        assert_eq!(format!("{}", e), "backend operation failed: errno 9");
    }
}
