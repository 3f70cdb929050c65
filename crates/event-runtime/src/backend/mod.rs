//! Backend abstraction: the reactor's interface to the OS readiness
//! mechanism (epoll, poll, ...).
//!
//! Mirrors the shape of `ksvc-core`'s `IoBackend` trait — submit/flush/
//! poll/cancel there becomes add/del/dispatch/dealloc here, since a
//! readiness backend has no separate submission queue to flush.

mod epoll;
mod poll;

use crate::event::Binding;
use crate::time::Instant;
use event_core::{EventError, EventId, EventResult, Mask};

pub use poll::PollBackend;

#[cfg(target_os = "linux")]
pub use epoll::EpollBackend;

/// One fd observed ready by `dispatch`.
#[derive(Debug, Clone, Copy)]
pub struct ReadyFd {
    pub event: EventId,
    pub delivered: Mask,
}

/// OS readiness backend. Implementors never block in `add`/`del`; only
/// `dispatch` may block, and only for up to the requested timeout.
pub trait Backend {
    /// Human-readable name, reported when `EVENT_SHOW_METHOD` is set.
    fn name(&self) -> &'static str;

    /// Whether this backend's kernel state must be rebuilt after fork.
    fn need_reinit(&self) -> bool;

    /// Registers interest in `binding` on behalf of `event`. Idempotent:
    /// calling `add` again for an event already registered updates its
    /// interest mask rather than erroring.
    fn add(&mut self, event: EventId, binding: &Binding) -> EventResult<()>;

    /// Revokes a prior registration. Not an error if already absent.
    fn del(&mut self, event: EventId, binding: &Binding) -> EventResult<()>;

    /// Blocks for up to `timeout` (`None` = indefinitely, `Some(0)` =
    /// non-blocking poll) and appends every fd observed ready to `out`.
    /// A signal interrupting the wait is not an error; on that path the
    /// backend returns `Ok(())` having appended nothing.
    fn dispatch(&mut self, timeout: Option<Instant>, now: Instant, out: &mut Vec<ReadyFd>) -> EventResult<()>;
}

/// Tries candidate backends in priority order, honoring the skip flags
/// from [`crate::config::ReactorConfig`]. Returns the first one whose
/// `init` succeeds.
pub fn select(no_epoll: bool, no_poll: bool, show_method: bool) -> EventResult<Box<dyn Backend>> {
    #[cfg(target_os = "linux")]
    if !no_epoll {
        match EpollBackend::new() {
            Ok(b) => {
                if show_method {
                    event_core::einfo!("event backend: {}", b.name());
                }
                return Ok(Box::new(b));
            }
            Err(_) => { /* fall through to poll */ }
        }
    }
    let _ = no_epoll;

    if !no_poll {
        let b = PollBackend::new();
        if show_method {
            event_core::einfo!("event backend: {}", b.name());
        }
        return Ok(Box::new(b));
    }

    Err(EventError::BackendSelectionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_fails_when_everything_is_disabled() {
        let result = select(true, true, false);
        assert_eq!(result.err(), Some(EventError::BackendSelectionFailed));
    }

    #[test]
    fn poll_is_selected_when_epoll_disabled() {
        let backend = select(true, false, false).expect("poll backend should be available");
        assert_eq!(backend.name(), "poll");
    }
}
