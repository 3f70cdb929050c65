//! Event record: the registration object a reactor tracks per `EventId`.

use crate::time::Instant;
use event_core::{EventId, Mask, Priority};
use std::os::unix::io::RawFd;

/// What an event is registered against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// Readiness on a file descriptor; `interest` is `Mask::READABLE`
    /// and/or `Mask::WRITABLE`.
    Fd { fd: RawFd, interest: Mask },
    /// Delivery of a process signal.
    Signal { signo: i32 },
    /// A pure timer, no descriptor or signal.
    Timer,
}

impl Binding {
    pub fn fd(&self) -> Option<RawFd> {
        match self {
            Binding::Fd { fd, .. } => Some(*fd),
            _ => None,
        }
    }

    pub fn signo(&self) -> Option<i32> {
        match self {
            Binding::Signal { signo } => Some(*signo),
            _ => None,
        }
    }

    pub fn wants_backend_registration(&self) -> bool {
        matches!(self, Binding::Fd { .. })
    }

    pub fn wants_signal_registration(&self) -> bool {
        matches!(self, Binding::Signal { .. })
    }
}

/// The opaque user argument passed back to a callback, type-erased like
/// the original's `void *arg`.
pub type UserArg = Box<dyn std::any::Any>;

/// Callback signature: `(reactor, event, binding-as-raw-int, delivered-mask, user-arg)`.
///
/// The leading `&mut Reactor` is this crate's stand-in for the original's
/// `ev_base` back-pointer: a C callback reaches its reactor through the
/// event struct itself, which Rust's ownership rules don't allow once the
/// reactor owns event storage outright. Passing the reactor in is what
/// lets a callback call `add`/`del` on any event, including the one
/// currently dispatching.
pub type Callback = Box<dyn FnMut(&mut crate::reactor::Reactor, EventId, i32, Mask, &mut dyn std::any::Any)>;

/// State-flag bits, observed together only by the reactor. Kept as a
/// plain struct rather than a bitset: the set is small, fixed, and
/// benefits from named fields at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StateFlags {
    pub initialized: bool,
    pub inserted: bool,
    pub in_active_queue: bool,
    pub in_timer_heap: bool,
    pub internal: bool,
}

/// A registered event. Owned by the reactor's slab; callers hold an
/// [`EventId`] handle instead of a pointer into this struct.
pub struct EventSlot {
    pub binding: Binding,
    pub persist: bool,
    pub callback: Callback,
    pub arg: UserArg,
    pub priority: Priority,
    pub state: StateFlags,
    pub delivered: Mask,
    /// How many times `active()` asked this event to be invoked once it
    /// reaches the front of its priority queue (1 for an ordinary fd or
    /// timer firing; >1 for coalesced signal deliveries).
    pub requested_calls: u32,
    /// Remaining invocations while this event is mid-dispatch; `None`
    /// whenever dispatch is not in progress for it. Replaces the
    /// original's aliased `ev_pncalls` pointer: a reentrant `del` on the
    /// currently-dispatching id zeroes this field by looking the event up
    /// in the reactor's own slab instead of through a raw pointer.
    pub ncalls: Option<u32>,
    pub timeout: Option<Instant>,
    pub heap_index: Option<usize>,
    /// True for the internal self-pipe read event and `once()` wrappers;
    /// excluded from `destroy`'s "delete every non-internal event" pass.
    pub internal_only: bool,
}

impl EventSlot {
    pub fn new(binding: Binding, persist: bool, priority: Priority, callback: Callback, arg: UserArg) -> Self {
        EventSlot {
            binding,
            persist,
            callback,
            arg,
            priority,
            state: StateFlags { initialized: true, ..StateFlags::default() },
            delivered: Mask::EMPTY,
            requested_calls: 1,
            ncalls: None,
            timeout: None,
            heap_index: None,
            internal_only: false,
        }
    }

    pub fn binding_as_int(&self) -> i32 {
        match self.binding {
            Binding::Fd { fd, .. } => fd,
            Binding::Signal { signo } => signo,
            Binding::Timer => -1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_as_int_matches_kind() {
        let fd_binding = Binding::Fd { fd: 7, interest: Mask::READABLE };
        assert_eq!(fd_binding.fd(), Some(7));
        assert_eq!(fd_binding.signo(), None);

        let sig_binding = Binding::Signal { signo: 10 };
        assert_eq!(sig_binding.signo(), Some(10));
        assert!(sig_binding.wants_signal_registration());
        assert!(!sig_binding.wants_backend_registration());

        assert!(matches!(Binding::Timer, Binding::Timer));
    }

    #[test]
    fn new_event_starts_initialized_only() {
        let slot = EventSlot::new(Binding::Timer, false, Priority::new(0), Box::new(|_, _, _, _, _| {}), Box::new(()));
        assert!(slot.state.initialized);
        assert!(!slot.state.inserted);
        assert!(!slot.state.in_active_queue);
        assert!(!slot.state.in_timer_heap);
        assert_eq!(slot.binding_as_int(), -1);
    }
}
