//! `poll(2)`-based backend. Portable fallback when epoll is unavailable
//! or disabled via `EVENT_NOEPOLL`.

use super::{Backend, ReadyFd};
use crate::event::Binding;
use crate::time::Instant;
use event_core::{EventError, EventId, EventResult, Mask};
use std::collections::HashMap;
use std::os::unix::io::{BorrowedFd, RawFd};

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

struct Registration {
    fd: RawFd,
    interest: Mask,
}

pub struct PollBackend {
    registrations: HashMap<EventId, Registration>,
}

impl PollBackend {
    pub fn new() -> Self {
        PollBackend { registrations: HashMap::new() }
    }

    fn poll_flags(interest: Mask) -> PollFlags {
        let mut flags = PollFlags::empty();
        if interest.contains(Mask::READABLE) {
            flags |= PollFlags::POLLIN;
        }
        if interest.contains(Mask::WRITABLE) {
            flags |= PollFlags::POLLOUT;
        }
        flags
    }

    fn delivered_mask(revents: PollFlags) -> Mask {
        let mut mask = Mask::EMPTY;
        if revents.intersects(PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR) {
            mask.insert(Mask::READABLE);
        }
        if revents.intersects(PollFlags::POLLOUT | PollFlags::POLLERR) {
            mask.insert(Mask::WRITABLE);
        }
        mask
    }
}

impl Default for PollBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for PollBackend {
    fn name(&self) -> &'static str {
        "poll"
    }

    fn need_reinit(&self) -> bool {
        true
    }

    fn add(&mut self, event: EventId, binding: &Binding) -> EventResult<()> {
        let (fd, interest) = match binding {
            Binding::Fd { fd, interest } => (*fd, *interest),
            _ => return Ok(()),
        };
        self.registrations.insert(event, Registration { fd, interest });
        Ok(())
    }

    fn del(&mut self, event: EventId, _binding: &Binding) -> EventResult<()> {
        self.registrations.remove(&event);
        Ok(())
    }

    fn dispatch(&mut self, timeout: Option<Instant>, now: Instant, out: &mut Vec<ReadyFd>) -> EventResult<()> {
        if self.registrations.is_empty() {
            return Ok(());
        }

        let ids: Vec<EventId> = self.registrations.keys().copied().collect();
        let mut pollfds = Vec::with_capacity(ids.len());
        for id in &ids {
            let reg = &self.registrations[id];
            // SAFETY: the borrow lives only for the duration of `poll()`
            // below; the owning fd is kept alive by the caller's event slot.
            let borrowed = unsafe { BorrowedFd::borrow_raw(reg.fd) };
            pollfds.push(PollFd::new(borrowed, Self::poll_flags(reg.interest)));
        }

        let poll_timeout: PollTimeout = match timeout {
            None => PollTimeout::NONE,
            Some(t) => {
                let millis = t.0.saturating_sub(now.0) / 1_000_000;
                PollTimeout::try_from(millis.min(u32::MAX as u64) as u32).unwrap_or(PollTimeout::MAX)
            }
        };

        match poll(&mut pollfds, poll_timeout) {
            Ok(_) => {}
            Err(nix::errno::Errno::EINTR) => return Ok(()),
            Err(e) => return Err(EventError::BackendOp(e as i32)),
        }

        for (id, pfd) in ids.iter().zip(pollfds.iter()) {
            if let Some(revents) = pfd.revents() {
                if revents.is_empty() {
                    continue;
                }
                let delivered = Self::delivered_mask(revents);
                if !delivered.is_empty() {
                    out.push(ReadyFd { event: *id, delivered });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_del_are_idempotent() {
        let mut backend = PollBackend::new();
        let binding = Binding::Fd { fd: 0, interest: Mask::READABLE };
        let id = EventId::new(1);
        backend.add(id, &binding).unwrap();
        backend.add(id, &binding).unwrap();
        assert_eq!(backend.registrations.len(), 1);
        backend.del(id, &binding).unwrap();
        backend.del(id, &binding).unwrap();
        assert!(backend.registrations.is_empty());
    }

    #[test]
    fn dispatch_with_no_registrations_returns_empty() {
        let mut backend = PollBackend::new();
        let mut out = Vec::new();
        backend.dispatch(Some(Instant(0)), Instant(0), &mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn delivered_mask_maps_pollhup_to_readable() {
        let mask = PollBackend::delivered_mask(PollFlags::POLLHUP);
        assert!(mask.contains(Mask::READABLE));
        assert!(!mask.contains(Mask::WRITABLE));
    }
}
