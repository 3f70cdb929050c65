//! `epoll`-based backend. Preferred on Linux; tried before `poll`.

use super::{Backend, ReadyFd};
use crate::event::Binding;
use crate::time::Instant;
use event_core::{EventError, EventId, EventResult, Mask};
use std::collections::HashMap;
use std::os::unix::io::{AsFd, BorrowedFd, RawFd};

use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags, EpollTimeout};

pub struct EpollBackend {
    epoll: Epoll,
    /// fd -> every event id currently registered on it. `Mask` allows
    /// independent READABLE/WRITABLE registrations on the same fd (two
    /// distinct `EventId`s, e.g. one per direction), so this is a list
    /// rather than a single id; epoll itself only ever holds one
    /// registration per fd, with its interest the union of all ids'.
    fd_events: HashMap<RawFd, Vec<EventId>>,
    interests: HashMap<EventId, (RawFd, Mask)>,
}

impl EpollBackend {
    pub fn new() -> EventResult<Self> {
        let epoll = Epoll::new(EpollCreateFlags::empty()).map_err(|e| EventError::BackendOp(e as i32))?;
        Ok(EpollBackend { epoll, fd_events: HashMap::new(), interests: HashMap::new() })
    }

    fn epoll_flags(interest: Mask) -> EpollFlags {
        let mut flags = EpollFlags::empty();
        if interest.contains(Mask::READABLE) {
            flags |= EpollFlags::EPOLLIN;
        }
        if interest.contains(Mask::WRITABLE) {
            flags |= EpollFlags::EPOLLOUT;
        }
        flags
    }

    fn delivered_mask(flags: EpollFlags) -> Mask {
        let mut mask = Mask::EMPTY;
        if flags.intersects(EpollFlags::EPOLLIN | EpollFlags::EPOLLHUP | EpollFlags::EPOLLERR) {
            mask.insert(Mask::READABLE);
        }
        if flags.intersects(EpollFlags::EPOLLOUT | EpollFlags::EPOLLERR) {
            mask.insert(Mask::WRITABLE);
        }
        mask
    }

    /// Union of every registered id's interest on `fd`, the mask epoll
    /// itself is told to watch for.
    fn union_interest(&self, fd: RawFd) -> Mask {
        self.fd_events
            .get(&fd)
            .into_iter()
            .flatten()
            .filter_map(|id| self.interests.get(id))
            .fold(Mask::EMPTY, |acc, (_, interest)| acc | *interest)
    }
}

impl Backend for EpollBackend {
    fn name(&self) -> &'static str {
        "epoll"
    }

    fn need_reinit(&self) -> bool {
        true
    }

    fn add(&mut self, event: EventId, binding: &Binding) -> EventResult<()> {
        let (fd, interest) = match binding {
            Binding::Fd { fd, interest } => (*fd, *interest),
            _ => return Ok(()),
        };

        let ids = self.fd_events.entry(fd).or_default();
        let fd_already_known_to_epoll = !ids.is_empty();
        if !ids.contains(&event) {
            ids.push(event);
        }
        self.interests.insert(event, (fd, interest));

        let union = self.union_interest(fd);
        let borrowed: BorrowedFd = unsafe { BorrowedFd::borrow_raw(fd) };
        let mut ev = EpollEvent::new(Self::epoll_flags(union), fd as u64);

        let op = if fd_already_known_to_epoll {
            self.epoll.modify(borrowed, &mut ev)
        } else {
            self.epoll.add(borrowed, ev)
        };
        op.map_err(|e| EventError::BackendOp(e as i32))?;
        Ok(())
    }

    fn del(&mut self, event: EventId, _binding: &Binding) -> EventResult<()> {
        let Some((fd, _)) = self.interests.remove(&event) else {
            return Ok(());
        };
        if let Some(ids) = self.fd_events.get_mut(&fd) {
            ids.retain(|&id| id != event);
            if ids.is_empty() {
                self.fd_events.remove(&fd);
                let borrowed: BorrowedFd = unsafe { BorrowedFd::borrow_raw(fd) };
                // Already-closed fds make this fail with EBADF; not an
                // error from the reactor's point of view since the goal
                // (no longer watching this fd) is satisfied either way.
                let _ = self.epoll.delete(borrowed);
            } else {
                let union = self.union_interest(fd);
                let borrowed: BorrowedFd = unsafe { BorrowedFd::borrow_raw(fd) };
                let mut ev = EpollEvent::new(Self::epoll_flags(union), fd as u64);
                let _ = self.epoll.modify(borrowed, &mut ev);
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, timeout: Option<Instant>, now: Instant, out: &mut Vec<ReadyFd>) -> EventResult<()> {
        let epoll_timeout: EpollTimeout = match timeout {
            None => EpollTimeout::NONE,
            Some(t) => {
                let millis = t.0.saturating_sub(now.0) / 1_000_000;
                EpollTimeout::try_from(millis.min(i32::MAX as u64) as isize).unwrap_or(EpollTimeout::MAX)
            }
        };

        let mut events = [EpollEvent::empty(); 64];
        let n = match self.epoll.wait(&mut events, epoll_timeout) {
            Ok(n) => n,
            Err(nix::errno::Errno::EINTR) => return Ok(()),
            Err(e) => return Err(EventError::BackendOp(e as i32)),
        };

        for ev in &events[..n] {
            let fd = ev.data() as RawFd;
            let raw_delivered = Self::delivered_mask(ev.events());
            if raw_delivered.is_empty() {
                continue;
            }
            let Some(ids) = self.fd_events.get(&fd) else { continue };
            for &id in ids {
                let interest = self.interests.get(&id).map(|(_, m)| *m).unwrap_or(Mask::EMPTY);
                let delivered = Mask::from_bits(raw_delivered.bits() & interest.bits());
                if !delivered.is_empty() {
                    out.push(ReadyFd { event: id, delivered });
                }
            }
        }
        Ok(())
    }
}

// Epoll's file descriptor is owned by the `Epoll` value and closed on drop.
impl AsFd for EpollBackend {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.epoll.as_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_backend_reports_its_name() {
        let backend = EpollBackend::new().expect("epoll should be available under test");
        assert_eq!(backend.name(), "epoll");
        assert!(backend.need_reinit());
    }

    #[test]
    fn add_then_del_clears_interest_maps() {
        let mut backend = EpollBackend::new().unwrap();
        // stdin is always fd 0 and safe to register/unregister for this test.
        let binding = Binding::Fd { fd: 0, interest: Mask::READABLE };
        let id = EventId::new(1);
        backend.add(id, &binding).unwrap();
        assert_eq!(backend.interests.len(), 1);
        backend.del(id, &binding).unwrap();
        assert!(backend.interests.is_empty());
        assert!(backend.fd_events.is_empty());
    }

    #[test]
    fn two_events_on_same_fd_aggregate_without_eexist() {
        let mut backend = EpollBackend::new().unwrap();
        let readable = EventId::new(1);
        let writable = EventId::new(2);
        // stdin is always fd 0, safe to register twice under distinct ids.
        backend.add(readable, &Binding::Fd { fd: 0, interest: Mask::READABLE }).unwrap();
        // A second id on the same fd must hit epoll_ctl(MOD), not ADD,
        // or this fails at the kernel level with EEXIST.
        backend.add(writable, &Binding::Fd { fd: 0, interest: Mask::WRITABLE }).unwrap();

        assert_eq!(backend.union_interest(0), Mask::READABLE | Mask::WRITABLE);
        assert_eq!(backend.fd_events.get(&0).map(Vec::len), Some(2));

        backend.del(readable, &Binding::Fd { fd: 0, interest: Mask::READABLE }).unwrap();
        assert_eq!(backend.union_interest(0), Mask::WRITABLE);
        assert_eq!(backend.fd_events.get(&0).map(Vec::len), Some(1));

        backend.del(writable, &Binding::Fd { fd: 0, interest: Mask::WRITABLE }).unwrap();
        assert!(backend.fd_events.is_empty());
    }
}
